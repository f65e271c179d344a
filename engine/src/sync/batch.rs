//! Synchronization batches.
//!
//! A [`SyncBatch`] wraps a composed selector and emits the rows a
//! disconnected client needs to catch up, each tagged with the sync id the
//! client should remember once it has applied that row.
//!
//! Two strategies exist:
//! - **timestamp**: rows whose sync column is the sentinel minimum or newer
//!   than the client's last id, ordered by that column
//! - **full**: the whole view, once, whenever its version moved
//!
//! Batches can be drained row by row or in pages.

use crate::{
    config::EngineConfig,
    cursor::RowStream,
    error::Result,
    sync::{
        stamp::{stamp, SyncColumnKind},
        SyncHint, ViewCatalog,
    },
    ColumnList, Error, OrderExpr, Row, Selector, SyncId,
};
use serde::{Deserialize, Serialize};

/// What the client should do with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    /// Insert the row or replace the one with the same key
    Replace,
}

/// Whether a batch is a complete snapshot or a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchMode {
    Full,
    Parts,
}

/// One synchronized row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEntry {
    pub sync_id: SyncId,
    pub mode: SyncMode,
    pub row: Row,
}

/// A bounded slice of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPage {
    pub mode: BatchMode,
    /// Id to resume from: the last entry's, or the client's own id when the
    /// page is empty
    pub sync_id: SyncId,
    pub entries: Vec<SyncEntry>,
    /// Whether more entries follow
    pub has_more: bool,
}

enum Strategy {
    TimeStamp {
        /// Position of the sync column in the exposed row
        index: usize,
    },
    Full {
        version: SyncId,
    },
}

/// A change batch over a selector.
pub struct SyncBatch {
    stream: Option<RowStream>,
    columns: ColumnList,
    strategy: Strategy,
    mode: BatchMode,
    last_sync_id: SyncId,
    current: SyncId,
    /// Entry read ahead by paging
    peeked: Option<SyncEntry>,
    released: bool,
}

impl SyncBatch {
    /// Incremental batch over `selector` keyed by the Int or DateTime
    /// `column`.
    ///
    /// The selector must be orderable; in-memory and join selectors
    /// (other than by their join key) fail with `Unsupported`.
    pub fn timestamp(selector: &Selector, column: &str, last_sync_id: SyncId) -> Result<Self> {
        let index = selector
            .columns()
            .find_index(column)
            .ok_or_else(|| Error::InvalidReference(column.to_string()))?;
        let alias = selector
            .columns()
            .get(index)
            .ok_or_else(|| Error::InvalidReference(column.to_string()))?;
        let kind = SyncColumnKind::of(alias)?;

        let filter = kind.pending(column, last_sync_id)?;
        let selector = selector
            .with_filter(&filter)?
            .with_order(&OrderExpr::ascending(&[column]))?;
        let stream = selector.enumerate_all()?;

        let mode = if last_sync_id == 0 {
            BatchMode::Full
        } else {
            BatchMode::Parts
        };
        tracing::debug!(column = %column, last_sync_id, ?mode, "Created timestamp sync batch");

        Ok(Self {
            stream: Some(stream),
            columns: selector.columns().clone(),
            strategy: Strategy::TimeStamp { index },
            mode,
            last_sync_id,
            current: last_sync_id,
            peeked: None,
            released: false,
        })
    }

    /// Whole-view batch, non-empty only when `version` differs from the
    /// client's last known version.
    pub fn full(selector: &Selector, version: SyncId, last_sync_id: SyncId) -> Result<Self> {
        let changed = version != last_sync_id;
        let stream = if changed {
            Some(selector.enumerate_all()?)
        } else {
            None
        };
        let mode = if changed {
            BatchMode::Full
        } else {
            BatchMode::Parts
        };
        tracing::debug!(version, last_sync_id, ?mode, "Created full sync batch");

        Ok(Self {
            stream,
            columns: selector.columns().clone(),
            strategy: Strategy::Full { version },
            mode,
            last_sync_id,
            current: version,
            peeked: None,
            released: false,
        })
    }

    /// Build the batch a hint describes, resolving its view through
    /// `catalog`.
    pub fn open(hint: &SyncHint, catalog: &dyn ViewCatalog, last_sync_id: SyncId) -> Result<Self> {
        let selector = catalog.view_selector(hint.view())?;
        match hint {
            SyncHint::TimeStamp { column, .. } => Self::timestamp(&selector, column, last_sync_id),
            SyncHint::Full { view } => {
                let version = catalog.view_version(view)?;
                Self::full(&selector, version, last_sync_id)
            }
        }
    }

    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    pub fn columns(&self) -> &ColumnList {
        &self.columns
    }

    /// The client's id this batch started from.
    pub fn last_sync_id(&self) -> SyncId {
        self.last_sync_id
    }

    /// Sync id of the most recently emitted entry.
    ///
    /// Before the first entry of a timestamp batch this is the client's own
    /// last id; a full batch always reports its version.
    pub fn sync_id(&self) -> SyncId {
        self.current
    }

    fn read_entry(&mut self) -> Result<Option<SyncEntry>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        let Some(row) = stream.next_row()? else {
            return Ok(None);
        };
        let sync_id = match self.strategy {
            Strategy::TimeStamp { index } => stamp(row.value_at(index))
                .map_or(self.current, |s| s.max(self.current)),
            Strategy::Full { version } => version,
        };
        Ok(Some(SyncEntry {
            sync_id,
            mode: SyncMode::Replace,
            row,
        }))
    }

    /// Next entry, or `None` once the batch is drained. Fails with
    /// `Disposed` after [`release`](Self::release).
    pub fn next_entry(&mut self) -> Result<Option<SyncEntry>> {
        if self.released {
            return Err(Error::Disposed);
        }
        let entry = match self.peeked.take() {
            Some(entry) => Some(entry),
            None => self.read_entry()?,
        };
        if let Some(entry) = &entry {
            self.current = entry.sync_id;
        }
        Ok(entry)
    }

    /// Drain up to `limit` entries (clamped to the configured bounds).
    pub fn next_page(&mut self, limit: Option<usize>, config: &EngineConfig) -> Result<SyncPage> {
        let limit = config.page_limit(limit);
        let mut entries = Vec::with_capacity(limit.min(64));
        while entries.len() < limit {
            match self.next_entry()? {
                Some(entry) => entries.push(entry),
                None => break,
            }
        }

        // Read one more to know whether the batch continues.
        if self.peeked.is_none() && entries.len() == limit {
            self.peeked = self.read_entry()?;
        }
        let has_more = self.peeked.is_some();

        tracing::debug!(entries = entries.len(), has_more, sync_id = self.current, "Fetched sync page");
        Ok(SyncPage {
            mode: self.mode,
            sync_id: self.current,
            entries,
            has_more,
        })
    }

    /// Release the underlying stream. Releasing twice is a no-op.
    pub fn release(&mut self) {
        self.released = true;
        if let Some(stream) = self.stream.as_mut() {
            stream.release();
        }
        self.peeked = None;
    }
}

impl Iterator for SyncBatch {
    type Item = Result<SyncEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl std::fmt::Debug for SyncBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBatch")
            .field("mode", &self.mode)
            .field("last_sync_id", &self.last_sync_id)
            .field("sync_id", &self.current)
            .finish()
    }
}
