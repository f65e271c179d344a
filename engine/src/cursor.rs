//! Forward-only row streams.
//!
//! A [`RowStream`] is the enumerator every selector hands out. It moves
//! through `NotStarted -> Enumerating -> Exhausted` and ends `Released`
//! once the caller lets go of it. Releasing closes the underlying reader
//! exactly once; any further use fails with [`Error::Disposed`].

use crate::{
    error::Result, expr::CompiledFilter, selector::RowReader, ColumnList, Error, Row,
};
use std::sync::Arc;

/// Lifecycle of a row stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    NotStarted,
    Enumerating,
    Exhausted,
    Released,
}

/// Forward-only enumerator over a selector's rows.
pub struct RowStream {
    reader: Option<Box<dyn RowReader>>,
    filters: Vec<Arc<CompiledFilter>>,
    projection: Option<Arc<[usize]>>,
    columns: Arc<ColumnList>,
    skip: usize,
    remaining: Option<usize>,
    state: StreamState,
}

impl RowStream {
    pub(crate) fn new(reader: Box<dyn RowReader>, columns: Arc<ColumnList>) -> Self {
        Self {
            reader: Some(reader),
            filters: Vec::new(),
            projection: None,
            columns,
            skip: 0,
            remaining: None,
            state: StreamState::NotStarted,
        }
    }

    pub(crate) fn with_filters(mut self, filters: Vec<Arc<CompiledFilter>>) -> Self {
        self.filters = filters;
        self
    }

    /// Restrict to `[start, start + count)` of the filtered rows.
    pub(crate) fn with_window(mut self, start: usize, count: Option<usize>) -> Self {
        self.skip = start;
        self.remaining = count;
        self
    }

    pub(crate) fn with_projection(mut self, projection: Option<Arc<[usize]>>) -> Self {
        self.projection = projection;
        self
    }

    /// The columns of the rows this stream yields.
    pub fn columns(&self) -> &ColumnList {
        &self.columns
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Advance to the next row.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        match self.state {
            StreamState::Released => return Err(Error::Disposed),
            StreamState::Exhausted => return Ok(None),
            _ => {}
        }
        if self.remaining == Some(0) {
            self.finish();
            return Ok(None);
        }

        let reader = self.reader.as_mut().ok_or(Error::Disposed)?;
        self.state = StreamState::Enumerating;
        loop {
            let Some(row) = reader.read()? else {
                self.finish();
                return Ok(None);
            };
            if !self.filters.iter().all(|f| f.matches(&row)) {
                continue;
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            return Ok(Some(match &self.projection {
                Some(positions) => row.project(positions),
                None => row,
            }));
        }
    }

    /// Rewind the stream. Only possible before the first advance; a stream
    /// never re-issues its underlying fetch.
    pub fn reset(&mut self) -> Result<()> {
        match self.state {
            StreamState::NotStarted => Ok(()),
            StreamState::Released => Err(Error::Disposed),
            StreamState::Enumerating | StreamState::Exhausted => Err(Error::Unsupported(
                "row stream cannot rewind after the first advance".into(),
            )),
        }
    }

    /// Release the stream and its reader. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if self.state == StreamState::Released {
            return;
        }
        self.close_reader();
        self.state = StreamState::Released;
        tracing::trace!("Row stream released");
    }

    pub fn is_released(&self) -> bool {
        self.state == StreamState::Released
    }

    fn finish(&mut self) {
        self.close_reader();
        self.state = StreamState::Exhausted;
    }

    fn close_reader(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
    }
}

impl Iterator for RowStream {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("columns", &self.columns.names())
            .field("state", &self.state)
            .finish()
    }
}
