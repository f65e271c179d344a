//! Conversion between sync-column values and sync ids.
//!
//! Sync ids are 64-bit stamps. Integer columns are used as-is; date-time
//! columns convert to milliseconds since the Unix epoch. Stamp 0 is the
//! sentinel minimum: rows carrying it are always part of a batch.

use crate::{
    error::Result, expr::CompareOp, AliasColumn, DataType, Error, FilterExpr, SyncId, Value,
};
use chrono::{DateTime, Utc};

/// Representation of a sync column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncColumnKind {
    Int,
    DateTime,
}

impl SyncColumnKind {
    /// Classify a column, failing for types that cannot carry a stamp.
    pub fn of(column: &AliasColumn) -> Result<Self> {
        match column.data_type() {
            DataType::Int => Ok(SyncColumnKind::Int),
            DataType::DateTime => Ok(SyncColumnKind::DateTime),
            other => Err(Error::InvalidArgument {
                column: column.alias.clone(),
                reason: format!("sync columns must be Int or DateTime, found {}", other),
            }),
        }
    }

    /// The sentinel minimum in this representation.
    pub fn sentinel(self) -> Value {
        match self {
            SyncColumnKind::Int => Value::Int(0),
            SyncColumnKind::DateTime => Value::DateTime(DateTime::<Utc>::UNIX_EPOCH),
        }
    }

    /// A sync id in this representation.
    pub fn value_for(self, id: SyncId, column: &str) -> Result<Value> {
        match self {
            SyncColumnKind::Int => Ok(Value::Int(id)),
            SyncColumnKind::DateTime => DateTime::<Utc>::from_timestamp_millis(id)
                .map(Value::DateTime)
                .ok_or_else(|| Error::InvalidArgument {
                    column: column.to_string(),
                    reason: format!("sync id {} is not a representable date", id),
                }),
        }
    }

    /// Filter for rows a client at `last_sync_id` still needs: stamp 0 or a
    /// stamp above `last_sync_id`.
    ///
    /// Date-times are matched by whole milliseconds, the same truncation
    /// [`stamp`] applies, so a row is never resent once its id was reported.
    pub fn pending(self, column: &str, last_sync_id: SyncId) -> Result<FilterExpr> {
        match self {
            SyncColumnKind::Int => Ok(FilterExpr::or(vec![
                FilterExpr::eq(column, self.sentinel()),
                FilterExpr::gt(column, Value::Int(last_sync_id)),
            ])),
            SyncColumnKind::DateTime => Ok(FilterExpr::or(vec![
                FilterExpr::and(vec![
                    FilterExpr::compare(column, CompareOp::Ge, self.sentinel()),
                    FilterExpr::lt(column, self.value_for(1, column)?),
                ]),
                FilterExpr::compare(
                    column,
                    CompareOp::Ge,
                    self.value_for(last_sync_id.saturating_add(1), column)?,
                ),
            ])),
        }
    }
}

/// The stamp carried by a value; `None` for null or non-stamp values.
pub fn stamp(value: &Value) -> Option<SyncId> {
    match value {
        Value::Int(i) => Some(*i),
        Value::DateTime(dt) => Some(dt.timestamp_millis()),
        _ => None,
    }
}
