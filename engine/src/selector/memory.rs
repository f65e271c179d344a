//! In-memory leaf selectors.
//!
//! Wraps a plain sequence of rows so joins and consumers can treat it like
//! any other source. Filters are compiled against the row shape and applied
//! lazily while streaming. Ordering is not supported: rows are presented in
//! the order they were given.

use crate::{
    error::Result, expr::CompiledFilter, selector::RowReader, ColumnDescriptor, Error, Row, Value,
};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct MemorySelector {
    pub(crate) rows: Arc<Vec<Row>>,
    pub(crate) filters: Vec<Arc<CompiledFilter>>,
}

impl MemorySelector {
    pub(crate) fn new(columns: &[ColumnDescriptor], rows: Vec<Row>) -> Result<Self> {
        validate_rows(columns, &rows)?;
        Ok(Self {
            rows: Arc::new(rows),
            filters: Vec::new(),
        })
    }

    /// Build rows from JSON objects, reading each column by name.
    /// Missing fields read as null.
    pub(crate) fn from_json(
        columns: &[ColumnDescriptor],
        objects: &[serde_json::Value],
    ) -> Result<Self> {
        let mut rows = Vec::with_capacity(objects.len());
        for object in objects {
            let fields = object.as_object().ok_or_else(|| Error::TypeMismatch {
                column: "*".into(),
                expected: "Object".into(),
                got: "non-object JSON".into(),
            })?;
            let values = columns
                .iter()
                .map(|c| match fields.get(&c.name) {
                    Some(v) => Value::from_json(v, c.data_type, &c.name),
                    None => Ok(Value::Null),
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(Row::new(values));
        }
        Self::new(columns, rows)
    }

    pub(crate) fn with_filter(&self, filter: CompiledFilter) -> Self {
        let mut next = self.clone();
        next.filters.push(Arc::new(filter));
        next
    }

    pub(crate) fn reader(&self) -> Box<dyn RowReader> {
        Box::new(MemoryReader {
            rows: Arc::clone(&self.rows),
            position: 0,
        })
    }

    /// Length of the sequence, known only while no filter narrows it.
    pub(crate) fn count(&self) -> Option<usize> {
        self.filters.is_empty().then_some(self.rows.len())
    }
}

/// Check row widths and value types against a column set.
pub(crate) fn validate_rows(columns: &[ColumnDescriptor], rows: &[Row]) -> Result<()> {
    for row in rows {
        if row.width() != columns.len() {
            return Err(Error::RowShape {
                expected: columns.len(),
                actual: row.width(),
            });
        }
        for (column, value) in columns.iter().zip(row.values()) {
            if !column.data_type.accepts(value) {
                return Err(Error::TypeMismatch {
                    column: column.name.clone(),
                    expected: column.data_type.to_string(),
                    got: value.type_name().to_string(),
                });
            }
        }
    }
    Ok(())
}

struct MemoryReader {
    rows: Arc<Vec<Row>>,
    position: usize,
}

impl RowReader for MemoryReader {
    fn read(&mut self) -> Result<Option<Row>> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }
}
