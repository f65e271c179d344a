//! In-process table store.
//!
//! [`VecTable`] keeps its rows in memory but behaves like a native table:
//! filters, order and windows are evaluated by the "store" itself. Together
//! with [`InProcessStore`] it backs fixtures, tests and embedded use where
//! no external store exists.

use crate::{
    connection::Connection,
    error::Result,
    selector::{memory::validate_rows, NativeQuery, NativeTable, RowReader},
    ColumnDescriptor, ColumnList, Error, Row,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A table held in memory that evaluates queries natively.
pub struct VecTable {
    name: String,
    columns: Vec<ColumnDescriptor>,
    natives: ColumnList,
    rows: Vec<Row>,
    honor_order: bool,
    open_cursors: Arc<AtomicUsize>,
    fetches: AtomicUsize,
}

impl VecTable {
    /// Create a table, validating rows against the columns.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>, rows: Vec<Row>) -> Result<Self> {
        validate_rows(&columns, &rows)?;
        Ok(Self {
            name: name.into(),
            natives: ColumnList::from_natives(&columns)?,
            columns,
            rows,
            honor_order: true,
            open_cursors: Arc::new(AtomicUsize::new(0)),
            fetches: AtomicUsize::new(0),
        })
    }

    /// Make the table silently ignore requested orderings, the way some
    /// stores do for unindexed columns.
    pub fn ignoring_order(mut self) -> Self {
        self.honor_order = false;
        self
    }

    /// Number of readers opened and not yet closed.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Number of fetches issued against this table.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn resolve(&self, name: &str) -> Result<usize> {
        self.natives
            .find_index(name)
            .ok_or_else(|| Error::InvalidReference(name.to_string()))
    }
}

impl NativeTable for VecTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn fetch(&self, query: &NativeQuery) -> Result<Box<dyn RowReader>> {
        let resolve = |name: &str| self.resolve(name);
        let filters = query
            .filters
            .iter()
            .map(|f| f.compile(&resolve))
            .collect::<Result<Vec<_>>>()?;

        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .cloned()
            .collect();

        if let Some(order) = query.order.as_ref().filter(|_| self.honor_order) {
            let order = order.compile(&resolve)?;
            rows.sort_by(|a, b| order.compare(a, b));
        }

        let rows: Vec<Row> = rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(VecReader {
            rows: rows.into_iter(),
            open_cursors: Arc::clone(&self.open_cursors),
            closed: false,
        }))
    }

    fn count(&self, query: &NativeQuery) -> Option<usize> {
        if !query.filters.is_empty() {
            return None;
        }
        let available = self.rows.len().saturating_sub(query.offset);
        Some(query.limit.map_or(available, |limit| available.min(limit)))
    }
}

struct VecReader {
    rows: std::vec::IntoIter<Row>,
    open_cursors: Arc<AtomicUsize>,
    closed: bool,
}

impl RowReader for VecReader {
    fn read(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Err(Error::Store("cursor is closed".into()));
        }
        Ok(self.rows.next())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_cursors.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for VecReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// A connection to a set of in-process tables.
pub struct InProcessStore {
    data_source: String,
    tables: HashMap<String, Arc<VecTable>>,
    connected: AtomicBool,
    disposals: AtomicUsize,
}

impl InProcessStore {
    /// Create an empty store.
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            tables: HashMap::new(),
            connected: AtomicBool::new(true),
            disposals: AtomicUsize::new(0),
        }
    }

    /// Builder-style method to add a table.
    pub fn with_table(mut self, table: VecTable) -> Self {
        self.tables
            .insert(table.name.to_lowercase(), Arc::new(table));
        self
    }

    /// Get a table with its concrete type, for inspection.
    pub fn vec_table(&self, name: &str) -> Option<Arc<VecTable>> {
        self.tables.get(&name.to_lowercase()).cloned()
    }

    /// How many times `dispose` has been called.
    pub fn dispose_count(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl Connection for InProcessStore {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn data_source(&self) -> &str {
        &self.data_source
    }

    fn table(&self, name: &str) -> Result<Arc<dyn NativeTable>> {
        self.tables
            .get(&name.to_lowercase())
            .map(|t| Arc::clone(t) as Arc<dyn NativeTable>)
            .ok_or_else(|| Error::InvalidReference(name.to_string()))
    }

    fn dispose(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}
