//! Native-store-backed leaf selectors.
//!
//! The store does the actual work: filters and orders are translated to
//! native column names and pushed down through [`NativeQuery`], and rows
//! come back through a [`RowReader`].

use crate::{
    connection::ConnectionRef, error::Result, ColumnDescriptor, Error, FilterExpr, OrderExpr, Row,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A query pushed down to a native table. Column names are native names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeQuery {
    /// Predicates, all of which must hold
    pub filters: Vec<FilterExpr>,
    /// Requested order, store-default when absent
    pub order: Option<OrderExpr>,
    /// Rows to skip
    pub offset: usize,
    /// Maximum rows to return, unbounded when absent
    pub limit: Option<usize>,
}

/// A forward-only reader over rows.
///
/// `close` releases store-side cursors. Callers close a reader at most once.
pub trait RowReader {
    /// Read the next row, `None` once exhausted.
    fn read(&mut self) -> Result<Option<Row>>;

    /// Release any resources held by the reader.
    fn close(&mut self) {}
}

/// A table, view or other row source exposed by a backing store.
pub trait NativeTable: Send + Sync {
    /// Name of the table within its data source.
    fn name(&self) -> &str;

    /// The native column set, in physical row order.
    fn columns(&self) -> &[ColumnDescriptor];

    /// Open a reader for the query. Rows carry every native column in
    /// physical order.
    fn fetch(&self, query: &NativeQuery) -> Result<Box<dyn RowReader>>;

    /// Row count for the query when the store knows it without scanning.
    fn count(&self, _query: &NativeQuery) -> Option<usize> {
        None
    }
}

/// State of a native selector.
#[derive(Clone)]
pub(crate) struct NativeSelector {
    pub(crate) connection: ConnectionRef,
    pub(crate) table: Arc<dyn NativeTable>,
    pub(crate) filters: Vec<FilterExpr>,
    pub(crate) order: Option<OrderExpr>,
}

impl NativeSelector {
    pub(crate) fn new(connection: ConnectionRef, table: Arc<dyn NativeTable>) -> Self {
        Self {
            connection,
            table,
            filters: Vec::new(),
            order: None,
        }
    }

    pub(crate) fn with_filter(&self, filter: FilterExpr) -> Self {
        let mut next = self.clone();
        next.filters.push(filter);
        next
    }

    pub(crate) fn with_order(&self, order: OrderExpr) -> Self {
        let mut next = self.clone();
        next.order = Some(order);
        next
    }

    pub(crate) fn query(&self, start: usize, count: Option<usize>) -> NativeQuery {
        NativeQuery {
            filters: self.filters.clone(),
            order: self.order.clone(),
            offset: start,
            limit: count,
        }
    }

    pub(crate) fn fetch(&self, start: usize, count: Option<usize>) -> Result<Box<dyn RowReader>> {
        if !self.connection.is_connected() {
            return Err(Error::Store(format!(
                "connection to '{}' is closed",
                self.connection.data_source()
            )));
        }
        tracing::debug!(
            data_source = %self.connection.data_source(),
            table = %self.table.name(),
            filters = self.filters.len(),
            start,
            "Fetching native rows"
        );
        self.table.fetch(&self.query(start, count))
    }

    pub(crate) fn count(&self) -> Option<usize> {
        self.table.count(&self.query(0, None))
    }
}
