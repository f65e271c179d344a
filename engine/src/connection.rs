//! Contracts consumed from backing stores.
//!
//! A connection is an open session with one data source. Selectors borrow
//! it for enumeration; its lifetime belongs to whoever created it, usually
//! a [`ConnectionPool`](crate::pool::ConnectionPool).

use crate::{error::Result, selector::NativeTable, Selector};
use std::sync::Arc;

/// An open session with a backing store.
pub trait Connection: Send + Sync {
    /// Whether the session is still usable.
    fn is_connected(&self) -> bool;

    /// Name of the data source this session is bound to.
    fn data_source(&self) -> &str;

    /// Look up a table or view by name.
    fn table(&self, name: &str) -> Result<Arc<dyn NativeTable>>;

    /// Close the session.
    fn dispose(&self);
}

/// Shared reference to a connection.
pub type ConnectionRef = Arc<dyn Connection>;

/// Creates selectors by name on a connection.
pub trait DataSourceFactory {
    fn create_selector(&self, connection: &ConnectionRef, name: &str) -> Result<Selector>;
}

/// Factory producing native selectors straight from the connection's tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFactory;

impl DataSourceFactory for NativeFactory {
    fn create_selector(&self, connection: &ConnectionRef, name: &str) -> Result<Selector> {
        Selector::native(Arc::clone(connection), name)
    }
}
