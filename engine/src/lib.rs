//! # Rowsync Engine
//!
//! Source-agnostic row selectors, merge joins and change-sync batches.
//!
//! Every consumer (grids, report generators, sync endpoints) queries rows the
//! same way, whether they come from a backing store or sit in memory:
//! project, filter, order, join, enumerate.
//!
//! ## Design Principles
//!
//! - **Immutable composition**: every `with_*` call returns a new selector;
//!   the parent stays usable
//! - **Fail early**: column references are resolved when a selector is
//!   composed, never while rows stream
//! - **Push down**: native selectors hand filters and orders to the store
//! - **Explicit release**: enumerators close their store cursors exactly once
//!
//! ## Core Concepts
//!
//! ### Selectors
//!
//! A [`Selector`] is one of three variants:
//! - native, bound to a table of a [`Connection`]
//! - in-memory, over a plain sequence of rows
//! - join, the merge of two selectors sorted by their join keys
//!
//! Columns are exposed through a [`ColumnList`] of [`AliasColumn`]s, each
//! bound to a position of the variant's physical row.
//!
//! ### Joins
//!
//! [`Selector::apply_join`] orders both sides by their keys and merges them
//! in one forward pass. Inner, left and right equi-joins are supported;
//! input order is verified while streaming unless disabled through
//! [`JoinOptions`].
//!
//! ### Synchronization
//!
//! A [`SyncBatch`] turns a selector into the rows a disconnected client
//! needs to catch up, by timestamp column or by whole-view version.
//!
//! ## Quick Start
//!
//! ```rust
//! use rowsync_engine::{
//!     row, ColumnDescriptor, ColumnRef, ConnectionRef, DataType, FilterExpr,
//!     InProcessStore, JoinStatement, JoinType, Selector, VecTable,
//! };
//! use std::sync::Arc;
//!
//! // 1. Register tables with a store
//! let customers = VecTable::new(
//!     "customers",
//!     vec![
//!         ColumnDescriptor::new("id", DataType::Int),
//!         ColumnDescriptor::new("name", DataType::Text),
//!     ],
//!     vec![row![1, "Alice"], row![2, "Bob"]],
//! )
//! .unwrap();
//! let orders = VecTable::new(
//!     "orders",
//!     vec![
//!         ColumnDescriptor::new("customer_id", DataType::Int),
//!         ColumnDescriptor::new("total", DataType::Float),
//!     ],
//!     vec![row![2, 9.5], row![1, 20.0], row![1, 4.25]],
//! )
//! .unwrap();
//! let store: ConnectionRef = Arc::new(
//!     InProcessStore::new("shop")
//!         .with_table(customers)
//!         .with_table(orders),
//! );
//!
//! // 2. Compose selectors
//! let customers = Selector::native(store.clone(), "customers").unwrap();
//! let orders = Selector::native(store, "orders")
//!     .unwrap()
//!     .with_filter(&FilterExpr::gt("total", 5.0))
//!     .unwrap();
//!
//! // 3. Join and project
//! let report = customers
//!     .apply_join(
//!         &orders,
//!         Some(JoinType::Inner),
//!         &[JoinStatement::new("id", "customer_id")],
//!     )
//!     .unwrap()
//!     .with_columns(&[ColumnRef::new("name"), ColumnRef::new("total")])
//!     .unwrap();
//!
//! // 4. Enumerate
//! let rows: Vec<_> = report
//!     .enumerate_all()
//!     .unwrap()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(rows, vec![row!["Alice", 20.0], row!["Bob", 9.5]]);
//! ```

pub mod column;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod expr;
pub mod join;
pub mod pool;
pub mod row;
pub mod selector;
pub mod sync;
pub mod value;

// Re-export main types at crate root
pub use column::{AliasColumn, ColumnDescriptor, ColumnList, DataType};
pub use config::{ConfigError, EngineConfig};
pub use connection::{Connection, ConnectionRef, DataSourceFactory, NativeFactory};
pub use cursor::{RowStream, StreamState};
pub use error::{Error, JoinSide, Result};
pub use expr::{ColumnRef, CompareOp, FilterExpr, OrderExpr, OrderItem, SortDirection};
pub use join::{JoinOptions, JoinStatement, JoinType, SortedSelector};
pub use pool::{ConnectionPool, Lease, PoolKey};
pub use row::Row;
pub use selector::{
    InProcessStore, NativeQuery, NativeTable, RowReader, Selector, SelectorKind, VecTable,
};
pub use sync::{
    BatchMode, SyncBatch, SyncColumnKind, SyncEntry, SyncHint, SyncMode, SyncPage, ViewCatalog,
};
pub use value::Value;

/// Opaque position in a view's change history. 0 means "never synced".
pub type SyncId = i64;
