//! Composable selectors.
//!
//! A [`Selector`] is an immutable query node over some row source. Every
//! `with_*` combinator returns a new selector and leaves its parent
//! untouched, so a pipeline can be built (and fully validated) before any
//! store is touched. Enumeration happens through [`RowStream`].
//!
//! Three variants exist:
//! - native: bound to a table of a backing-store connection, pushes filters
//!   and orders down to the store
//! - in-memory: a plain sequence of rows, filtered lazily, never reordered
//! - join: the merge of two pre-sorted selectors (see [`crate::join`])
//!
//! Each variant reads a *physical* row (the native row, the stored row or
//! the concatenated join row); the exposed [`ColumnList`] maps aliases onto
//! positions of that physical row.

pub mod memory;
pub mod native;
pub mod table;

pub use native::{NativeQuery, NativeTable, RowReader};
pub use table::{InProcessStore, VecTable};

use crate::{
    connection::{ConnectionRef, DataSourceFactory},
    cursor::RowStream,
    error::Result,
    join::{self, JoinOptions, JoinSelector, JoinStatement, JoinType, SortedSelector},
    AliasColumn, ColumnDescriptor, ColumnList, ColumnRef, Error, FilterExpr, OrderExpr, Row,
};
use memory::MemorySelector;
use native::NativeSelector;
use std::sync::Arc;

/// Which variant a selector is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Native,
    Memory,
    Join,
}

#[derive(Clone)]
pub(crate) enum Variant {
    Native(NativeSelector),
    Memory(MemorySelector),
    Join(JoinSelector),
}

/// An immutable, composable query node.
#[derive(Clone)]
pub struct Selector {
    variant: Variant,
    /// The variant's physical column set
    natives: Arc<ColumnList>,
    /// Exposed columns
    columns: Arc<ColumnList>,
}

impl Selector {
    /// Create a leaf selector over a table of an open connection.
    pub fn native(connection: ConnectionRef, name: &str) -> Result<Selector> {
        if !connection.is_connected() {
            return Err(Error::Store(format!(
                "connection to '{}' is closed",
                connection.data_source()
            )));
        }
        let table = connection.table(name)?;
        let natives = Arc::new(ColumnList::from_natives(table.columns())?);
        tracing::debug!(
            data_source = %connection.data_source(),
            table = %name,
            columns = natives.len(),
            "Created native selector"
        );
        Ok(Selector {
            variant: Variant::Native(NativeSelector::new(connection, table)),
            columns: Arc::clone(&natives),
            natives,
        })
    }

    /// Create a leaf selector over rows held in memory.
    pub fn memory(columns: Vec<ColumnDescriptor>, rows: Vec<Row>) -> Result<Selector> {
        let memory = MemorySelector::new(&columns, rows)?;
        Self::from_memory(&columns, memory)
    }

    /// Create an in-memory selector from JSON objects, one per row.
    pub fn memory_from_json(
        columns: Vec<ColumnDescriptor>,
        objects: &[serde_json::Value],
    ) -> Result<Selector> {
        let memory = MemorySelector::from_json(&columns, objects)?;
        Self::from_memory(&columns, memory)
    }

    fn from_memory(columns: &[ColumnDescriptor], memory: MemorySelector) -> Result<Selector> {
        let natives = Arc::new(ColumnList::from_natives(columns)?);
        Ok(Selector {
            variant: Variant::Memory(memory),
            columns: Arc::clone(&natives),
            natives,
        })
    }

    pub(crate) fn from_join(join: JoinSelector, natives: ColumnList) -> Selector {
        let natives = Arc::new(natives);
        Selector {
            variant: Variant::Join(join),
            columns: Arc::clone(&natives),
            natives,
        }
    }

    pub fn kind(&self) -> SelectorKind {
        match self.variant {
            Variant::Native(_) => SelectorKind::Native,
            Variant::Memory(_) => SelectorKind::Memory,
            Variant::Join(_) => SelectorKind::Join,
        }
    }

    /// Exposed columns.
    pub fn columns(&self) -> &ColumnList {
        &self.columns
    }

    /// The variant's full physical column set.
    pub fn native_columns(&self) -> &ColumnList {
        &self.natives
    }

    /// The connection a native selector is bound to.
    pub fn connection(&self) -> Option<&ConnectionRef> {
        match &self.variant {
            Variant::Native(native) => Some(&native.connection),
            _ => None,
        }
    }

    /// Resolve a column name to an alias: exposed columns first, then the
    /// native column set.
    fn resolve_alias(&self, name: &str) -> Result<&AliasColumn> {
        self.columns
            .find(name)
            .or_else(|| self.natives.find(name))
            .ok_or_else(|| Error::InvalidReference(name.to_string()))
    }

    pub(crate) fn resolve_position(&self, name: &str) -> Result<usize> {
        self.resolve_alias(name).map(|c| c.position)
    }

    fn native_name(&self, name: &str) -> Result<String> {
        self.resolve_alias(name).map(|c| c.native_name().to_string())
    }

    fn with_variant(&self, variant: Variant) -> Selector {
        Selector {
            variant,
            natives: Arc::clone(&self.natives),
            columns: Arc::clone(&self.columns),
        }
    }

    /// Narrow the rows by a predicate.
    ///
    /// Native selectors push the predicate to the store; the others compile
    /// it against the physical row. Unknown columns fail here.
    pub fn with_filter(&self, filter: &FilterExpr) -> Result<Selector> {
        let variant = match &self.variant {
            Variant::Native(native) => {
                let mapped = filter.map_columns(&|name: &str| self.native_name(name))?;
                Variant::Native(native.with_filter(mapped))
            }
            Variant::Memory(memory) => {
                let compiled = filter.compile(&|name: &str| self.resolve_position(name))?;
                Variant::Memory(memory.with_filter(compiled))
            }
            Variant::Join(join) => {
                let compiled = filter.compile(&|name: &str| self.resolve_position(name))?;
                Variant::Join(join.with_filter(compiled))
            }
        };
        tracing::debug!(kind = ?self.kind(), "Applied filter");
        Ok(self.with_variant(variant))
    }

    /// Order the rows.
    ///
    /// Only native selectors can reorder. In-memory selectors fail; join
    /// selectors accept only the order their merge already produces.
    pub fn with_order(&self, order: &OrderExpr) -> Result<Selector> {
        let variant = match &self.variant {
            Variant::Native(native) => {
                let mapped = order.map_columns(&|name: &str| self.native_name(name))?;
                Variant::Native(native.with_order(mapped))
            }
            Variant::Memory(_) => {
                return Err(Error::Unsupported(
                    "in-memory selectors cannot be ordered, present rows pre-ordered".into(),
                ))
            }
            Variant::Join(join) => {
                let compiled = order.compile(&|name: &str| self.resolve_position(name))?;
                join.ensure_order(order, &compiled)?;
                Variant::Join(join.clone())
            }
        };
        tracing::debug!(kind = ?self.kind(), items = order.items.len(), "Applied order");
        Ok(self.with_variant(variant))
    }

    /// Project, rename or reorder the exposed columns.
    ///
    /// A requested name resolving against the current aliases keeps its
    /// physical binding; otherwise it binds afresh to the native column of
    /// that name.
    pub fn with_columns(&self, requested: &[ColumnRef]) -> Result<Selector> {
        let columns = requested
            .iter()
            .map(|r| {
                if let Some(existing) = self.columns.find(&r.name) {
                    Ok(AliasColumn::from_existing(existing, r.output_name()))
                } else if let Some(native) = self.natives.find(&r.name) {
                    Ok(AliasColumn::from_existing(native, r.output_name()))
                } else {
                    Err(Error::InvalidReference(r.name.clone()))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let columns = ColumnList::new(columns)?;
        tracing::debug!(kind = ?self.kind(), columns = ?columns.names(), "Applied columns");
        Ok(Selector {
            variant: self.variant.clone(),
            natives: Arc::clone(&self.natives),
            columns: Arc::new(columns),
        })
    }

    /// Join with another selector on equality of the given column pairs.
    ///
    /// Both sides are ordered ascending by their join keys first, so both
    /// must support ordering; wrap pre-ordered in-memory data with
    /// [`SortedSelector::trusted`] and call [`join::join`] instead.
    pub fn apply_join(
        &self,
        other: &Selector,
        join_type: Option<JoinType>,
        statements: &[JoinStatement],
    ) -> Result<Selector> {
        self.apply_join_with(other, join_type, statements, &JoinOptions::default())
    }

    /// [`apply_join`](Self::apply_join) with explicit options.
    pub fn apply_join_with(
        &self,
        other: &Selector,
        join_type: Option<JoinType>,
        statements: &[JoinStatement],
        options: &JoinOptions,
    ) -> Result<Selector> {
        let left_keys: Vec<&str> = statements.iter().map(|s| s.left.as_str()).collect();
        let right_keys: Vec<&str> = statements.iter().map(|s| s.right.as_str()).collect();
        let left = SortedSelector::order_by_keys(self, &left_keys)?;
        let right = SortedSelector::order_by_keys(other, &right_keys)?;
        join::join(left, right, join_type, statements, options)
    }

    /// Join with a selector created by name on this selector's connection.
    pub fn apply_join_by_name(
        &self,
        factory: &dyn DataSourceFactory,
        name: &str,
        join_type: Option<JoinType>,
        statements: &[JoinStatement],
    ) -> Result<Selector> {
        let connection = self.connection().ok_or_else(|| {
            Error::Unsupported(format!(
                "joining '{}' by name needs a connection-backed selector",
                name
            ))
        })?;
        let other = factory.create_selector(connection, name)?;
        self.apply_join(&other, join_type, statements)
    }

    /// Enumerate all rows.
    pub fn enumerate_all(&self) -> Result<RowStream> {
        self.enumerate(0, None)
    }

    /// Enumerate rows `[start, start + count)`; `None` means unbounded.
    pub fn enumerate(&self, start: usize, count: Option<usize>) -> Result<RowStream> {
        let projection: Option<Arc<[usize]>> = if self.columns.is_identity(self.natives.len()) {
            None
        } else {
            Some(self.columns.positions().into())
        };

        let stream = match &self.variant {
            Variant::Native(native) => {
                RowStream::new(native.fetch(start, count)?, Arc::clone(&self.columns))
            }
            Variant::Memory(memory) => RowStream::new(memory.reader(), Arc::clone(&self.columns))
                .with_filters(memory.filters.clone())
                .with_window(start, count),
            Variant::Join(join) => RowStream::new(join.reader()?, Arc::clone(&self.columns))
                .with_filters(join.filters.clone())
                .with_window(start, count),
        };
        Ok(stream.with_projection(projection))
    }

    /// Row count, when the variant knows it without enumerating.
    pub fn count(&self) -> Option<usize> {
        match &self.variant {
            Variant::Native(native) => native.count(),
            Variant::Memory(memory) => memory.count(),
            Variant::Join(_) => None,
        }
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("kind", &self.kind())
            .field("columns", &self.columns.names())
            .finish()
    }
}
