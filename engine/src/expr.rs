//! Pre-parsed filter, order and projection expressions.
//!
//! Expressions name columns by their exposed alias. They are compiled once,
//! at composition time, into position-based forms; nothing is resolved by
//! name while rows are being enumerated.

use crate::{error::Result, Row, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, actual: &Value, operand: &Value) -> bool {
        match self {
            CompareOp::Eq => actual.matches(operand),
            CompareOp::Ne => actual.comparable_with(operand) && !actual.matches(operand),
            _ if !actual.comparable_with(operand) => false,
            CompareOp::Lt => actual.compare(operand) == Ordering::Less,
            CompareOp::Le => actual.compare(operand) != Ordering::Greater,
            CompareOp::Gt => actual.compare(operand) == Ordering::Greater,
            CompareOp::Ge => actual.compare(operand) != Ordering::Less,
        }
    }
}

/// A filter predicate over named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FilterExpr {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull {
        column: String,
    },
    And {
        items: Vec<FilterExpr>,
    },
    Or {
        items: Vec<FilterExpr>,
    },
    Not {
        item: Box<FilterExpr>,
    },
}

impl FilterExpr {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        FilterExpr::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        FilterExpr::IsNull {
            column: column.into(),
        }
    }

    pub fn and(items: Vec<FilterExpr>) -> Self {
        FilterExpr::And { items }
    }

    pub fn or(items: Vec<FilterExpr>) -> Self {
        FilterExpr::Or { items }
    }

    pub fn not(item: FilterExpr) -> Self {
        FilterExpr::Not {
            item: Box::new(item),
        }
    }

    /// Rewrite every column name, e.g. from exposed aliases to native names.
    pub fn map_columns<F>(&self, f: &F) -> Result<FilterExpr>
    where
        F: Fn(&str) -> Result<String>,
    {
        Ok(match self {
            FilterExpr::Compare { column, op, value } => FilterExpr::Compare {
                column: f(column)?,
                op: *op,
                value: value.clone(),
            },
            FilterExpr::IsNull { column } => FilterExpr::IsNull { column: f(column)? },
            FilterExpr::And { items } => FilterExpr::And {
                items: items.iter().map(|e| e.map_columns(f)).collect::<Result<_>>()?,
            },
            FilterExpr::Or { items } => FilterExpr::Or {
                items: items.iter().map(|e| e.map_columns(f)).collect::<Result<_>>()?,
            },
            FilterExpr::Not { item } => FilterExpr::Not {
                item: Box::new(item.map_columns(f)?),
            },
        })
    }

    /// Compile against a row shape; `resolve` maps a column name to its
    /// physical position.
    pub fn compile<F>(&self, resolve: &F) -> Result<CompiledFilter>
    where
        F: Fn(&str) -> Result<usize>,
    {
        Ok(match self {
            FilterExpr::Compare { column, op, value } => CompiledFilter::Compare {
                position: resolve(column)?,
                op: *op,
                value: value.clone(),
            },
            FilterExpr::IsNull { column } => CompiledFilter::IsNull {
                position: resolve(column)?,
            },
            FilterExpr::And { items } => CompiledFilter::And(
                items.iter().map(|e| e.compile(resolve)).collect::<Result<_>>()?,
            ),
            FilterExpr::Or { items } => CompiledFilter::Or(
                items.iter().map(|e| e.compile(resolve)).collect::<Result<_>>()?,
            ),
            FilterExpr::Not { item } => CompiledFilter::Not(Box::new(item.compile(resolve)?)),
        })
    }
}

/// A filter resolved to row positions.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledFilter {
    Compare {
        position: usize,
        op: CompareOp,
        value: Value,
    },
    IsNull {
        position: usize,
    },
    And(Vec<CompiledFilter>),
    Or(Vec<CompiledFilter>),
    Not(Box<CompiledFilter>),
}

impl CompiledFilter {
    /// Evaluate against a row. Comparisons involving null are false.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            CompiledFilter::Compare {
                position,
                op,
                value,
            } => op.holds(row.value_at(*position), value),
            CompiledFilter::IsNull { position } => row.value_at(*position).is_null(),
            CompiledFilter::And(items) => items.iter().all(|f| f.matches(row)),
            CompiledFilter::Or(items) => items.iter().any(|f| f.matches(row)),
            CompiledFilter::Not(item) => !item.matches(row),
        }
    }
}

/// Sort direction of an order item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One column of an ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// An ordering over named columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderExpr {
    pub items: Vec<OrderItem>,
}

impl OrderExpr {
    /// Ascending order over the given columns.
    pub fn ascending<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            items: columns
                .iter()
                .map(|c| OrderItem {
                    column: c.as_ref().to_string(),
                    direction: SortDirection::Ascending,
                })
                .collect(),
        }
    }

    /// Builder-style method to append an item.
    pub fn then(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.items.push(OrderItem {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Rewrite every column name.
    pub fn map_columns<F>(&self, f: &F) -> Result<OrderExpr>
    where
        F: Fn(&str) -> Result<String>,
    {
        Ok(Self {
            items: self
                .items
                .iter()
                .map(|item| {
                    Ok(OrderItem {
                        column: f(&item.column)?,
                        direction: item.direction,
                    })
                })
                .collect::<Result<_>>()?,
        })
    }

    /// Compile to (position, direction) pairs.
    pub fn compile<F>(&self, resolve: &F) -> Result<CompiledOrder>
    where
        F: Fn(&str) -> Result<usize>,
    {
        Ok(CompiledOrder {
            keys: self
                .items
                .iter()
                .map(|item| Ok((resolve(&item.column)?, item.direction)))
                .collect::<Result<_>>()?,
        })
    }
}

/// An ordering resolved to row positions.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledOrder {
    keys: Vec<(usize, SortDirection)>,
}

impl CompiledOrder {
    /// Compare two rows under this ordering.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for &(position, direction) in &self.keys {
            let ordering = a.value_at(position).compare(b.value_at(position));
            let ordering = match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    pub fn positions(&self) -> &[(usize, SortDirection)] {
        &self.keys
    }
}

/// A requested output column: a source name and an optional new alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    /// Expose the column under a different name.
    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// The name the column will be exposed under.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::new(name)
    }
}
