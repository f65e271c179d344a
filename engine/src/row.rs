//! Row type shared by every selector.

use crate::Value;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

static NULL: Value = Value::Null;

/// A row of values addressed by position.
///
/// Rows are cheap to clone. A row produced by a join keeps both halves and
/// routes `value_at` to the half that owns the position; a missing right
/// half (outer join) reads as null.
#[derive(Debug, Clone)]
pub struct Row {
    cells: Cells,
}

#[derive(Debug, Clone)]
enum Cells {
    Flat(Arc<[Value]>),
    Joined {
        left: Arc<Row>,
        right: Option<Arc<Row>>,
        left_width: usize,
        right_width: usize,
    },
}

impl Row {
    /// Create a row from values.
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            cells: Cells::Flat(values.into()),
        }
    }

    /// Combine the two halves of a join result.
    pub fn joined(left: Row, right: Option<Row>, left_width: usize, right_width: usize) -> Self {
        Self {
            cells: Cells::Joined {
                left: Arc::new(left),
                right: right.map(Arc::new),
                left_width,
                right_width,
            },
        }
    }

    /// Number of positions in this row.
    pub fn width(&self) -> usize {
        match &self.cells {
            Cells::Flat(values) => values.len(),
            Cells::Joined {
                left_width,
                right_width,
                ..
            } => left_width + right_width,
        }
    }

    /// Value at a position. Positions past the row read as null.
    pub fn value_at(&self, index: usize) -> &Value {
        match &self.cells {
            Cells::Flat(values) => values.get(index).unwrap_or(&NULL),
            Cells::Joined {
                left,
                right,
                left_width,
                ..
            } => {
                if index < *left_width {
                    left.value_at(index)
                } else {
                    match right {
                        Some(right) => right.value_at(index - left_width),
                        None => &NULL,
                    }
                }
            }
        }
    }

    /// Iterate over all values in position order.
    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        (0..self.width()).map(move |i| self.value_at(i))
    }

    /// Copy the values into a vector.
    pub fn to_vec(&self) -> Vec<Value> {
        self.values().cloned().collect()
    }

    /// Build a flat row from the given positions.
    pub fn project(&self, positions: &[usize]) -> Row {
        Row::new(positions.iter().map(|&p| self.value_at(p).clone()).collect())
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width() && self.values().zip(other.values()).all(|(a, b)| a == b)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.width()))?;
        for value in self.values() {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Value>::deserialize(deserializer).map(Row::new)
    }
}

/// Build a [`Row`] from a list of expressions convertible into [`Value`].
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        $crate::Row::new(vec![$($crate::Value::from($value)),*])
    };
}
