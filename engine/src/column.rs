//! Column descriptors and the alias model.
//!
//! A [`ColumnDescriptor`] is a column as the backing store knows it. An
//! [`AliasColumn`] is the name a selector exposes for it, together with the
//! physical position of the value in the rows the selector reads. Renaming an
//! alias keeps the physical position, so values stay bound to their origin
//! through any number of projections.

use crate::{error::Result, Error, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Data types a column can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int,
    Float,
    Text,
    DateTime,
    /// Untyped column, accepts any value
    Any,
}

impl DataType {
    /// Check whether a value may be stored in a column of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (DataType::Any, _) => true,
            (DataType::Float, Value::Int(_)) => true,
            (expected, v) => v.data_type() == Some(*expected),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Bool => write!(f, "Bool"),
            DataType::Int => write!(f, "Int"),
            DataType::Float => write!(f, "Float"),
            DataType::Text => write!(f, "Text"),
            DataType::DateTime => write!(f, "DateTime"),
            DataType::Any => write!(f, "Any"),
        }
    }
}

/// A column as described by its backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// Store-native column name
    pub name: String,
    /// Declared data type
    pub data_type: DataType,
    /// Free-form attributes (key, nullable, caption, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl ColumnDescriptor {
    /// Create a new column descriptor without attributes.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style method to add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Get an attribute value.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// A column exposed by a selector under an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasColumn {
    /// Exposed name
    pub alias: String,
    /// The native column this alias is bound to
    pub column: ColumnDescriptor,
    /// Position of the value in the selector's physical row
    pub position: usize,
    /// Names this alias was previously exposed under, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub renamed_from: Vec<String>,
}

impl AliasColumn {
    /// Bind a fresh alias to a native column.
    pub fn from_native(
        native: &ColumnDescriptor,
        position: usize,
        exposed_name: impl Into<String>,
    ) -> Self {
        Self {
            alias: exposed_name.into(),
            column: native.clone(),
            position,
            renamed_from: Vec::new(),
        }
    }

    /// Rename an existing alias, keeping its physical binding.
    pub fn from_existing(existing: &AliasColumn, new_name: impl Into<String>) -> Self {
        let new_name = new_name.into();
        let mut renamed_from = existing.renamed_from.clone();
        if existing.alias != new_name {
            renamed_from.push(existing.alias.clone());
        }
        Self {
            alias: new_name,
            column: existing.column.clone(),
            position: existing.position,
            renamed_from,
        }
    }

    /// Exposed name.
    pub fn name(&self) -> &str {
        &self.alias
    }

    /// Name of the native column backing this alias.
    pub fn native_name(&self) -> &str {
        &self.column.name
    }

    pub fn data_type(&self) -> DataType {
        self.column.data_type
    }
}

/// Case-insensitive name comparison.
pub(crate) fn names_match(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// The ordered column list of a selector.
///
/// Aliases are unique within a list, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnList {
    columns: Vec<AliasColumn>,
}

impl ColumnList {
    /// Create a column list, rejecting duplicate aliases.
    pub fn new(columns: Vec<AliasColumn>) -> Result<Self> {
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| names_match(&c.alias, &column.alias)) {
                return Err(Error::DuplicateColumn(column.alias.clone()));
            }
        }
        Ok(Self { columns })
    }

    /// Expose native columns under their own names, in native order.
    pub fn from_natives(natives: &[ColumnDescriptor]) -> Result<Self> {
        Self::new(
            natives
                .iter()
                .enumerate()
                .map(|(i, c)| AliasColumn::from_native(c, i, c.name.clone()))
                .collect(),
        )
    }

    /// Case-insensitive linear lookup of an alias.
    pub fn find_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| names_match(&c.alias, name))
    }

    /// Find an alias by name.
    pub fn find(&self, name: &str) -> Option<&AliasColumn> {
        self.find_index(name).map(|i| &self.columns[i])
    }

    /// Find an alias by name, failing with an invalid-reference error.
    pub fn resolve(&self, name: &str) -> Result<&AliasColumn> {
        self.find(name)
            .ok_or_else(|| Error::InvalidReference(name.to_string()))
    }

    pub fn get(&self, index: usize) -> Option<&AliasColumn> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AliasColumn> {
        self.columns.iter()
    }

    /// Exposed names in order.
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.alias.as_str()).collect()
    }

    /// Physical positions in order.
    pub fn positions(&self) -> Vec<usize> {
        self.columns.iter().map(|c| c.position).collect()
    }

    /// True when the list exposes a physical row of `width` unchanged.
    pub fn is_identity(&self, width: usize) -> bool {
        self.columns.len() == width && self.columns.iter().enumerate().all(|(i, c)| c.position == i)
    }
}

impl<'a> IntoIterator for &'a ColumnList {
    type Item = &'a AliasColumn;
    type IntoIter = std::slice::Iter<'a, AliasColumn>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
