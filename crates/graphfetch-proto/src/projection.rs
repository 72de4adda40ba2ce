//! Flat projection shapes and rows.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::value::Value;

/// One output column of a projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedColumn {
    /// Output column name.
    pub alias: String,
    /// Path from the root: `"orderDate"` or `"member.name"`.
    pub path: String,
}

/// A declared flat row shape over the root and its to-one associations.
///
/// Associations traversed by column paths are inner-joined unless listed in
/// `left_joins`, in which case missing associates yield null columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionShape {
    /// Root entity name.
    pub root: String,
    /// Output columns in order.
    pub columns: Vec<ProjectedColumn>,
    /// Association paths to outer-join instead of inner-join.
    pub left_joins: Vec<String>,
}

impl ProjectionShape {
    /// Create an empty shape over a root entity.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            columns: vec![],
            left_joins: vec![],
        }
    }

    /// Add a column.
    pub fn column(mut self, alias: impl Into<String>, path: impl Into<String>) -> Self {
        self.columns.push(ProjectedColumn {
            alias: alias.into(),
            path: path.into(),
        });
        self
    }

    /// Outer-join an association path.
    pub fn left_join(mut self, path: impl Into<String>) -> Self {
        self.left_joins.push(path.into());
        self
    }
}

/// One flat result row, columns in shape order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRow {
    /// Column values keyed by alias.
    pub values: Vec<(String, Value)>,
}

impl ProjectionRow {
    /// Create a row from alias/value pairs.
    pub fn new(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }

    /// Raw value of a column.
    pub fn value(&self, alias: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == alias)
            .map(|(_, v)| v)
    }

    /// Typed value of a non-null column.
    pub fn get<'a, T>(&'a self, alias: &str) -> Result<T, Error>
    where
        T: TryFrom<&'a Value, Error = Error>,
    {
        let value = self
            .value(alias)
            .ok_or_else(|| Error::MissingColumn(alias.to_string()))?;
        T::try_from(value)
    }

    /// Typed value of a nullable column.
    pub fn get_opt<'a, T>(&'a self, alias: &str) -> Result<Option<T>, Error>
    where
        T: TryFrom<&'a Value, Error = Error>,
    {
        match self.value(alias) {
            None => Err(Error::MissingColumn(alias.to_string())),
            Some(Value::Null) => Ok(None),
            Some(value) => T::try_from(value).map(Some),
        }
    }
}

/// Conversion from a projection row into a caller-defined flat type.
pub trait FromProjection: Sized {
    /// Build the value from one row.
    fn from_row(row: &ProjectionRow) -> Result<Self, Error>;
}

impl FromProjection for ProjectionRow {
    fn from_row(row: &ProjectionRow) -> Result<Self, Error> {
        Ok(row.clone())
    }
}
