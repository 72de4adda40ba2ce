//! Storage execution layer.
//!
//! The engine hands every read to a [`StorageExecutor`] as a
//! [`QueryDescription`](crate::query::QueryDescription) and gets rows back.
//! Two executors ship with the crate:
//!
//! - [`MemoryStore`] - in-process tables with nested-loop joins
//! - [`SqliteExecutor`] - parameterized SQL over a `rusqlite` connection

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteExecutor;

use graphfetch_proto::{EntityId, ProjectionRow, Value};

use crate::catalog::Catalog;
use crate::error::StorageError;
use crate::query::QueryDescription;

/// One entity's columns as read from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    /// Identity value.
    pub id: EntityId,
    /// Column values in selection order.
    pub fields: Vec<(String, Value)>,
}

impl EntityRow {
    /// Get a field value by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == field).map(|(_, v)| v)
    }
}

/// One result row of an entity query.
///
/// `joined` holds one entry per fetched join, in join order; `None` when a
/// left join found no match.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    /// Root entity columns.
    pub root: EntityRow,
    /// Fetched joins by alias.
    pub joined: Vec<(String, Option<EntityRow>)>,
}

impl JoinedRow {
    /// Get the part of a fetched join.
    pub fn part(&self, alias: &str) -> Option<&EntityRow> {
        self.joined
            .iter()
            .find(|(a, _)| a == alias)
            .and_then(|(_, row)| row.as_ref())
    }
}

/// Rows returned by one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSet {
    /// Entity rows, one per joined tuple.
    Entities(Vec<JoinedRow>),
    /// Flat projection rows.
    Projection(Vec<ProjectionRow>),
}

impl RowSet {
    /// Number of rows returned.
    pub fn len(&self) -> usize {
        match self {
            RowSet::Entities(rows) => rows.len(),
            RowSet::Projection(rows) => rows.len(),
        }
    }

    /// Check whether no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Executes query descriptions against a relational store.
///
/// Every call is one round trip.
pub trait StorageExecutor {
    /// Run one query.
    fn execute(&self, query: &QueryDescription) -> Result<RowSet, StorageError>;
}

impl<S: StorageExecutor + ?Sized> StorageExecutor for &S {
    fn execute(&self, query: &QueryDescription) -> Result<RowSet, StorageError> {
        (**self).execute(query)
    }
}

/// Schema setup and row loading for fixtures and embedding.
pub trait TableWriter {
    /// Create one table per catalog entity.
    fn create_tables(&self, catalog: &Catalog) -> Result<(), StorageError>;

    /// Insert one row; omitted columns are null.
    fn insert(&self, table: &str, row: &[(&str, Value)]) -> Result<(), StorageError>;
}
