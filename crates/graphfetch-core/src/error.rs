//! Core error types.

use thiserror::Error;

/// Errors raised by storage executors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite driver error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Query referenced a table the store does not hold.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Query referenced a column the table does not have.
    #[error("unknown column {column} on table {table}")]
    UnknownColumn { table: String, column: String },

    /// Stored data could not be decoded into the declared type.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Core engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Entity is not declared in the catalog.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Field is not declared on the entity.
    #[error("unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    /// Association is not declared on the entity.
    #[error("unknown association '{name}' on entity '{entity}'")]
    UnknownAssociation { entity: String, name: String },

    /// Schema bundle failed validation.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Search criteria could not be turned into predicates.
    #[error("invalid criterion '{field}': {reason}")]
    InvalidCriteria { field: String, reason: String },

    /// Fetch plan asks for a join the engine refuses to run.
    #[error("illegal fetch combination: {0}")]
    IllegalFetchCombination(String),

    /// Projection shape cannot be satisfied by one flat join.
    #[error("invalid projection: {0}")]
    InvalidProjection(String),

    /// Page request is malformed.
    #[error("invalid page: {0}")]
    InvalidPage(String),

    /// Engine configuration is malformed.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A fold query produced more joined rows than the fanout budget allows.
    #[error("joined row budget exceeded: more than {budget} rows (read {rows})")]
    FanoutBudgetExceeded { rows: usize, budget: usize },

    /// Storage execution error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] graphfetch_proto::Error),
}

impl Error {
    pub(crate) fn criteria(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidCriteria {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
