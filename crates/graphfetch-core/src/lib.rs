//! graphfetch core - catalog, query assembly, association fetching and
//! projections over a relational store.
//!
//! A [`QueryEngine`] turns sparse search criteria into one filtered query,
//! then materializes the associations a [`FetchPlan`](proto::FetchPlan) asks
//! for with a lazy, joined, fold-joined or batched strategy. Projections skip
//! entity loading and read flat rows from a single join.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod query;
pub mod session;
pub mod storage;

pub use catalog::{
    Cardinality, Catalog, EntityDef, FieldDef, FieldType, RelationDef, ScalarType, SchemaBundle,
};
pub use config::{EngineConfig, DEFAULT_MAX_BATCH_KEYS, DEFAULT_MAX_JOINED_ROWS, DEFAULT_ROW_CAP};
pub use engine::{Explain, QueryEngine, QueryStats, ResultPage, SearchSpec};
pub use error::{Error, StorageError};
pub use query::{CriteriaSchema, CriterionDef, CriterionKind, FetchStrategy, TextMatch};
pub use session::{Association, EntityNode, EntityRecord, Session};
pub use storage::{MemoryStore, SqliteExecutor, StorageExecutor, TableWriter};

/// Re-export protocol types.
pub use graphfetch_proto as proto;
