//! Graphfetch request and result types.
//!
//! This crate defines the caller-facing types shared by the engine and its
//! storage backends. All types derive serde's `Serialize` and `Deserialize`
//! so fetch plans and criteria can be loaded from configuration or logged.
//!
//! # Modules
//!
//! - [`value`] - Runtime scalar values for criteria, rows and projections
//! - [`query`] - Search criteria, fetch plans and page requests
//! - [`projection`] - Flat projection shapes and rows
//! - [`error`] - Value extraction errors

pub mod error;
pub mod projection;
pub mod query;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use projection::{FromProjection, ProjectedColumn, ProjectionRow, ProjectionShape};
pub use query::{
    FetchDepth, FetchPlan, OrderDirection, OrderSpec, PageRequest, PaginationMode,
    SearchCriteria, StrategyHint,
};
pub use value::Value;

/// Identity of an entity instance.
pub type EntityId = i64;
