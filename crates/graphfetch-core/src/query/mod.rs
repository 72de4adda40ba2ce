//! Query layer.
//!
//! Criteria are bound to predicates, predicates and a page are assembled into
//! a [`QueryDescription`], and the fetch planner decides how associations are
//! materialized around it. Projections compile to a single flat query.

mod assembler;
mod criteria;
mod description;
mod executor;
mod fold;
mod planner;
mod projection;

pub use assembler::QueryAssembler;
pub use criteria::{CriteriaSchema, CriterionDef, CriterionKind, PredicateBuilder, TextMatch};
pub use description::{
    ColumnRef, JoinKind, JoinSpec, Predicate, PredicateOp, QueryDescription, SelectColumn,
    Selection, SortKey, TableSelect,
};
pub use executor::{FetchExecutor, FetchOutcome};
pub use fold::{fold_rows, FoldedGroup};
pub use planner::{FetchPlanner, FetchStrategy, IncludePlan, ResolvedFetch, StrategyKind};
pub use projection::ProjectionPlanner;
