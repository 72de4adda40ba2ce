//! Association fetch planner.
//!
//! The planner resolves a [`FetchPlan`]'s include paths against the catalog,
//! validates them, and picks the strategy used to materialize them:
//!
//! - **Lazy**: no joins; each association is loaded per parent when touched.
//! - **Join**: to-one associations joined into the root query; pagination exact.
//! - **JoinFold**: to-one joins plus one to-many join, folded per root.
//!   Pagination of roots happens in memory after overfetching.
//! - **Batched**: to-one joins in the root query, then one `IN` load per
//!   to-many association for all fetched parents.

use std::collections::HashSet;
use std::fmt;

use graphfetch_proto::{FetchPlan, PageRequest, PaginationMode, StrategyHint};

use crate::catalog::{Catalog, EntityDef, RelationDef};
use crate::error::Error;

/// Strategy chosen for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// One load per touched parent association.
    Lazy,
    /// Single eager join of to-one associations.
    Join,
    /// Eager join with one to-many association, folded per root.
    JoinFold,
    /// Root query plus batched secondary loads.
    Batched,
    /// Flat projection without entity materialization.
    Projection,
}

impl FetchStrategy {
    /// Short name used in logs and explain output.
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStrategy::Lazy => "lazy",
            FetchStrategy::Join => "join",
            FetchStrategy::JoinFold => "join-fold",
            FetchStrategy::Batched => "batched",
            FetchStrategy::Projection => "projection",
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plan for fetching one association path.
#[derive(Debug, Clone)]
pub struct IncludePlan {
    /// Full path from the root (e.g., "orderItems.item").
    pub path: String,
    /// Relation definition.
    pub relation: RelationDef,
    /// Target entity definition.
    pub target_entity_def: EntityDef,
    /// Path of the deepest to-many include on the chain to this one,
    /// itself included. `None` when the chain from the root is all to-one.
    pub load_group: Option<String>,
}

impl IncludePlan {
    /// Get the parent path, empty for top-level includes.
    pub fn parent_path(&self) -> &str {
        self.path.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("")
    }

    /// Association name on the parent entity.
    pub fn name(&self) -> &str {
        &self.relation.name
    }

    /// Check whether this include loads a collection.
    pub fn is_to_many(&self) -> bool {
        self.relation.is_to_many()
    }

    /// Get the target entity name from the relation.
    pub fn target_entity(&self) -> &str {
        &self.relation.to_entity
    }
}

/// Resolved fetch plan for one call.
#[derive(Debug, Clone)]
pub struct ResolvedFetch {
    /// Chosen strategy.
    pub strategy: StrategyKind,
    /// Includes, parents before children.
    pub includes: Vec<IncludePlan>,
    /// Whether root pagination is applied in memory.
    pub paginated_in_memory: bool,
    /// Whether the strategy was chosen by the planner rather than demanded,
    /// so an over-budget fold may fall back to batched loading.
    pub adaptive: bool,
}

/// Strategy plus the to-many path a fold joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyKind {
    /// Lazy loads.
    Lazy,
    /// To-one joins only.
    Join,
    /// To-one joins plus the named to-many join.
    JoinFold(String),
    /// To-one joins plus batched rounds.
    Batched,
}

impl ResolvedFetch {
    /// Public strategy label.
    pub fn strategy(&self) -> FetchStrategy {
        match self.strategy {
            StrategyKind::Lazy => FetchStrategy::Lazy,
            StrategyKind::Join => FetchStrategy::Join,
            StrategyKind::JoinFold(_) => FetchStrategy::JoinFold,
            StrategyKind::Batched => FetchStrategy::Batched,
        }
    }

    /// The same includes loaded with batched rounds.
    pub fn batched(&self) -> ResolvedFetch {
        ResolvedFetch {
            strategy: StrategyKind::Batched,
            includes: self.includes.clone(),
            paginated_in_memory: false,
            adaptive: false,
        }
    }

    /// Get an include by path.
    pub fn include(&self, path: &str) -> Option<&IncludePlan> {
        self.includes.iter().find(|i| i.path == path)
    }

    /// Includes directly under a parent path ("" for the root).
    pub fn children_of<'s>(&'s self, parent: &'s str) -> impl Iterator<Item = &'s IncludePlan> {
        self.includes.iter().filter(move |i| i.parent_path() == parent)
    }

    /// Includes that join into the root query.
    pub fn primary_joins(&self) -> Vec<&IncludePlan> {
        match &self.strategy {
            StrategyKind::Lazy => Vec::new(),
            StrategyKind::Join | StrategyKind::Batched => self
                .includes
                .iter()
                .filter(|i| i.load_group.is_none())
                .collect(),
            StrategyKind::JoinFold(joined) => self
                .includes
                .iter()
                .filter(|i| match &i.load_group {
                    None => true,
                    Some(group) => group == joined,
                })
                .collect(),
        }
    }

    /// To-many includes loaded by secondary batched rounds, parents first.
    pub fn batched_rounds(&self) -> Vec<&IncludePlan> {
        match &self.strategy {
            StrategyKind::Lazy | StrategyKind::Join => Vec::new(),
            StrategyKind::JoinFold(joined) => self
                .includes
                .iter()
                .filter(|i| i.is_to_many() && &i.path != joined)
                .collect(),
            StrategyKind::Batched => self.includes.iter().filter(|i| i.is_to_many()).collect(),
        }
    }

    /// To-one includes joined into the batched round of `group`.
    pub fn group_joins(&self, group: &str) -> Vec<&IncludePlan> {
        self.includes
            .iter()
            .filter(|i| i.path != group && i.load_group.as_deref() == Some(group))
            .collect()
    }
}

/// Planner that resolves fetch plans against a catalog.
pub struct FetchPlanner<'a> {
    catalog: &'a Catalog,
}

impl<'a> FetchPlanner<'a> {
    /// Create a new planner with a catalog reference.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Resolve a fetch plan and choose its strategy.
    ///
    /// Fails before any query runs when an include path is unknown, a nested
    /// include lacks its parent, or a demanded eager join is illegal.
    pub fn plan(
        &self,
        root: &str,
        plan: &FetchPlan,
        page: &PageRequest,
    ) -> Result<ResolvedFetch, Error> {
        self.catalog.entity(root)?;
        let includes = self.plan_includes(root, plan)?;

        let to_many: Vec<&IncludePlan> = includes.iter().filter(|i| i.is_to_many()).collect();
        let paginated = page.is_paginated();
        let exact = plan.pagination == PaginationMode::Exact;

        let strategy = match plan.strategy {
            StrategyHint::Lazy => StrategyKind::Lazy,
            StrategyHint::Batched => StrategyKind::Batched,
            StrategyHint::JoinFetch => match to_many.as_slice() {
                [] => StrategyKind::Join,
                [one] if !(paginated && exact) => StrategyKind::JoinFold(one.path.clone()),
                [one] => {
                    return Err(Error::IllegalFetchCombination(format!(
                        "joining collection '{}' cannot honor exact pagination",
                        one.path
                    )))
                }
                many => {
                    let paths: Vec<&str> = many.iter().map(|i| i.path.as_str()).collect();
                    return Err(Error::IllegalFetchCombination(format!(
                        "cannot eagerly join more than one collection: {}",
                        paths.join(", ")
                    )));
                }
            },
            StrategyHint::Auto => match to_many.as_slice() {
                [] => StrategyKind::Join,
                [one] if !(paginated && exact) => StrategyKind::JoinFold(one.path.clone()),
                _ => StrategyKind::Batched,
            },
        };

        let paginated_in_memory = matches!(strategy, StrategyKind::JoinFold(_)) && paginated;

        Ok(ResolvedFetch {
            strategy,
            includes,
            paginated_in_memory,
            adaptive: plan.strategy == StrategyHint::Auto,
        })
    }

    /// Resolve include paths, parents before children, duplicates collapsed.
    fn plan_includes(&self, root: &str, plan: &FetchPlan) -> Result<Vec<IncludePlan>, Error> {
        let mut seen = HashSet::new();
        let mut paths: Vec<&str> = plan
            .effective_includes()
            .into_iter()
            .filter(|p| seen.insert(*p))
            .collect();

        for path in &paths {
            if let Some((parent, _)) = path.rsplit_once('.') {
                if !seen.contains(parent) {
                    return Err(Error::IllegalFetchCombination(format!(
                        "include '{}' requires its parent '{}' to be included",
                        path, parent
                    )));
                }
            }
        }

        // Stable sort keeps declaration order within a depth
        paths.sort_by_key(|p| p.matches('.').count());

        let mut includes: Vec<IncludePlan> = Vec::with_capacity(paths.len());
        for path in paths {
            let (parent_path, name) = match path.rsplit_once('.') {
                Some((parent, name)) => (parent, name),
                None => ("", path),
            };
            let (parent_entity, parent_group) = match includes.iter().find(|i| i.path == parent_path)
            {
                Some(parent) => (parent.target_entity().to_string(), parent.load_group.clone()),
                None => (root.to_string(), None),
            };

            let relation = self.catalog.relation(&parent_entity, name)?.clone();
            let target_entity_def = self.catalog.entity(&relation.to_entity)?.clone();
            let load_group = if relation.is_to_many() {
                Some(path.to_string())
            } else {
                parent_group
            };

            includes.push(IncludePlan {
                path: path.to_string(),
                relation,
                target_entity_def,
                load_group,
            });
        }

        Ok(includes)
    }
}
