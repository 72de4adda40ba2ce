//! Fetch execution: runs a resolved fetch plan and stitches the entity graph.
//!
//! Every strategy fills the same link tables (to-one and to-many edges keyed
//! by association path and parent identity) and the graph is built from them
//! afterwards, so the strategies only differ in how many queries they issue.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use graphfetch_proto::{EntityId, OrderDirection, PageRequest, Value};
use tracing::debug;

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{Error, StorageError};
use crate::session::{Association, EntityNode, EntityRecord, Session};
use crate::storage::{JoinedRow, RowSet, StorageExecutor};

use super::assembler::{window, QueryAssembler};
use super::description::{
    JoinKind, Predicate, PredicateOp, QueryDescription, SortKey, TableSelect,
};
use super::fold::fold_rows;
use super::planner::{FetchStrategy, IncludePlan, ResolvedFetch, StrategyKind};

/// Hashable form of a join key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JoinKey {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl JoinKey {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int32(i) => Some(JoinKey::Int(*i as i64)),
            Value::Int64(i) | Value::Timestamp(i) => Some(JoinKey::Int(*i)),
            Value::String(s) => Some(JoinKey::Str(s.clone())),
            Value::Bool(b) => Some(JoinKey::Bool(*b)),
            Value::Null | Value::Float64(_) => None,
        }
    }
}

/// Association edges collected while loading.
#[derive(Debug, Default)]
struct Links {
    one: HashMap<(String, EntityId), Option<Arc<EntityRecord>>>,
    many: HashMap<(String, EntityId), Vec<Arc<EntityRecord>>>,
    /// Distinct records loaded per path, first-seen order; "" holds the roots.
    members: HashMap<String, Vec<Arc<EntityRecord>>>,
    seen: HashSet<(String, EntityId)>,
}

impl Links {
    fn add_member(&mut self, path: &str, record: &Arc<EntityRecord>) {
        if self.seen.insert((path.to_string(), record.id)) {
            self.members
                .entry(path.to_string())
                .or_default()
                .push(record.clone());
        }
    }

    fn members(&self, path: &str) -> Vec<Arc<EntityRecord>> {
        self.members.get(path).cloned().unwrap_or_default()
    }

    fn link_one(&mut self, path: &str, parent: EntityId, record: Option<Arc<EntityRecord>>) {
        self.one.entry((path.to_string(), parent)).or_insert(record);
    }

    fn link_many(&mut self, path: &str, parent: EntityId, record: Option<Arc<EntityRecord>>) {
        let members = self.many.entry((path.to_string(), parent)).or_default();
        if let Some(record) = record {
            if !members.iter().any(|m| m.id == record.id) {
                members.push(record);
            }
        }
    }

    fn link(
        &mut self,
        include: &IncludePlan,
        parent: EntityId,
        record: Option<Arc<EntityRecord>>,
    ) {
        if include.is_to_many() {
            self.link_many(&include.path, parent, record);
        } else {
            self.link_one(&include.path, parent, record);
        }
    }

    /// Order every collection by member identity.
    fn finish(&mut self) {
        for members in self.many.values_mut() {
            members.sort_by_key(|m| m.id);
        }
    }
}

/// Loaded roots plus execution counters.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Root nodes in result order.
    pub roots: Vec<EntityNode>,
    /// Strategy that produced the roots.
    pub strategy: FetchStrategy,
    /// Whether roots were dropped or skipped in memory after a fold.
    pub paginated_in_memory: bool,
    /// Queries issued.
    pub round_trips: usize,
    /// Rows returned by storage across all queries.
    pub rows_read: usize,
}

/// Executes one resolved fetch against storage.
pub struct FetchExecutor<'a, S: StorageExecutor> {
    catalog: &'a Catalog,
    storage: &'a S,
    config: &'a EngineConfig,
    round_trips: usize,
    rows_read: usize,
}

impl<'a, S: StorageExecutor> FetchExecutor<'a, S> {
    /// Create an executor for one call.
    pub fn new(catalog: &'a Catalog, storage: &'a S, config: &'a EngineConfig) -> Self {
        Self {
            catalog,
            storage,
            config,
            round_trips: 0,
            rows_read: 0,
        }
    }

    /// Build the primary query of a fetch without running it.
    ///
    /// Under a fold the row window is replaced by the fanout budget, and the
    /// joined collection's identity is appended to the ordering.
    pub fn primary_query(
        &self,
        root: &str,
        predicates: &[Predicate],
        fetch: &ResolvedFetch,
        page: &PageRequest,
    ) -> Result<QueryDescription, Error> {
        let assembler = QueryAssembler::new(self.catalog);
        let mut query = assembler.assemble(root, predicates, page, self.config.default_row_cap)?;
        for include in fetch.primary_joins() {
            assembler.join_path(&mut query, root, "", &include.path, JoinKind::Left, true)?;
        }

        if let StrategyKind::JoinFold(joined) = &fetch.strategy {
            if let Some(include) = fetch.include(joined) {
                query.order_by.push(SortKey {
                    alias: Some(joined.clone()),
                    column: include.target_entity_def.identity_field.clone(),
                    direction: OrderDirection::Asc,
                });
            }
            query.limit = Some(self.config.max_joined_rows.saturating_add(1));
            query.offset = 0;
        }
        Ok(query)
    }

    /// Run the fetch and build the root nodes.
    ///
    /// A fold the planner chose on its own that overflows the fanout budget
    /// is rerun with batched loads; a demanded fold fails instead.
    pub fn run(
        mut self,
        session: &mut Session,
        root: &str,
        predicates: &[Predicate],
        fetch: &ResolvedFetch,
        page: &PageRequest,
    ) -> Result<FetchOutcome, Error> {
        let mut links = Links::default();
        let query = self.primary_query(root, predicates, fetch, page)?;
        let rows = self.entity_rows(&query)?;

        let mut paginated_in_memory = fetch.paginated_in_memory;

        let rows: Vec<JoinedRow> = match &fetch.strategy {
            StrategyKind::JoinFold(joined) => {
                let budget = self.config.max_joined_rows;
                if rows.len() > budget {
                    if fetch.adaptive {
                        debug!(rows = rows.len(), budget, "fold over budget, loading in batches");
                        return self.run(session, root, predicates, &fetch.batched(), page);
                    }
                    return Err(Error::FanoutBudgetExceeded {
                        rows: rows.len(),
                        budget,
                    });
                }
                let read = rows.len();
                let (limit, offset) = window(page, self.config.default_row_cap)?;
                let groups = fold_rows(rows, |r| r.root.id, |r| r.part(joined).map(|p| p.id));
                if offset > 0 || groups.len() > offset.saturating_add(limit) {
                    paginated_in_memory = true;
                }
                debug!(
                    rows = read,
                    roots = groups.len(),
                    offset,
                    limit,
                    "folded joined rows"
                );
                groups
                    .into_iter()
                    .skip(offset)
                    .take(limit)
                    .flat_map(|g| g.rows)
                    .collect()
            }
            _ => fold_rows(rows, |r| r.root.id, |_| None::<EntityId>)
                .into_iter()
                .flat_map(|g| g.rows)
                .collect(),
        };

        let primary = fetch.primary_joins();
        self.absorb(session, &mut links, root, "", &primary, rows);

        match &fetch.strategy {
            StrategyKind::Lazy => self.load_lazily(session, &mut links, fetch)?,
            _ => {
                for group in fetch.batched_rounds() {
                    self.load_batched(session, &mut links, fetch, group)?;
                }
            }
        }

        links.finish();
        let roots = links
            .members("")
            .iter()
            .map(|record| build_node(fetch, &links, record, ""))
            .collect();

        Ok(FetchOutcome {
            roots,
            strategy: fetch.strategy(),
            paginated_in_memory,
            round_trips: self.round_trips,
            rows_read: self.rows_read,
        })
    }

    fn entity_rows(&mut self, query: &QueryDescription) -> Result<Vec<JoinedRow>, Error> {
        self.round_trips += 1;
        match self.storage.execute(query)? {
            RowSet::Entities(rows) => {
                self.rows_read += rows.len();
                Ok(rows)
            }
            RowSet::Projection(_) => {
                Err(StorageError::Decode("expected entity rows, got projection rows".into()).into())
            }
        }
    }

    /// Intern every row's base record and joined parts, linking parts to
    /// their parents. Returns the base records in row order.
    fn absorb(
        &self,
        session: &mut Session,
        links: &mut Links,
        base_entity: &str,
        base_path: &str,
        joins: &[&IncludePlan],
        rows: Vec<JoinedRow>,
    ) -> Vec<Arc<EntityRecord>> {
        let mut bases = Vec::with_capacity(rows.len());
        for row in rows {
            let base = session.intern(base_entity, row.root);
            links.add_member(base_path, &base);

            let mut parts: HashMap<String, Option<_>> = row.joined.into_iter().collect();
            let mut records: HashMap<&str, Option<Arc<EntityRecord>>> = HashMap::new();
            records.insert(base_path, Some(base.clone()));

            for include in joins {
                let record = parts
                    .remove(&include.path)
                    .flatten()
                    .map(|part| session.intern(include.target_entity(), part));
                let parent = records.get(include.parent_path()).cloned().flatten();
                if let Some(parent) = parent {
                    links.link(include, parent.id, record.clone());
                }
                if let Some(record) = &record {
                    links.add_member(&include.path, record);
                }
                records.insert(&include.path, record);
            }
            bases.push(base);
        }
        bases
    }

    /// One `IN` load per chunk of parent keys for a to-many include.
    fn load_batched(
        &mut self,
        session: &mut Session,
        links: &mut Links,
        fetch: &ResolvedFetch,
        group: &IncludePlan,
    ) -> Result<(), Error> {
        let relation = &group.relation;
        let mut parents_by_key: HashMap<JoinKey, Vec<EntityId>> = HashMap::new();
        let mut keys: Vec<Value> = Vec::new();

        for parent in links.members(group.parent_path()) {
            links.link_many(&group.path, parent.id, None);
            let Some(value) = parent.get(&relation.from_field) else {
                continue;
            };
            let Some(key) = JoinKey::from_value(value) else {
                continue;
            };
            let parents = parents_by_key.entry(key).or_default();
            if parents.is_empty() {
                keys.push(value.clone());
            }
            parents.push(parent.id);
        }

        if keys.is_empty() {
            return Ok(());
        }

        let target = &group.target_entity_def;
        let joins = fetch.group_joins(&group.path);
        let assembler = QueryAssembler::new(self.catalog);
        let chunk_size = self.config.max_batch_keys.unwrap_or(keys.len()).max(1);

        for chunk in keys.chunks(chunk_size) {
            let mut query = QueryDescription::new(TableSelect::entity(target));
            query.predicates.push(Predicate {
                label: group.path.clone(),
                alias: None,
                column: relation.to_field.clone(),
                op: PredicateOp::In(chunk.to_vec()),
            });
            for join in &joins {
                let relative = &join.path[group.path.len() + 1..];
                assembler.join_path(
                    &mut query,
                    &target.name,
                    &group.path,
                    relative,
                    JoinKind::Left,
                    true,
                )?;
            }
            query.order_by.push(SortKey {
                alias: None,
                column: target.identity_field.clone(),
                direction: OrderDirection::Asc,
            });

            let rows = self.entity_rows(&query)?;
            let members = self.absorb(session, links, &target.name, &group.path, &joins, rows);
            for member in members {
                let key = member.get(&relation.to_field).and_then(JoinKey::from_value);
                let Some(parents) = key.and_then(|k| parents_by_key.get(&k)) else {
                    continue;
                };
                for parent in parents {
                    links.link_many(&group.path, *parent, Some(member.clone()));
                }
            }
        }

        debug!(path = %group.path, parents = keys.len(), "batched load");
        Ok(())
    }

    /// One load per distinct parent and association, parents first.
    ///
    /// A to-one associate already in the session is reused without a query.
    fn load_lazily(
        &mut self,
        session: &mut Session,
        links: &mut Links,
        fetch: &ResolvedFetch,
    ) -> Result<(), Error> {
        for include in &fetch.includes {
            let relation = &include.relation;
            let target = &include.target_entity_def;
            let by_identity = !include.is_to_many() && relation.to_field == target.identity_field;

            for parent in links.members(include.parent_path()) {
                let key = parent.get(&relation.from_field).cloned().unwrap_or(Value::Null);
                if key.is_null() {
                    links.link(include, parent.id, None);
                    continue;
                }

                if by_identity {
                    if let Some(cached) = key.as_i64().and_then(|id| session.get(&target.name, id)) {
                        links.link(include, parent.id, Some(cached.clone()));
                        links.add_member(&include.path, &cached);
                        continue;
                    }
                }

                let mut query = QueryDescription::new(TableSelect::entity(target));
                query.predicates.push(Predicate {
                    label: include.path.clone(),
                    alias: None,
                    column: relation.to_field.clone(),
                    op: PredicateOp::Eq(key),
                });
                query.order_by.push(SortKey {
                    alias: None,
                    column: target.identity_field.clone(),
                    direction: OrderDirection::Asc,
                });

                let rows = self.entity_rows(&query)?;
                if rows.is_empty() {
                    links.link(include, parent.id, None);
                }
                for row in rows {
                    let record = session.intern(&target.name, row.root);
                    links.link(include, parent.id, Some(record.clone()));
                    links.add_member(&include.path, &record);
                }
            }
        }
        Ok(())
    }
}

/// Build a node and its loaded associations from the link tables.
fn build_node(
    fetch: &ResolvedFetch,
    links: &Links,
    record: &Arc<EntityRecord>,
    path: &str,
) -> EntityNode {
    let mut node = EntityNode::new(record.clone());
    for include in fetch.children_of(path) {
        let key = (include.path.clone(), record.id);
        let association = if include.is_to_many() {
            Association::Many(
                links
                    .many
                    .get(&key)
                    .map(|members| {
                        members
                            .iter()
                            .map(|m| build_node(fetch, links, m, &include.path))
                            .collect()
                    })
                    .unwrap_or_default(),
            )
        } else {
            Association::One(
                links
                    .one
                    .get(&key)
                    .cloned()
                    .flatten()
                    .map(|r| Box::new(build_node(fetch, links, &r, &include.path))),
            )
        };
        node.associations.insert(include.name().to_string(), association);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, FieldType, RelationDef, ScalarType, SchemaBundle};
    use crate::query::FetchPlanner;
    use crate::storage::{MemoryStore, TableWriter};
    use graphfetch_proto::{FetchPlan, StrategyHint};

    fn catalog() -> Catalog {
        let int = |n: &str| FieldDef::new(n, FieldType::scalar(ScalarType::Int64));
        let team = EntityDef::new("Team", "id")
            .with_field(int("id"))
            .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)));
        let player = EntityDef::new("Player", "id")
            .with_field(int("id"))
            .with_field(FieldDef::optional_scalar("team_id", ScalarType::Int64));

        Catalog::new(
            SchemaBundle::new()
                .with_entity(team)
                .with_entity(player)
                .with_relation(RelationDef::many_to_one(
                    "team", "Player", "team_id", "Team", "id",
                ))
                .with_relation(RelationDef::one_to_many(
                    "players", "Team", "id", "Player", "team_id",
                )),
        )
        .unwrap()
    }

    fn store(catalog: &Catalog) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_tables(catalog).unwrap();
        for (id, name) in [(1i64, "red"), (2, "blue"), (3, "green")] {
            store
                .insert("team", &[("id", Value::Int64(id)), ("name", name.into())])
                .unwrap();
        }
        for (id, team) in [(10i64, Some(2i64)), (11, Some(1)), (12, Some(2)), (13, None)] {
            let team = team.map(Value::Int64).unwrap_or(Value::Null);
            store
                .insert("player", &[("id", Value::Int64(id)), ("team_id", team)])
                .unwrap();
        }
        store
    }

    fn run(
        catalog: &Catalog,
        store: &MemoryStore,
        root: &str,
        plan: FetchPlan,
        page: PageRequest,
    ) -> Result<FetchOutcome, Error> {
        let config = EngineConfig::default();
        let fetch = FetchPlanner::new(catalog).plan(root, &plan, &page)?;
        FetchExecutor::new(catalog, store, &config).run(&mut Session::new(), root, &[], &fetch, &page)
    }

    #[test]
    fn test_lazy_reuses_loaded_to_one() {
        let catalog = catalog();
        let store = store(&catalog);
        let plan = FetchPlan::default()
            .include("team")
            .with_strategy(StrategyHint::Lazy);

        let outcome = run(&catalog, &store, "Player", plan, PageRequest::unpaged()).unwrap();
        // Player 13 has no team; players 10 and 12 share team 2
        assert_eq!(outcome.round_trips, 3);
        assert!(outcome.roots[3].one("team").is_none());
        assert!(outcome.roots[3].is_loaded("team"));
        assert_eq!(outcome.roots[0].one("team").unwrap().id(), 2);
    }

    #[test]
    fn test_batched_collections_are_sorted_and_complete() {
        let catalog = catalog();
        let store = store(&catalog);
        let plan = FetchPlan::default()
            .include("players")
            .with_strategy(StrategyHint::Batched);

        let outcome = run(&catalog, &store, "Team", plan, PageRequest::unpaged()).unwrap();
        assert_eq!(outcome.round_trips, 2);
        let ids: Vec<Vec<EntityId>> = outcome
            .roots
            .iter()
            .map(|t| t.many("players").unwrap().iter().map(|p| p.id()).collect())
            .collect();
        assert_eq!(ids, vec![vec![11], vec![10, 12], vec![]]);
    }

    #[test]
    fn test_fold_pages_roots_in_memory() {
        let catalog = catalog();
        let store = store(&catalog);
        let plan = FetchPlan::default().include("players").allow_in_memory_pagination();

        let outcome = run(&catalog, &store, "Team", plan, PageRequest::new(1, 1)).unwrap();
        assert_eq!(outcome.round_trips, 1);
        assert_eq!(outcome.roots.len(), 1);
        assert_eq!(outcome.roots[0].id(), 2);
        assert_eq!(outcome.roots[0].many("players").unwrap().len(), 2);
    }

    #[test]
    fn test_fanout_budget() {
        let catalog = catalog();
        let store = store(&catalog);
        let config = EngineConfig::default().with_max_joined_rows(2);
        let plan = FetchPlan::default()
            .include("players")
            .with_strategy(StrategyHint::JoinFetch);
        let page = PageRequest::unpaged();
        let fetch = FetchPlanner::new(&catalog).plan("Team", &plan, &page).unwrap();

        let err = FetchExecutor::new(&catalog, &store, &config)
            .run(&mut Session::new(), "Team", &[], &fetch, &page)
            .unwrap_err();
        assert!(matches!(err, Error::FanoutBudgetExceeded { rows: 3, budget: 2 }));
    }

    #[test]
    fn test_chosen_fold_over_budget_loads_in_batches() {
        let catalog = catalog();
        let store = store(&catalog);
        let config = EngineConfig::default().with_max_joined_rows(2);
        let plan = FetchPlan::default().include("players");
        let page = PageRequest::unpaged();
        let fetch = FetchPlanner::new(&catalog).plan("Team", &plan, &page).unwrap();
        assert_eq!(fetch.strategy(), FetchStrategy::JoinFold);

        let outcome = FetchExecutor::new(&catalog, &store, &config)
            .run(&mut Session::new(), "Team", &[], &fetch, &page)
            .unwrap();
        assert_eq!(outcome.strategy, FetchStrategy::Batched);
        // Abandoned fold, root query, players round
        assert_eq!(outcome.round_trips, 3);
        assert!(!outcome.paginated_in_memory);
        let ids: Vec<Vec<EntityId>> = outcome
            .roots
            .iter()
            .map(|t| t.many("players").unwrap().iter().map(|p| p.id()).collect())
            .collect();
        assert_eq!(ids, vec![vec![11], vec![10, 12], vec![]]);
    }

    #[test]
    fn test_unbounded_budget_does_not_overflow() {
        let catalog = catalog();
        let store = store(&catalog);
        let config = EngineConfig::default().with_max_joined_rows(usize::MAX);
        let plan = FetchPlan::default().include("players");
        let page = PageRequest::unpaged();
        let fetch = FetchPlanner::new(&catalog).plan("Team", &plan, &page).unwrap();

        let executor = FetchExecutor::new(&catalog, &store, &config);
        let query = executor.primary_query("Team", &[], &fetch, &page).unwrap();
        assert_eq!(query.limit, Some(usize::MAX));

        let outcome = executor.run(&mut Session::new(), "Team", &[], &fetch, &page).unwrap();
        assert_eq!(outcome.strategy, FetchStrategy::JoinFold);
        assert_eq!(outcome.roots.len(), 3);
    }

    #[test]
    fn test_capped_fold_reports_in_memory_pagination() {
        let catalog = catalog();
        let store = store(&catalog);
        let config = EngineConfig::default().with_row_cap(2);
        let plan = FetchPlan::default().include("players");
        let page = PageRequest::unpaged();
        let fetch = FetchPlanner::new(&catalog).plan("Team", &plan, &page).unwrap();
        assert!(!fetch.paginated_in_memory);

        let outcome = FetchExecutor::new(&catalog, &store, &config)
            .run(&mut Session::new(), "Team", &[], &fetch, &page)
            .unwrap();
        assert_eq!(outcome.strategy, FetchStrategy::JoinFold);
        assert!(outcome.paginated_in_memory);
        assert_eq!(outcome.roots.len(), 2);
    }

    #[test]
    fn test_batch_chunking_counts_round_trips() {
        let catalog = catalog();
        let store = store(&catalog);
        let config = EngineConfig::default().with_max_batch_keys(1);
        let plan = FetchPlan::default()
            .include("players")
            .with_strategy(StrategyHint::Batched);
        let page = PageRequest::unpaged();
        let fetch = FetchPlanner::new(&catalog).plan("Team", &plan, &page).unwrap();

        let outcome = FetchExecutor::new(&catalog, &store, &config)
            .run(&mut Session::new(), "Team", &[], &fetch, &page)
            .unwrap();
        assert_eq!(outcome.round_trips, 4);
        assert_eq!(outcome.roots[1].many("players").unwrap().len(), 2);
    }
}
