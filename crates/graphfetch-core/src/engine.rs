//! Query engine combining a catalog, a storage executor and configuration.

use std::fmt;

use graphfetch_proto::{
    FetchPlan, FromProjection, PageRequest, ProjectionRow, ProjectionShape, SearchCriteria,
};
use tracing::{debug, instrument};

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{Error, StorageError};
use crate::query::{
    CriteriaSchema, FetchExecutor, FetchPlanner, FetchStrategy, PredicateBuilder,
    ProjectionPlanner, QueryDescription,
};
use crate::session::{EntityNode, Session};
use crate::storage::{RowSet, StorageExecutor};

/// A root entity with its bound search criteria.
#[derive(Debug, Clone)]
pub struct SearchSpec {
    builder: PredicateBuilder,
}

impl SearchSpec {
    /// Root entity searched.
    pub fn root(&self) -> &str {
        self.builder.root()
    }

    /// Bound predicate builder.
    pub fn predicates(&self) -> &PredicateBuilder {
        &self.builder
    }
}

/// Counters for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryStats {
    /// Strategy used.
    pub strategy: FetchStrategy,
    /// Queries issued to storage.
    pub round_trips: usize,
    /// Rows returned by storage.
    pub rows_read: usize,
    /// Whether offset and limit were applied in memory after overfetching.
    pub paginated_in_memory: bool,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage<T> {
    /// Results in order.
    pub items: Vec<T>,
    /// Execution counters.
    pub stats: QueryStats,
}

impl<T> ResultPage<T> {
    /// Number of results.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check whether the page is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// What a search would do, without running it.
#[derive(Debug, Clone, PartialEq)]
pub struct Explain {
    /// Strategy the planner picked.
    pub strategy: FetchStrategy,
    /// Whether pagination would be applied in memory.
    pub paginated_in_memory: bool,
    /// Primary query.
    pub primary: QueryDescription,
    /// Paths loaded by batched secondary rounds, in load order.
    pub batched_rounds: Vec<String>,
}

impl fmt::Display for Explain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "strategy: {}", self.strategy)?;
        if self.paginated_in_memory {
            writeln!(f, "pagination: in memory")?;
        }
        write!(f, "primary: {}", self.primary)?;
        for path in &self.batched_rounds {
            write!(f, "\nbatched: {}", path)?;
        }
        Ok(())
    }
}

/// The query and projection engine.
pub struct QueryEngine<S: StorageExecutor> {
    catalog: Catalog,
    storage: S,
    config: EngineConfig,
}

impl<S: StorageExecutor> QueryEngine<S> {
    /// Create an engine with default configuration.
    pub fn new(catalog: Catalog, storage: S) -> Self {
        Self {
            catalog,
            storage,
            config: EngineConfig::default(),
        }
    }

    /// Create an engine with a validated configuration.
    pub fn with_config(catalog: Catalog, storage: S, config: EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            catalog,
            storage,
            config,
        })
    }

    /// The catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The storage executor.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bind a criteria schema to its root entity.
    pub fn bind(&self, schema: &CriteriaSchema) -> Result<SearchSpec, Error> {
        Ok(SearchSpec {
            builder: PredicateBuilder::bind(&self.catalog, schema)?,
        })
    }

    /// Search roots and materialize the associations a fetch plan asks for.
    ///
    /// Criteria, plan and page are validated before any query runs. Loaded
    /// records are interned in `session`.
    #[instrument(skip_all, fields(root = %spec.root()))]
    pub fn search(
        &self,
        session: &mut Session,
        spec: &SearchSpec,
        criteria: &SearchCriteria,
        plan: &FetchPlan,
        page: &PageRequest,
    ) -> Result<ResultPage<EntityNode>, Error> {
        let predicates = spec.builder.build(criteria)?;
        let fetch = FetchPlanner::new(&self.catalog).plan(spec.root(), plan, page)?;
        debug!(
            strategy = %fetch.strategy(),
            predicates = predicates.len(),
            includes = fetch.includes.len(),
            "fetch planned"
        );

        let outcome = FetchExecutor::new(&self.catalog, &self.storage, &self.config).run(
            session,
            spec.root(),
            &predicates,
            &fetch,
            page,
        )?;

        let stats = QueryStats {
            strategy: outcome.strategy,
            round_trips: outcome.round_trips,
            rows_read: outcome.rows_read,
            paginated_in_memory: outcome.paginated_in_memory,
        };
        debug!(
            roots = outcome.roots.len(),
            round_trips = stats.round_trips,
            rows_read = stats.rows_read,
            paginated_in_memory = stats.paginated_in_memory,
            "search complete"
        );

        Ok(ResultPage {
            items: outcome.roots,
            stats,
        })
    }

    /// Read flat rows shaped by a projection in one query.
    #[instrument(skip_all, fields(root = %spec.root(), columns = shape.columns.len()))]
    pub fn search_projection(
        &self,
        spec: &SearchSpec,
        criteria: &SearchCriteria,
        shape: &ProjectionShape,
        page: &PageRequest,
    ) -> Result<ResultPage<ProjectionRow>, Error> {
        if shape.root != spec.root() {
            return Err(Error::InvalidProjection(format!(
                "shape root '{}' does not match search root '{}'",
                shape.root,
                spec.root()
            )));
        }

        let predicates = spec.builder.build(criteria)?;
        let query = ProjectionPlanner::new(&self.catalog).plan(
            shape,
            &predicates,
            page,
            self.config.default_row_cap,
        )?;

        let rows = match self.storage.execute(&query)? {
            RowSet::Projection(rows) => rows,
            RowSet::Entities(_) => {
                return Err(StorageError::Decode(
                    "expected projection rows, got entity rows".into(),
                )
                .into())
            }
        };
        debug!(rows = rows.len(), "projection complete");

        let stats = QueryStats {
            strategy: FetchStrategy::Projection,
            round_trips: 1,
            rows_read: rows.len(),
            paginated_in_memory: false,
        };
        Ok(ResultPage { items: rows, stats })
    }

    /// Read a projection and map each row to a typed value.
    pub fn search_projection_as<T: FromProjection>(
        &self,
        spec: &SearchSpec,
        criteria: &SearchCriteria,
        shape: &ProjectionShape,
        page: &PageRequest,
    ) -> Result<ResultPage<T>, Error> {
        let page = self.search_projection(spec, criteria, shape, page)?;
        let items = page
            .items
            .iter()
            .map(T::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResultPage {
            items,
            stats: page.stats,
        })
    }

    /// Plan a search without running it.
    pub fn explain(
        &self,
        spec: &SearchSpec,
        criteria: &SearchCriteria,
        plan: &FetchPlan,
        page: &PageRequest,
    ) -> Result<Explain, Error> {
        let predicates = spec.builder.build(criteria)?;
        let fetch = FetchPlanner::new(&self.catalog).plan(spec.root(), plan, page)?;
        let primary = FetchExecutor::new(&self.catalog, &self.storage, &self.config)
            .primary_query(spec.root(), &predicates, &fetch, page)?;

        Ok(Explain {
            strategy: fetch.strategy(),
            paginated_in_memory: fetch.paginated_in_memory,
            primary,
            batched_rounds: fetch
                .batched_rounds()
                .into_iter()
                .map(|i| i.path.clone())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, FieldType, RelationDef, ScalarType, SchemaBundle};
    use crate::query::CriterionDef;
    use crate::storage::{MemoryStore, TableWriter};
    use graphfetch_proto::Value;

    fn engine() -> QueryEngine<MemoryStore> {
        let member = EntityDef::new("Member", "id")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Int64)))
            .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)));
        let order = EntityDef::new("Order", "id")
            .with_table("orders")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Int64)))
            .with_field(FieldDef::new("member_id", FieldType::scalar(ScalarType::Int64)));
        let catalog = Catalog::new(
            SchemaBundle::new()
                .with_entity(member)
                .with_entity(order)
                .with_relation(RelationDef::many_to_one(
                    "member", "Order", "member_id", "Member", "id",
                )),
        )
        .unwrap();

        let store = MemoryStore::new();
        store.create_tables(&catalog).unwrap();
        store
            .insert("member", &[("id", Value::Int64(1)), ("name", "kim".into())])
            .unwrap();
        for id in 1..=3i64 {
            store
                .insert("orders", &[("id", Value::Int64(id)), ("member_id", Value::Int64(1))])
                .unwrap();
        }
        QueryEngine::new(catalog, store)
    }

    fn spec(engine: &QueryEngine<MemoryStore>) -> SearchSpec {
        engine
            .bind(&CriteriaSchema::new("Order").with(CriterionDef::contains("memberName", "member.name")))
            .unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let engine = engine();
        let config = EngineConfig::default().with_row_cap(0);
        let result = QueryEngine::with_config(engine.catalog, engine.storage, config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_search_reports_stats() {
        let engine = engine();
        let spec = spec(&engine);
        let page = engine
            .search(
                &mut Session::new(),
                &spec,
                &SearchCriteria::new(),
                &FetchPlan::default().include("member"),
                &PageRequest::limit(2),
            )
            .unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page.stats.strategy, FetchStrategy::Join);
        assert_eq!(page.stats.round_trips, 1);
        assert_eq!(page.stats.rows_read, 2);
        assert!(!page.stats.paginated_in_memory);
        assert_eq!(page.items[0].one("member").unwrap().get("name"), Some(&Value::String("kim".into())));
    }

    #[test]
    fn test_explain_does_not_execute() {
        let engine = engine();
        let spec = spec(&engine);
        let explain = engine
            .explain(
                &spec,
                &SearchCriteria::new().with("memberName", "ki"),
                &FetchPlan::default().include("member"),
                &PageRequest::limit(10),
            )
            .unwrap();

        assert_eq!(explain.strategy, FetchStrategy::Join);
        assert!(explain.batched_rounds.is_empty());
        assert!(explain.to_string().starts_with("strategy: join\nprimary: SELECT"));
        assert_eq!(engine.storage().round_trips(), 0);
    }

    #[test]
    fn test_projection_root_must_match() {
        let engine = engine();
        let spec = spec(&engine);
        let shape = ProjectionShape::new("Member").column("name", "name");
        let result = engine.search_projection(&spec, &SearchCriteria::new(), &shape, &PageRequest::unpaged());
        assert!(matches!(result, Err(Error::InvalidProjection(_))));
    }
}
