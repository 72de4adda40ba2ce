//! Benchmark harness helpers.

use graphfetch_core::proto::{FetchPlan, PageRequest, ProjectionShape, SearchCriteria};
use graphfetch_core::query::{CriteriaSchema, CriterionDef};
use graphfetch_core::{
    Catalog, EngineConfig, EntityNode, MemoryStore, QueryEngine, ResultPage, SearchSpec,
    Session, SqliteExecutor, StorageExecutor, TableWriter,
};

use crate::fixtures::{populate, shop_schema, Population, Scale};

/// A loaded shop behind one executor.
pub struct BenchContext<S: StorageExecutor> {
    pub engine: QueryEngine<S>,
    pub spec: SearchSpec,
    pub population: Population,
}

fn order_criteria() -> CriteriaSchema {
    CriteriaSchema::new("Order")
        .with(CriterionDef::exact("status", "status"))
        .with(CriterionDef::contains("memberName", "member.name"))
        .with(CriterionDef::exact("deliveryStatus", "delivery.status"))
}

fn build<S: StorageExecutor + TableWriter>(storage: S, scale: Scale) -> BenchContext<S> {
    let catalog = Catalog::new(shop_schema()).unwrap();
    storage.create_tables(&catalog).unwrap();
    let population = populate(&storage, scale);
    tracing::info!(
        ?scale,
        orders = population.orders,
        lines = population.lines,
        "loaded bench shop"
    );

    let engine = QueryEngine::with_config(catalog, storage, EngineConfig::default()).unwrap();
    let spec = engine.bind(&order_criteria()).unwrap();
    BenchContext {
        engine,
        spec,
        population,
    }
}

impl BenchContext<MemoryStore> {
    /// Shop in an in-memory store.
    pub fn memory(scale: Scale) -> Self {
        build(MemoryStore::new(), scale)
    }
}

impl BenchContext<SqliteExecutor> {
    /// Shop in an in-memory SQLite database.
    pub fn sqlite(scale: Scale) -> Self {
        build(SqliteExecutor::open_in_memory().unwrap(), scale)
    }
}

impl<S: StorageExecutor> BenchContext<S> {
    /// Search orders with a fresh session.
    pub fn search(
        &self,
        criteria: &SearchCriteria,
        plan: &FetchPlan,
        page: &PageRequest,
    ) -> ResultPage<EntityNode> {
        self.engine
            .search(&mut Session::new(), &self.spec, criteria, plan, page)
            .unwrap()
    }

    /// Read an order summary projection.
    pub fn summaries(&self, criteria: &SearchCriteria, page: &PageRequest) -> usize {
        let shape = ProjectionShape::new("Order")
            .column("orderId", "id")
            .column("memberName", "member.name")
            .column("orderDate", "order_date")
            .column("deliveryCity", "delivery.city")
            .left_join("delivery");
        self.engine
            .search_projection(&self.spec, criteria, &shape, page)
            .unwrap()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphfetch_core::proto::StrategyHint;

    #[test]
    fn test_strategies_agree_on_generated_data() {
        let ctx = BenchContext::memory(Scale::Tiny);
        let plan = FetchPlan::default()
            .include("member")
            .include("orderItems")
            .include("orderItems.item");
        let page = PageRequest::limit(10);

        let batched = ctx.search(&SearchCriteria::new(), &plan, &page);
        let lazy = ctx.search(
            &SearchCriteria::new(),
            &plan.clone().with_strategy(StrategyHint::Lazy),
            &page,
        );
        let folded = ctx.search(
            &SearchCriteria::new(),
            &plan.allow_in_memory_pagination(),
            &page,
        );

        assert_eq!(batched.len(), 10);
        assert_eq!(batched.items, lazy.items);
        assert_eq!(batched.items, folded.items);
        assert!(lazy.stats.round_trips > batched.stats.round_trips);
        assert_eq!(folded.stats.round_trips, 1);
    }

    #[test]
    fn test_projection_returns_every_order() {
        let ctx = BenchContext::sqlite(Scale::Tiny);
        let rows = ctx.summaries(&SearchCriteria::new(), &PageRequest::unpaged());
        assert_eq!(rows, ctx.population.orders);
    }
}
