//! Shared shop fixture for integration tests.
//!
//! Five orders over three members, four deliveries (order 5 has none), four
//! items, nine order lines and four payments. Order lines are inserted out of
//! identity order.

#![allow(dead_code)]

use graphfetch_core::catalog::{
    Catalog, EntityDef, FieldDef, FieldType, RelationDef, ScalarType, SchemaBundle,
};
use graphfetch_core::proto::Value;
use graphfetch_core::query::{CriteriaSchema, CriterionDef};
use graphfetch_core::{
    EngineConfig, MemoryStore, QueryEngine, SearchSpec, SqliteExecutor, StorageExecutor,
    TableWriter,
};

fn int(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::scalar(ScalarType::Int64))
}

fn text(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::scalar(ScalarType::String))
}

pub fn shop_catalog() -> Catalog {
    let member = EntityDef::new("Member", "id")
        .with_field(int("id"))
        .with_field(text("name"))
        .with_field(FieldDef::optional_scalar("city", ScalarType::String));

    let delivery = EntityDef::new("Delivery", "id")
        .with_field(int("id"))
        .with_field(text("city"))
        .with_field(FieldDef::new(
            "status",
            FieldType::enum_type("DeliveryStatus", &["READY", "COMP"]),
        ));

    let order = EntityDef::new("Order", "id")
        .with_table("orders")
        .with_field(int("id"))
        .with_field(int("member_id"))
        .with_field(FieldDef::optional_scalar("delivery_id", ScalarType::Int64))
        .with_field(FieldDef::new(
            "order_date",
            FieldType::scalar(ScalarType::Timestamp),
        ))
        .with_field(FieldDef::new(
            "status",
            FieldType::enum_type("OrderStatus", &["ORDER", "CANCEL", "SHIPPED"]),
        ));

    let item = EntityDef::new("Item", "id")
        .with_field(int("id"))
        .with_field(text("name"))
        .with_field(FieldDef::new("price", FieldType::scalar(ScalarType::Int32)));

    let order_item = EntityDef::new("OrderItem", "id")
        .with_table("order_item")
        .with_field(int("id"))
        .with_field(int("order_id"))
        .with_field(int("item_id"))
        .with_field(FieldDef::new("count", FieldType::scalar(ScalarType::Int32)));

    let payment = EntityDef::new("Payment", "id")
        .with_field(int("id"))
        .with_field(int("order_id"))
        .with_field(FieldDef::new("amount", FieldType::scalar(ScalarType::Float64)));

    Catalog::new(
        SchemaBundle::new()
            .with_entity(member)
            .with_entity(delivery)
            .with_entity(order)
            .with_entity(item)
            .with_entity(order_item)
            .with_entity(payment)
            .with_relation(RelationDef::many_to_one(
                "member", "Order", "member_id", "Member", "id",
            ))
            .with_relation(RelationDef::one_to_one(
                "delivery", "Order", "delivery_id", "Delivery", "id",
            ))
            .with_relation(RelationDef::one_to_many(
                "orderItems", "Order", "id", "OrderItem", "order_id",
            ))
            .with_relation(RelationDef::one_to_many(
                "payments", "Order", "id", "Payment", "order_id",
            ))
            .with_relation(RelationDef::many_to_one(
                "item", "OrderItem", "item_id", "Item", "id",
            ))
            .with_relation(RelationDef::one_to_many(
                "orders", "Member", "id", "Order", "member_id",
            )),
    )
    .unwrap()
}

/// Criteria over orders used by most tests.
pub fn order_criteria() -> CriteriaSchema {
    CriteriaSchema::new("Order")
        .with(CriterionDef::exact("status", "status"))
        .with(CriterionDef::contains("memberName", "member.name"))
        .with(CriterionDef::prefix("memberPrefix", "member.name"))
        .with(CriterionDef::exact("deliveryStatus", "delivery.status"))
}

pub fn load_shop<W: TableWriter>(writer: &W, catalog: &Catalog) {
    writer.create_tables(catalog).unwrap();

    let members = [(1i64, "userA", Some("Seoul")), (2, "userB", Some("Busan")), (3, "kim", None)];
    for (id, name, city) in members {
        let mut row = vec![("id", Value::Int64(id)), ("name", name.into())];
        if let Some(city) = city {
            row.push(("city", city.into()));
        }
        writer.insert("member", &row).unwrap();
    }

    for (id, city, status) in [
        (1i64, "Seoul", "COMP"),
        (2, "Busan", "COMP"),
        (3, "Seoul", "READY"),
        (4, "Jeju", "READY"),
    ] {
        writer
            .insert(
                "delivery",
                &[("id", Value::Int64(id)), ("city", city.into()), ("status", status.into())],
            )
            .unwrap();
    }

    let orders = [
        (1i64, 1i64, Some(1i64), "ORDER"),
        (2, 2, Some(2), "SHIPPED"),
        (3, 1, Some(3), "CANCEL"),
        (4, 3, Some(4), "SHIPPED"),
        (5, 2, None, "ORDER"),
    ];
    for (id, member, delivery, status) in orders {
        let delivery = delivery.map(Value::Int64).unwrap_or(Value::Null);
        writer
            .insert(
                "orders",
                &[
                    ("id", Value::Int64(id)),
                    ("member_id", Value::Int64(member)),
                    ("delivery_id", delivery),
                    ("order_date", Value::Timestamp(id * 1_000)),
                    ("status", status.into()),
                ],
            )
            .unwrap();
    }

    for (id, name, price) in [
        (1i64, "JPA1 BOOK", 10_000i32),
        (2, "JPA2 BOOK", 20_000),
        (3, "SPRING1 BOOK", 20_000),
        (4, "SPRING2 BOOK", 40_000),
    ] {
        writer
            .insert(
                "item",
                &[("id", Value::Int64(id)), ("name", name.into()), ("price", Value::Int32(price))],
            )
            .unwrap();
    }

    let lines = [
        (2i64, 1i64, 2i64, 2i32),
        (1, 1, 1, 1),
        (4, 2, 4, 1),
        (3, 2, 3, 3),
        (5, 3, 1, 1),
        (8, 4, 4, 2),
        (6, 4, 2, 1),
        (7, 4, 3, 5),
        (9, 5, 1, 4),
    ];
    for (id, order, item, count) in lines {
        writer
            .insert(
                "order_item",
                &[
                    ("id", Value::Int64(id)),
                    ("order_id", Value::Int64(order)),
                    ("item_id", Value::Int64(item)),
                    ("count", Value::Int32(count)),
                ],
            )
            .unwrap();
    }

    for (id, order, amount) in [(3i64, 4i64, 70.0f64), (1, 2, 100.0), (2, 4, 50.0), (4, 1, 10.0)] {
        writer
            .insert(
                "payment",
                &[
                    ("id", Value::Int64(id)),
                    ("order_id", Value::Int64(order)),
                    ("amount", Value::Float64(amount)),
                ],
            )
            .unwrap();
    }
}

pub fn memory_engine(config: EngineConfig) -> QueryEngine<MemoryStore> {
    let catalog = shop_catalog();
    let store = MemoryStore::new();
    load_shop(&store, &catalog);
    QueryEngine::with_config(catalog, store, config).unwrap()
}

pub fn sqlite_engine(config: EngineConfig) -> QueryEngine<SqliteExecutor> {
    let catalog = shop_catalog();
    let executor = SqliteExecutor::open_in_memory().unwrap();
    load_shop(&executor, &catalog);
    QueryEngine::with_config(catalog, executor, config).unwrap()
}

pub fn order_spec<S: StorageExecutor>(engine: &QueryEngine<S>) -> SearchSpec {
    engine.bind(&order_criteria()).unwrap()
}

/// Run a generic test body against both executors.
macro_rules! on_both_backends {
    ($($name:ident => $body:path;)*) => {
        mod memory {
            use super::*;
            $(
                #[test]
                fn $name() {
                    $body(&crate::common::memory_engine(graphfetch_core::EngineConfig::default()));
                }
            )*
        }

        mod sqlite {
            use super::*;
            $(
                #[test]
                fn $name() {
                    $body(&crate::common::sqlite_engine(graphfetch_core::EngineConfig::default()));
                }
            )*
        }
    };
}
