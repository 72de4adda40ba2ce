//! Test data generation for benchmarks.
//!
//! Generators are seeded so every run loads the same shop.

use graphfetch_core::catalog::{
    EntityDef, FieldDef, FieldType, RelationDef, ScalarType, SchemaBundle,
};
use graphfetch_core::proto::Value;
use graphfetch_core::TableWriter;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Scale factor for benchmark data generation.
#[derive(Clone, Copy, Debug, Default)]
pub enum Scale {
    /// 10 members, 30 orders.
    Tiny,
    /// 100 members, 500 orders.
    #[default]
    Small,
    /// 1,000 members, 5,000 orders.
    Medium,
    /// 10,000 members, 50,000 orders.
    Large,
}

impl Scale {
    /// Number of members.
    pub fn members(&self) -> usize {
        match self {
            Scale::Tiny => 10,
            Scale::Small => 100,
            Scale::Medium => 1_000,
            Scale::Large => 10_000,
        }
    }

    /// Orders placed per member.
    pub fn orders_per_member(&self) -> usize {
        match self {
            Scale::Tiny => 3,
            _ => 5,
        }
    }

    /// Number of distinct catalog items.
    pub fn items(&self) -> usize {
        match self {
            Scale::Tiny => 5,
            Scale::Small => 50,
            Scale::Medium | Scale::Large => 500,
        }
    }

    /// Upper bound on lines per order (at least one).
    pub fn max_lines_per_order(&self) -> usize {
        4
    }
}

pub const ORDER_STATUSES: [&str; 3] = ["ORDER", "CANCEL", "SHIPPED"];

const CITIES: [&str; 5] = ["Seoul", "Busan", "Incheon", "Daegu", "Jeju"];

/// Shop schema: members place orders with a delivery, order lines point at
/// catalog items, and orders carry payments.
pub fn shop_schema() -> SchemaBundle {
    let int = |name: &str| FieldDef::new(name, FieldType::scalar(ScalarType::Int64));
    let text = |name: &str| FieldDef::new(name, FieldType::scalar(ScalarType::String));

    SchemaBundle::new()
        .with_entity(
            EntityDef::new("Member", "id")
                .with_field(int("id"))
                .with_field(text("name"))
                .with_field(FieldDef::optional_scalar("city", ScalarType::String)),
        )
        .with_entity(
            EntityDef::new("Delivery", "id")
                .with_field(int("id"))
                .with_field(text("city"))
                .with_field(FieldDef::new(
                    "status",
                    FieldType::enum_type("DeliveryStatus", &["READY", "COMP"]),
                )),
        )
        .with_entity(
            EntityDef::new("Order", "id")
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
                    FieldType::enum_type("OrderStatus", &ORDER_STATUSES),
                )),
        )
        .with_entity(
            EntityDef::new("Item", "id")
                .with_field(int("id"))
                .with_field(text("name"))
                .with_field(FieldDef::new("price", FieldType::scalar(ScalarType::Int32))),
        )
        .with_entity(
            EntityDef::new("OrderItem", "id")
                .with_table("order_item")
                .with_field(int("id"))
                .with_field(int("order_id"))
                .with_field(int("item_id"))
                .with_field(FieldDef::new("count", FieldType::scalar(ScalarType::Int32))),
        )
        .with_entity(
            EntityDef::new("Payment", "id")
                .with_field(int("id"))
                .with_field(int("order_id"))
                .with_field(FieldDef::new("amount", FieldType::scalar(ScalarType::Float64))),
        )
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
        ))
}

/// Row counts written by [`populate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Population {
    pub members: usize,
    pub orders: usize,
    pub lines: usize,
    pub payments: usize,
}

/// Generate a random string of specified length.
fn random_string(rng: &mut StdRng, len: usize) -> String {
    (0..len).map(|_| rng.sample(Alphanumeric) as char).collect()
}

/// Write a seeded shop of the given scale. Tables must already exist.
pub fn populate<W: TableWriter>(writer: &W, scale: Scale) -> Population {
    const SEED: u64 = 12345;
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut population = Population::default();

    for id in 1..=scale.members() as i64 {
        let mut row = vec![
            ("id", Value::Int64(id)),
            ("name", format!("member_{}_{}", id, random_string(&mut rng, 6)).into()),
        ];
        // Every tenth member has no city
        if id % 10 != 0 {
            row.push(("city", CITIES[rng.gen_range(0..CITIES.len())].into()));
        }
        writer.insert("member", &row).unwrap();
        population.members += 1;
    }

    for id in 1..=scale.items() as i64 {
        writer
            .insert(
                "item",
                &[
                    ("id", Value::Int64(id)),
                    ("name", format!("item_{}", random_string(&mut rng, 8)).into()),
                    ("price", Value::Int32(rng.gen_range(1..100) * 1_000)),
                ],
            )
            .unwrap();
    }

    let order_count = scale.members() * scale.orders_per_member();
    let mut line_id = 0i64;
    let mut payment_id = 0i64;
    for id in 1..=order_count as i64 {
        // Every fifth order has not been handed to a courier yet
        let delivery = if id % 5 == 0 {
            Value::Null
        } else {
            let status = if rng.gen_bool(0.5) { "READY" } else { "COMP" };
            writer
                .insert(
                    "delivery",
                    &[
                        ("id", Value::Int64(id)),
                        ("city", CITIES[rng.gen_range(0..CITIES.len())].into()),
                        ("status", status.into()),
                    ],
                )
                .unwrap();
            Value::Int64(id)
        };

        writer
            .insert(
                "orders",
                &[
                    ("id", Value::Int64(id)),
                    ("member_id", Value::Int64(rng.gen_range(1..=scale.members() as i64))),
                    ("delivery_id", delivery),
                    ("order_date", Value::Timestamp(1_700_000_000_000_000 + id * 60_000_000)),
                    ("status", ORDER_STATUSES[rng.gen_range(0..ORDER_STATUSES.len())].into()),
                ],
            )
            .unwrap();
        population.orders += 1;

        for _ in 0..rng.gen_range(1..=scale.max_lines_per_order()) {
            line_id += 1;
            writer
                .insert(
                    "order_item",
                    &[
                        ("id", Value::Int64(line_id)),
                        ("order_id", Value::Int64(id)),
                        ("item_id", Value::Int64(rng.gen_range(1..=scale.items() as i64))),
                        ("count", Value::Int32(rng.gen_range(1..10))),
                    ],
                )
                .unwrap();
            population.lines += 1;
        }

        for _ in 0..rng.gen_range(0..=2) {
            payment_id += 1;
            writer
                .insert(
                    "payment",
                    &[
                        ("id", Value::Int64(payment_id)),
                        ("order_id", Value::Int64(id)),
                        ("amount", Value::Float64(rng.gen_range(1.0..500.0))),
                    ],
                )
                .unwrap();
            population.payments += 1;
        }
    }

    population
}
