//! Projection planning: a flat column shape compiled to one join query.

use std::collections::HashSet;

use graphfetch_proto::{PageRequest, ProjectionShape};

use crate::catalog::Catalog;
use crate::error::Error;

use super::assembler::QueryAssembler;
use super::description::{ColumnRef, JoinKind, Predicate, QueryDescription, SelectColumn, Selection};

/// Compiles projection shapes against a catalog.
pub struct ProjectionPlanner<'a> {
    catalog: &'a Catalog,
}

impl<'a> ProjectionPlanner<'a> {
    /// Create a planner over a catalog.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Compile a shape, predicates and page into one flat query.
    ///
    /// Every association a column path crosses must be to-one. Crossed
    /// associations are inner-joined unless the path, or one of its
    /// ancestors, is listed in the shape's left joins.
    pub fn plan(
        &self,
        shape: &ProjectionShape,
        predicates: &[Predicate],
        page: &PageRequest,
        row_cap: usize,
    ) -> Result<QueryDescription, Error> {
        if shape.columns.is_empty() {
            return Err(Error::InvalidProjection("shape has no columns".into()));
        }
        for path in &shape.left_joins {
            let hops = self.catalog.resolve_relation_path(&shape.root, path)?;
            if hops.iter().any(|r| r.is_to_many()) {
                return Err(Error::InvalidProjection(format!(
                    "left join '{}' crosses a collection",
                    path
                )));
            }
        }

        let assembler = QueryAssembler::new(self.catalog);
        let mut query = assembler.assemble(&shape.root, predicates, page, row_cap)?;
        let mut aliases = HashSet::new();
        let mut columns = Vec::with_capacity(shape.columns.len());

        for column in &shape.columns {
            if !aliases.insert(column.alias.as_str()) {
                return Err(Error::InvalidProjection(format!(
                    "duplicate column alias '{}'",
                    column.alias
                )));
            }

            let (hops, field) = self.catalog.resolve_field_path(&shape.root, &column.path)?;
            if let Some(relation) = hops.iter().find(|r| r.is_to_many()) {
                return Err(Error::InvalidProjection(format!(
                    "column '{}' crosses collection '{}'",
                    column.alias, relation.name
                )));
            }

            let mut prefix = String::new();
            for relation in &hops {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(&relation.name);
                let kind = if self.is_left_joined(shape, &prefix) {
                    JoinKind::Left
                } else {
                    JoinKind::Inner
                };
                assembler.join_path(&mut query, &shape.root, "", &prefix, kind, false)?;
            }

            columns.push(SelectColumn {
                output: column.alias.clone(),
                alias: if hops.is_empty() { None } else { Some(prefix) },
                column: ColumnRef {
                    name: field.name.clone(),
                    scalar: field.storage_type(),
                },
            });
        }

        query.selection = Selection::Columns(columns);
        Ok(query)
    }

    fn is_left_joined(&self, shape: &ProjectionShape, path: &str) -> bool {
        shape.left_joins.iter().any(|left| {
            path == left
                || path
                    .strip_prefix(left.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, FieldType, RelationDef, ScalarType, SchemaBundle};

    fn catalog() -> Catalog {
        let member = EntityDef::new("Member", "id")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Int64)))
            .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)))
            .with_field(FieldDef::optional_scalar("team_id", ScalarType::Int64));
        let team = EntityDef::new("Team", "id")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Int64)))
            .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)));
        let order = EntityDef::new("Order", "id")
            .with_table("orders")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Int64)))
            .with_field(FieldDef::new("member_id", FieldType::scalar(ScalarType::Int64)));

        Catalog::new(
            SchemaBundle::new()
                .with_entity(member)
                .with_entity(team)
                .with_entity(order)
                .with_relation(RelationDef::many_to_one(
                    "member", "Order", "member_id", "Member", "id",
                ))
                .with_relation(RelationDef::many_to_one(
                    "team", "Member", "team_id", "Team", "id",
                ))
                .with_relation(RelationDef::one_to_many(
                    "orders", "Member", "id", "Order", "member_id",
                )),
        )
        .unwrap()
    }

    fn plan(shape: &ProjectionShape) -> Result<QueryDescription, Error> {
        let catalog = catalog();
        ProjectionPlanner::new(&catalog).plan(shape, &[], &PageRequest::unpaged(), 100)
    }

    #[test]
    fn test_columns_and_inner_joins() {
        let shape = ProjectionShape::new("Order")
            .column("orderId", "id")
            .column("memberName", "member.name")
            .column("teamName", "member.team.name");

        let query = plan(&shape).unwrap();
        assert_eq!(query.joins.len(), 2);
        assert!(query.joins.iter().all(|j| j.kind == JoinKind::Inner && !j.fetched));
        assert_eq!(query.join("member.team").unwrap().parent.as_deref(), Some("member"));
        assert_eq!(query.limit, Some(100));

        let Selection::Columns(columns) = &query.selection else {
            panic!("expected a column selection");
        };
        let outputs: Vec<&str> = columns.iter().map(|c| c.output.as_str()).collect();
        assert_eq!(outputs, vec!["orderId", "memberName", "teamName"]);
        assert_eq!(columns[2].alias.as_deref(), Some("member.team"));
    }

    #[test]
    fn test_left_join_covers_descendants() {
        let shape = ProjectionShape::new("Order")
            .column("teamName", "member.team.name")
            .left_join("member");

        let query = plan(&shape).unwrap();
        assert_eq!(query.join("member").unwrap().kind, JoinKind::Left);
        assert_eq!(query.join("member.team").unwrap().kind, JoinKind::Left);
    }

    #[test]
    fn test_collections_are_rejected() {
        let shape = ProjectionShape::new("Member").column("orderId", "orders.id");
        assert!(matches!(plan(&shape), Err(Error::InvalidProjection(_))));

        let shape = ProjectionShape::new("Member").column("id", "id").left_join("orders");
        assert!(matches!(plan(&shape), Err(Error::InvalidProjection(_))));
    }

    #[test]
    fn test_malformed_shapes() {
        assert!(matches!(
            plan(&ProjectionShape::new("Order")),
            Err(Error::InvalidProjection(_))
        ));

        let shape = ProjectionShape::new("Order").column("a", "id").column("a", "member_id");
        assert!(matches!(plan(&shape), Err(Error::InvalidProjection(_))));

        let shape = ProjectionShape::new("Order").column("x", "member.nickname");
        assert!(matches!(plan(&shape), Err(Error::UnknownField { .. })));
    }
}
