//! Predicate builder: sparse search criteria to AND-composed predicate terms.
//!
//! Each root entity declares the criteria it accepts in a [`CriteriaSchema`].
//! Binding the schema against the catalog resolves every criterion path
//! once; building predicates from a [`SearchCriteria`] is then a pure
//! transformation that emits one term per populated criterion, in schema
//! declaration order.

use graphfetch_proto::{SearchCriteria, Value};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, FieldDef, FieldType, ScalarType};
use crate::error::Error;

use super::description::{Predicate, PredicateOp};

/// Partial-text matching mode.
///
/// Matching is case-sensitive and treats every character literally; `%`
/// and `_` match only themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextMatch {
    /// Value occurs anywhere in the column.
    #[default]
    Contains,
    /// Column starts with the value.
    Prefix,
}

/// Predicate kind a criterion maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriterionKind {
    /// Equality on the target field.
    Exact,
    /// Partial text match on a string field.
    Text(TextMatch),
}

/// One recognized criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDef {
    /// Name callers use in [`SearchCriteria`].
    pub name: String,
    /// Field path from the root, e.g. `"status"` or `"member.name"`.
    pub path: String,
    /// Predicate kind.
    pub kind: CriterionKind,
}

impl CriterionDef {
    /// Exact-match criterion.
    pub fn exact(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: CriterionKind::Exact,
        }
    }

    /// Substring criterion.
    pub fn contains(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: CriterionKind::Text(TextMatch::Contains),
        }
    }

    /// Prefix criterion.
    pub fn prefix(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: CriterionKind::Text(TextMatch::Prefix),
        }
    }
}

/// The criteria a root entity accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaSchema {
    /// Root entity name.
    pub root: String,
    /// Criteria in the order their terms are emitted.
    pub criteria: Vec<CriterionDef>,
}

impl CriteriaSchema {
    /// A schema with no criteria.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            criteria: Vec::new(),
        }
    }

    /// Add a criterion.
    pub fn with(mut self, criterion: CriterionDef) -> Self {
        self.criteria.push(criterion);
        self
    }
}

#[derive(Debug, Clone)]
struct BoundCriterion {
    def: CriterionDef,
    alias: Option<String>,
    field: FieldDef,
}

/// Criteria schema resolved against a catalog.
#[derive(Debug, Clone)]
pub struct PredicateBuilder {
    root: String,
    criteria: Vec<BoundCriterion>,
}

impl PredicateBuilder {
    /// Resolve every criterion path of a schema.
    ///
    /// Paths must end in a field and may only traverse to-one associations.
    /// Text criteria must target free-text string fields.
    pub fn bind(catalog: &Catalog, schema: &CriteriaSchema) -> Result<Self, Error> {
        catalog.entity(&schema.root)?;

        let mut criteria: Vec<BoundCriterion> = Vec::with_capacity(schema.criteria.len());
        for def in &schema.criteria {
            if criteria.iter().any(|c| c.def.name == def.name) {
                return Err(Error::criteria(&def.name, "declared twice"));
            }

            let (hops, field) = catalog.resolve_field_path(&schema.root, &def.path)?;
            if hops.iter().any(|r| r.is_to_many()) {
                return Err(Error::criteria(
                    &def.name,
                    format!("path '{}' traverses a to-many association", def.path),
                ));
            }
            if matches!(def.kind, CriterionKind::Text(_)) && !field.field_type.is_text() {
                return Err(Error::criteria(
                    &def.name,
                    format!("text match on non-string field '{}'", field.name),
                ));
            }

            let alias = def.path.rsplit_once('.').map(|(a, _)| a.to_string());
            criteria.push(BoundCriterion {
                def: def.clone(),
                alias,
                field: field.clone(),
            });
        }

        Ok(Self {
            root: schema.root.clone(),
            criteria,
        })
    }

    /// Root entity the criteria apply to.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Turn sparse criteria into predicate terms.
    ///
    /// Absent, null and blank values produce no term. Unknown criterion names
    /// and values that do not fit the target field are rejected.
    pub fn build(&self, criteria: &SearchCriteria) -> Result<Vec<Predicate>, Error> {
        for (name, _) in criteria.iter() {
            if !self.criteria.iter().any(|c| c.def.name == name) {
                return Err(Error::criteria(name, "unknown criterion"));
            }
        }

        let mut predicates = Vec::new();
        for bound in &self.criteria {
            let value = match criteria.get(&bound.def.name) {
                Some(value) if !value.is_blank() => value,
                _ => continue,
            };
            let op = match bound.def.kind {
                CriterionKind::Exact => PredicateOp::Eq(exact_value(bound, value)?),
                CriterionKind::Text(mode) => {
                    let text = value.as_str().ok_or_else(|| {
                        Error::criteria(
                            &bound.def.name,
                            format!("expected string, got {}", value.type_name()),
                        )
                    })?;
                    match mode {
                        TextMatch::Contains => PredicateOp::Contains(text.to_string()),
                        TextMatch::Prefix => PredicateOp::StartsWith(text.to_string()),
                    }
                }
            };
            predicates.push(Predicate {
                label: bound.def.name.clone(),
                alias: bound.alias.clone(),
                column: bound.field.name.clone(),
                op,
            });
        }
        Ok(predicates)
    }
}

/// Check an exact-match value against its field and normalize integer width.
fn exact_value(bound: &BoundCriterion, value: &Value) -> Result<Value, Error> {
    let name = &bound.def.name;
    if let FieldType::Enum { variants, .. } | FieldType::OptionalEnum { variants, .. } =
        &bound.field.field_type
    {
        let variant = value.as_str().ok_or_else(|| {
            Error::criteria(name, format!("expected enum variant, got {}", value.type_name()))
        })?;
        if !variants.iter().any(|v| v == variant) {
            return Err(Error::criteria(name, format!("unknown variant '{}'", variant)));
        }
        return Ok(value.clone());
    }

    let scalar = bound.field.storage_type();
    if !scalar.accepts(value) {
        return Err(Error::criteria(
            name,
            format!("expected {:?}, got {}", scalar, value.type_name()),
        ));
    }
    Ok(match (scalar, value) {
        (ScalarType::Int64, Value::Int32(i)) => Value::Int64(*i as i64),
        _ => value.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, RelationDef, SchemaBundle};

    fn catalog() -> Catalog {
        let member = EntityDef::new("Member", "id")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Int64)))
            .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)));
        let order = EntityDef::new("Order", "id")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Int64)))
            .with_field(FieldDef::new("member_id", FieldType::scalar(ScalarType::Int64)))
            .with_field(FieldDef::new(
                "status",
                FieldType::enum_type("OrderStatus", &["ORDER", "CANCEL"]),
            ));
        let item = EntityDef::new("OrderItem", "id")
            .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Int64)))
            .with_field(FieldDef::new("order_id", FieldType::scalar(ScalarType::Int64)));

        Catalog::new(
            SchemaBundle::new()
                .with_entity(member)
                .with_entity(order)
                .with_entity(item)
                .with_relation(RelationDef::many_to_one(
                    "member", "Order", "member_id", "Member", "id",
                ))
                .with_relation(RelationDef::one_to_many(
                    "orderItems", "Order", "id", "OrderItem", "order_id",
                )),
        )
        .unwrap()
    }

    fn order_criteria() -> CriteriaSchema {
        CriteriaSchema::new("Order")
            .with(CriterionDef::exact("status", "status"))
            .with(CriterionDef::contains("memberName", "member.name"))
            .with(CriterionDef::exact("memberId", "member_id"))
    }

    fn builder() -> PredicateBuilder {
        PredicateBuilder::bind(&catalog(), &order_criteria()).unwrap()
    }

    #[test]
    fn test_all_absent_yields_no_terms() {
        let terms = builder().build(&SearchCriteria::new()).unwrap();
        assert!(terms.is_empty());
    }

    #[test]
    fn test_blank_text_is_absent() {
        let criteria = SearchCriteria::new()
            .with("memberName", "")
            .with("status", Value::Null);
        assert!(builder().build(&criteria).unwrap().is_empty());

        let criteria = SearchCriteria::new().with("memberName", "   ");
        assert!(builder().build(&criteria).unwrap().is_empty());
    }

    #[test]
    fn test_terms_follow_schema_order() {
        let criteria = SearchCriteria::new()
            .with("memberName", "kim")
            .with("status", "ORDER");
        let terms = builder().build(&criteria).unwrap();

        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].label, "status");
        assert_eq!(terms[0].alias, None);
        assert_eq!(terms[0].op, PredicateOp::Eq(Value::String("ORDER".into())));
        assert_eq!(terms[1].label, "memberName");
        assert_eq!(terms[1].alias.as_deref(), Some("member"));
        assert_eq!(terms[1].column, "name");
        assert_eq!(terms[1].op, PredicateOp::Contains("kim".into()));
    }

    #[test]
    fn test_int32_widens_for_int64_fields() {
        let criteria = SearchCriteria::new().with("memberId", 3i32);
        let terms = builder().build(&criteria).unwrap();
        assert_eq!(terms[0].op, PredicateOp::Eq(Value::Int64(3)));
    }

    #[test]
    fn test_rejects_unknown_criterion() {
        let criteria = SearchCriteria::new().with("orderDate", "2024");
        assert!(matches!(
            builder().build(&criteria),
            Err(Error::InvalidCriteria { field, .. }) if field == "orderDate"
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        let criteria = SearchCriteria::new().with("status", "SHIPPING");
        assert!(matches!(
            builder().build(&criteria),
            Err(Error::InvalidCriteria { .. })
        ));

        let criteria = SearchCriteria::new().with("memberId", "three");
        assert!(matches!(
            builder().build(&criteria),
            Err(Error::InvalidCriteria { .. })
        ));

        let criteria = SearchCriteria::new().with("memberName", 7i32);
        assert!(matches!(
            builder().build(&criteria),
            Err(Error::InvalidCriteria { .. })
        ));
    }

    #[test]
    fn test_prefix_mode() {
        let schema = CriteriaSchema::new("Order").with(CriterionDef::prefix("name", "member.name"));
        let builder = PredicateBuilder::bind(&catalog(), &schema).unwrap();
        let terms = builder
            .build(&SearchCriteria::new().with("name", "us"))
            .unwrap();
        assert_eq!(terms[0].op, PredicateOp::StartsWith("us".into()));
    }

    #[test]
    fn test_bind_rejects_bad_paths() {
        let catalog = catalog();

        let through_many =
            CriteriaSchema::new("Order").with(CriterionDef::exact("itemId", "orderItems.id"));
        assert!(matches!(
            PredicateBuilder::bind(&catalog, &through_many),
            Err(Error::InvalidCriteria { .. })
        ));

        let text_on_enum =
            CriteriaSchema::new("Order").with(CriterionDef::contains("status", "status"));
        assert!(matches!(
            PredicateBuilder::bind(&catalog, &text_on_enum),
            Err(Error::InvalidCriteria { .. })
        ));

        let unknown = CriteriaSchema::new("Order").with(CriterionDef::exact("x", "member.email"));
        assert!(matches!(
            PredicateBuilder::bind(&catalog, &unknown),
            Err(Error::UnknownField { .. })
        ));
    }
}
