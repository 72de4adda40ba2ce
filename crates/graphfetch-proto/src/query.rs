//! Request types: search criteria, fetch plans and page requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Sparse search criteria.
///
/// Every criterion is optional. A criterion that was never set, set to
/// [`Value::Null`], or set to a blank string places no constraint on the
/// search. Populated criteria are combined with logical AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    values: BTreeMap<String, Value>,
}

impl SearchCriteria {
    /// Criteria with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a criterion.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Set a criterion only when a value is present.
    pub fn with_opt<T: Into<Value>>(self, name: impl Into<String>, value: Option<T>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    /// Get the raw value of a criterion, blank or not.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Iterate over all set criteria (including blank ones) by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check whether no criterion carries a usable value.
    pub fn is_unconstrained(&self) -> bool {
        self.values.values().all(Value::is_blank)
    }
}

/// How deep a fetch plan materializes its includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FetchDepth {
    /// Materialize no associations.
    None,
    /// Materialize only top-level includes.
    OneLevel,
    /// Materialize every requested include.
    #[default]
    Full,
}

/// Caller preference for the association fetch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrategyHint {
    /// Let the planner pick by its selection rule.
    #[default]
    Auto,
    /// Force one load per touched association per row (the N+1 baseline).
    Lazy,
    /// Demand an eager join; illegal combinations fail instead of falling back.
    JoinFetch,
    /// Force batched secondary loads for to-many includes.
    Batched,
}

/// Whether storage-level pagination must be exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaginationMode {
    /// Offset and limit must be applied by storage.
    #[default]
    Exact,
    /// Offset and limit may be applied in memory after overfetching.
    InMemory,
}

/// Declaration of which associations to materialize and how.
///
/// Includes use dot-notation paths relative to the root entity:
/// - "member" - a top-level association
/// - "orderItems.item" - `item` of every `orderItems` member
///
/// A nested path requires its parent path to be included as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchPlan {
    /// Association paths to materialize.
    pub includes: Vec<String>,
    /// Depth filter applied to `includes`.
    pub depth: FetchDepth,
    /// Strategy preference.
    pub strategy: StrategyHint,
    /// Pagination acknowledgement.
    pub pagination: PaginationMode,
}

impl FetchPlan {
    /// A plan that materializes no associations.
    pub fn none() -> Self {
        Self {
            depth: FetchDepth::None,
            ..Self::default()
        }
    }

    /// Add an include path.
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.includes.push(path.into());
        self
    }

    /// Set the depth filter.
    pub fn with_depth(mut self, depth: FetchDepth) -> Self {
        self.depth = depth;
        self
    }

    /// Set the strategy preference.
    pub fn with_strategy(mut self, strategy: StrategyHint) -> Self {
        self.strategy = strategy;
        self
    }

    /// Accept pagination applied in memory after a to-many join.
    pub fn allow_in_memory_pagination(mut self) -> Self {
        self.pagination = PaginationMode::InMemory;
        self
    }

    /// Includes that survive the depth filter, in declaration order.
    pub fn effective_includes(&self) -> Vec<&str> {
        match self.depth {
            FetchDepth::None => vec![],
            FetchDepth::OneLevel => self
                .includes
                .iter()
                .map(String::as_str)
                .filter(|p| !p.contains('.'))
                .collect(),
            FetchDepth::Full => self.includes.iter().map(String::as_str).collect(),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Order specification on a root field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Field to order by.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Pagination parameters for one call.
///
/// Without an explicit limit the engine applies its configured row cap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Maximum number of results to return.
    pub limit: Option<u32>,
    /// Number of results to skip.
    pub offset: u32,
    /// Ordering of root results (identity ascending when empty).
    pub order_by: Vec<OrderSpec>,
}

impl PageRequest {
    /// No explicit pagination; only the row cap applies.
    pub fn unpaged() -> Self {
        Self::default()
    }

    /// Create pagination with offset and limit.
    pub fn new(offset: u32, limit: u32) -> Self {
        Self {
            limit: Some(limit),
            offset,
            order_by: vec![],
        }
    }

    /// Create pagination with just a limit.
    pub fn limit(limit: u32) -> Self {
        Self::new(0, limit)
    }

    /// Add ordering.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order_by.push(order);
        self
    }

    /// Check whether the caller asked for a specific window.
    pub fn is_paginated(&self) -> bool {
        self.limit.is_some() || self.offset > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_builder() {
        let criteria = SearchCriteria::new()
            .with("status", "SHIPPED")
            .with_opt("memberName", None::<String>);

        assert_eq!(criteria.get("status"), Some(&Value::String("SHIPPED".into())));
        assert!(criteria.get("memberName").is_none());
        assert!(!criteria.is_unconstrained());
    }

    #[test]
    fn test_blank_criteria_are_unconstrained() {
        let criteria = SearchCriteria::new()
            .with("memberName", "")
            .with("status", Value::Null);
        assert!(criteria.is_unconstrained());
        assert!(SearchCriteria::new().is_unconstrained());
    }

    #[test]
    fn test_effective_includes_by_depth() {
        let plan = FetchPlan::default()
            .include("member")
            .include("orderItems")
            .include("orderItems.item");

        assert_eq!(plan.effective_includes(), vec!["member", "orderItems", "orderItems.item"]);

        let one_level = plan.clone().with_depth(FetchDepth::OneLevel);
        assert_eq!(one_level.effective_includes(), vec!["member", "orderItems"]);

        let none = plan.with_depth(FetchDepth::None);
        assert!(none.effective_includes().is_empty());
        assert!(FetchPlan::none().include("member").effective_includes().is_empty());
    }

    #[test]
    fn test_page_request() {
        assert!(!PageRequest::unpaged().is_paginated());
        assert!(PageRequest::limit(10).is_paginated());
        assert!(PageRequest {
            offset: 5,
            ..PageRequest::default()
        }
        .is_paginated());
    }

    #[test]
    fn test_fetch_plan_from_json() {
        let plan: FetchPlan = serde_json::from_str(
            r#"{"includes":["member","delivery"],"depth":"Full","strategy":"JoinFetch","pagination":"Exact"}"#,
        )
        .unwrap();
        assert_eq!(plan.includes, vec!["member", "delivery"]);
        assert_eq!(plan.strategy, StrategyHint::JoinFetch);
    }
}
