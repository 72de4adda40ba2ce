//! Executable query descriptions.
//!
//! A [`QueryDescription`] is everything a storage executor needs to run one
//! read: the root table, the join tree, AND-composed predicates, the selected
//! columns, ordering and the row window. Table and column names are already
//! resolved, so executors never consult the catalog.

use std::fmt;

use graphfetch_proto::{OrderDirection, Value};

use crate::catalog::{EntityDef, ScalarType};

/// A column with its storage type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    /// Column name.
    pub name: String,
    /// Storage type used to decode values.
    pub scalar: ScalarType,
}

/// Column list of an entity in catalog order.
pub(crate) fn entity_columns(entity: &EntityDef) -> Vec<ColumnRef> {
    entity
        .fields
        .iter()
        .map(|f| ColumnRef {
            name: f.name.clone(),
            scalar: f.storage_type(),
        })
        .collect()
}

/// The root table of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSelect {
    /// Entity name.
    pub entity: String,
    /// Table name.
    pub table: String,
    /// Identity column.
    pub identity: String,
    /// Columns returned for entity selections.
    pub columns: Vec<ColumnRef>,
}

impl TableSelect {
    /// Select every column of an entity.
    pub fn entity(entity: &EntityDef) -> Self {
        Self {
            entity: entity.name.clone(),
            table: entity.table.clone(),
            identity: entity.identity_field.clone(),
            columns: entity_columns(entity),
        }
    }
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Drop rows without a match.
    Inner,
    /// Keep rows without a match; joined columns are null.
    Left,
}

/// One joined table.
///
/// `alias` is the association path the join materializes (`"member"`,
/// `"orderItems.item"`); `parent` is the alias it hangs off, `None` for the
/// query root.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    /// Association path used as the alias.
    pub alias: String,
    /// Parent alias, `None` for the root.
    pub parent: Option<String>,
    /// Entity name.
    pub entity: String,
    /// Table name.
    pub table: String,
    /// Identity column of the joined table.
    pub identity: String,
    /// Column on the parent side.
    pub local_field: String,
    /// Column on the joined side.
    pub remote_field: String,
    /// Join type.
    pub kind: JoinKind,
    /// Whether joined columns are returned.
    pub fetched: bool,
    /// Columns returned when fetched.
    pub columns: Vec<ColumnRef>,
}

/// Comparison applied by a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateOp {
    /// Column equals the value.
    Eq(Value),
    /// Column contains the substring (case-sensitive, no wildcards).
    Contains(String),
    /// Column starts with the prefix (case-sensitive, no wildcards).
    StartsWith(String),
    /// Column equals one of the values.
    In(Vec<Value>),
}

/// One predicate term, tagged with what it constrains.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Criterion name or association path that produced the term.
    pub label: String,
    /// Join alias owning the column, `None` for the root.
    pub alias: Option<String>,
    /// Column name.
    pub column: String,
    /// Comparison.
    pub op: PredicateOp,
}

/// One ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// Join alias owning the column, `None` for the root.
    pub alias: Option<String>,
    /// Column name.
    pub column: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

/// One output column of a flat selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    /// Output name.
    pub output: String,
    /// Join alias owning the column, `None` for the root.
    pub alias: Option<String>,
    /// Source column.
    pub column: ColumnRef,
}

/// What a query returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Root columns plus the columns of every fetched join.
    Entities,
    /// A flat list of columns.
    Columns(Vec<SelectColumn>),
}

/// An executable read.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescription {
    /// Root table.
    pub root: TableSelect,
    /// Joins, parents before children.
    pub joins: Vec<JoinSpec>,
    /// Predicates combined with AND.
    pub predicates: Vec<Predicate>,
    /// Returned columns.
    pub selection: Selection,
    /// Ordering keys.
    pub order_by: Vec<SortKey>,
    /// Maximum rows returned.
    pub limit: Option<usize>,
    /// Rows skipped.
    pub offset: usize,
}

impl QueryDescription {
    /// Create an unfiltered entity query over a root table.
    pub fn new(root: TableSelect) -> Self {
        Self {
            root,
            joins: Vec::new(),
            predicates: Vec::new(),
            selection: Selection::Entities,
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Add a join, merging with an existing join on the same alias.
    ///
    /// When merged, an inner join wins over a left join and the join is
    /// fetched if either side fetches it.
    pub fn add_join(&mut self, join: JoinSpec) {
        match self.joins.iter_mut().find(|j| j.alias == join.alias) {
            Some(existing) => {
                if join.kind == JoinKind::Inner {
                    existing.kind = JoinKind::Inner;
                }
                if join.fetched && !existing.fetched {
                    existing.fetched = true;
                    existing.columns = join.columns;
                }
            }
            None => self.joins.push(join),
        }
    }

    /// Get a join by alias.
    pub fn join(&self, alias: &str) -> Option<&JoinSpec> {
        self.joins.iter().find(|j| j.alias == alias)
    }

    /// Joins whose columns are returned.
    pub fn fetched_joins(&self) -> impl Iterator<Item = &JoinSpec> {
        self.joins.iter().filter(|j| j.fetched)
    }
}

fn qualify(alias: &Option<String>, column: &str) -> String {
    match alias {
        Some(alias) => format!("{}.{}", alias, column),
        None => column.to_string(),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int32(i) => i.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float64(f) => f.to_string(),
        Value::String(s) => format!("'{}'", s),
        Value::Timestamp(t) => format!("@{}", t),
    }
}

impl fmt::Display for QueryDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        match &self.selection {
            Selection::Entities => {
                let mut parts = vec![format!("{}.*", self.root.entity)];
                parts.extend(self.fetched_joins().map(|j| format!("{}.*", j.alias)));
                write!(f, "{}", parts.join(", "))?;
            }
            Selection::Columns(columns) => {
                let parts: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{} AS {}", qualify(&c.alias, &c.column.name), c.output))
                    .collect();
                write!(f, "{}", parts.join(", "))?;
            }
        }
        write!(f, " FROM {}", self.root.table)?;

        for join in &self.joins {
            let kind = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            write!(
                f,
                " {} {} {} ON {} = {}.{}",
                kind,
                join.table,
                join.alias,
                qualify(&join.parent, &join.local_field),
                join.alias,
                join.remote_field
            )?;
        }

        if !self.predicates.is_empty() {
            let terms: Vec<String> = self
                .predicates
                .iter()
                .map(|p| {
                    let column = qualify(&p.alias, &p.column);
                    match &p.op {
                        PredicateOp::Eq(v) => format!("{} = {}", column, render_value(v)),
                        PredicateOp::Contains(s) => format!("{} CONTAINS '{}'", column, s),
                        PredicateOp::StartsWith(s) => format!("{} STARTS WITH '{}'", column, s),
                        PredicateOp::In(values) => format!("{} IN ({} keys)", column, values.len()),
                    }
                })
                .collect();
            write!(f, " WHERE {}", terms.join(" AND "))?;
        }

        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|k| {
                    let dir = match k.direction {
                        OrderDirection::Asc => "ASC",
                        OrderDirection::Desc => "DESC",
                    };
                    format!("{} {}", qualify(&k.alias, &k.column), dir)
                })
                .collect();
            write!(f, " ORDER BY {}", keys.join(", "))?;
        }

        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if self.offset > 0 {
            write!(f, " OFFSET {}", self.offset)?;
        }
        Ok(())
    }
}
