//! In-process storage executor.
//!
//! Tables are plain row vectors. Joins are nested loops over the join tree,
//! predicates are evaluated per joined tuple, and ordering follows SQLite's
//! rules (nulls sort first ascending) so results match [`SqliteExecutor`].
//!
//! [`SqliteExecutor`]: super::SqliteExecutor

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use graphfetch_proto::{OrderDirection, ProjectionRow, Value};
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::catalog::Catalog;
use crate::error::StorageError;
use crate::query::{JoinKind, PredicateOp, QueryDescription, Selection};

use super::{EntityRow, JoinedRow, RowSet, StorageExecutor, TableWriter};

#[derive(Debug, Default)]
struct MemTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl MemTable {
    fn column(&self, table: &str, name: &str) -> Result<usize, StorageError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| StorageError::UnknownColumn {
                table: table.to_string(),
                column: name.to_string(),
            })
    }
}

/// In-memory tables behind a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, MemTable>>,
    round_trips: AtomicUsize,
}

/// A table participating in a query, with its position in a tuple.
struct Source<'t> {
    name: &'t str,
    table: &'t MemTable,
}

/// One joined tuple: a row index per source, `None` for an unmatched left join.
type Tuple = Vec<Option<usize>>;

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queries executed so far.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(AtomicOrdering::Relaxed)
    }

    /// Number of rows stored in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map(|t| t.rows.len()).unwrap_or(0)
    }
}

impl TableWriter for MemoryStore {
    fn create_tables(&self, catalog: &Catalog) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        for entity in catalog.schema().entities.values() {
            tables.entry(entity.table.clone()).or_insert_with(|| MemTable {
                columns: entity.fields.iter().map(|f| f.name.clone()).collect(),
                rows: Vec::new(),
            });
        }
        Ok(())
    }

    fn insert(&self, table: &str, row: &[(&str, Value)]) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        let mem = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;

        let mut values = vec![Value::Null; mem.columns.len()];
        for (name, value) in row {
            let idx = mem.column(table, name)?;
            values[idx] = value.clone();
        }
        mem.rows.push(values);
        Ok(())
    }
}

impl StorageExecutor for MemoryStore {
    #[instrument(skip(self, query), fields(root = %query.root.table, joins = query.joins.len()))]
    fn execute(&self, query: &QueryDescription) -> Result<RowSet, StorageError> {
        self.round_trips.fetch_add(1, AtomicOrdering::Relaxed);
        let tables = self.tables.read();

        // Position 0 is the root, position i + 1 is join i
        let mut sources = vec![Source {
            name: &query.root.table,
            table: table(&tables, &query.root.table)?,
        }];
        let mut aliases: HashMap<&str, usize> = HashMap::new();

        let mut tuples: Vec<Tuple> = (0..sources[0].table.rows.len())
            .map(|i| vec![Some(i)])
            .collect();

        for join in &query.joins {
            let parent_pos = match &join.parent {
                None => 0,
                Some(alias) => *aliases.get(alias.as_str()).ok_or_else(|| {
                    StorageError::Decode(format!("join '{}' precedes its parent", join.alias))
                })?,
            };
            let target = table(&tables, &join.table)?;
            let local = sources[parent_pos]
                .table
                .column(sources[parent_pos].name, &join.local_field)?;
            let remote = target.column(&join.table, &join.remote_field)?;

            let mut next = Vec::with_capacity(tuples.len());
            for tuple in tuples {
                let key = tuple[parent_pos].map(|r| &sources[parent_pos].table.rows[r][local]);
                let matches: Vec<usize> = match key {
                    Some(key) if !key.is_null() => target
                        .rows
                        .iter()
                        .enumerate()
                        .filter(|(_, row)| values_equal(&row[remote], key))
                        .map(|(i, _)| i)
                        .collect(),
                    _ => Vec::new(),
                };

                if matches.is_empty() {
                    if join.kind == JoinKind::Left {
                        let mut extended = tuple;
                        extended.push(None);
                        next.push(extended);
                    }
                    continue;
                }
                for m in matches {
                    let mut extended = tuple.clone();
                    extended.push(Some(m));
                    next.push(extended);
                }
            }
            tuples = next;

            aliases.insert(&join.alias, sources.len());
            sources.push(Source {
                name: &join.table,
                table: target,
            });
        }

        let position = |alias: &Option<String>| -> Result<usize, StorageError> {
            match alias {
                None => Ok(0),
                Some(a) => aliases
                    .get(a.as_str())
                    .copied()
                    .ok_or_else(|| StorageError::Decode(format!("unknown alias '{}'", a))),
            }
        };
        let value_at = |tuple: &Tuple, pos: usize, col: usize| -> Value {
            match tuple[pos] {
                Some(r) => sources[pos].table.rows[r][col].clone(),
                None => Value::Null,
            }
        };

        // Filter
        let mut checks = Vec::with_capacity(query.predicates.len());
        for predicate in &query.predicates {
            let pos = position(&predicate.alias)?;
            let col = sources[pos].table.column(sources[pos].name, &predicate.column)?;
            checks.push((pos, col, &predicate.op));
        }
        tuples.retain(|tuple| {
            checks
                .iter()
                .all(|(pos, col, op)| evaluate(op, &value_at(tuple, *pos, *col)))
        });

        // Order
        let mut keys = Vec::with_capacity(query.order_by.len());
        for key in &query.order_by {
            let pos = position(&key.alias)?;
            let col = sources[pos].table.column(sources[pos].name, &key.column)?;
            keys.push((pos, col, key.direction));
        }
        tuples.sort_by(|a, b| {
            for (pos, col, direction) in &keys {
                let ord = compare_nulls_first(&value_at(a, *pos, *col), &value_at(b, *pos, *col));
                let ord = match direction {
                    OrderDirection::Asc => ord,
                    OrderDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        // Window
        let limit = query.limit.unwrap_or(usize::MAX);
        let tuples: Vec<Tuple> = tuples.into_iter().skip(query.offset).take(limit).collect();

        let result = match &query.selection {
            Selection::Entities => {
                let root_cols = query
                    .root
                    .columns
                    .iter()
                    .map(|c| sources[0].table.column(sources[0].name, &c.name).map(|i| (c, i)))
                    .collect::<Result<Vec<_>, _>>()?;
                let root_id = sources[0].table.column(sources[0].name, &query.root.identity)?;

                let mut fetched = Vec::new();
                for join in query.fetched_joins() {
                    let pos = aliases[join.alias.as_str()];
                    let cols = join
                        .columns
                        .iter()
                        .map(|c| sources[pos].table.column(&join.table, &c.name).map(|i| (c, i)))
                        .collect::<Result<Vec<_>, _>>()?;
                    let id = sources[pos].table.column(&join.table, &join.identity)?;
                    fetched.push((join.alias.as_str(), pos, id, cols));
                }

                let mut rows = Vec::with_capacity(tuples.len());
                for tuple in &tuples {
                    let root = entity_row(
                        &value_at(tuple, 0, root_id),
                        root_cols
                            .iter()
                            .map(|(c, i)| (c.name.clone(), value_at(tuple, 0, *i))),
                    )?;
                    let mut joined = Vec::with_capacity(fetched.len());
                    for (alias, pos, id, cols) in &fetched {
                        let part = match tuple[*pos] {
                            None => None,
                            Some(_) => Some(entity_row(
                                &value_at(tuple, *pos, *id),
                                cols.iter()
                                    .map(|(c, i)| (c.name.clone(), value_at(tuple, *pos, *i))),
                            )?),
                        };
                        joined.push((alias.to_string(), part));
                    }
                    rows.push(JoinedRow { root, joined });
                }
                RowSet::Entities(rows)
            }
            Selection::Columns(columns) => {
                let mut resolved = Vec::with_capacity(columns.len());
                for column in columns {
                    let pos = position(&column.alias)?;
                    let col = sources[pos]
                        .table
                        .column(sources[pos].name, &column.column.name)?;
                    resolved.push((column.output.as_str(), pos, col));
                }
                RowSet::Projection(
                    tuples
                        .iter()
                        .map(|tuple| {
                            ProjectionRow::new(
                                resolved
                                    .iter()
                                    .map(|(out, pos, col)| {
                                        (out.to_string(), value_at(tuple, *pos, *col))
                                    })
                                    .collect(),
                            )
                        })
                        .collect(),
                )
            }
        };

        debug!(rows = result.len(), "memory query executed");
        Ok(result)
    }
}

fn table<'t>(
    tables: &'t HashMap<String, MemTable>,
    name: &str,
) -> Result<&'t MemTable, StorageError> {
    tables
        .get(name)
        .ok_or_else(|| StorageError::UnknownTable(name.to_string()))
}

fn entity_row(
    id: &Value,
    fields: impl Iterator<Item = (String, Value)>,
) -> Result<EntityRow, StorageError> {
    let id = id
        .as_i64()
        .ok_or_else(|| StorageError::Decode(format!("identity is {}", id.type_name())))?;
    Ok(EntityRow {
        id,
        fields: fields.collect(),
    })
}

/// Evaluate one predicate against a column value.
fn evaluate(op: &PredicateOp, value: &Value) -> bool {
    match op {
        PredicateOp::Eq(expected) => values_equal(value, expected),
        PredicateOp::Contains(needle) => value.as_str().is_some_and(|s| s.contains(needle.as_str())),
        PredicateOp::StartsWith(prefix) => {
            value.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
        }
        PredicateOp::In(values) => values.iter().any(|v| values_equal(value, v)),
    }
}

/// Check if two values are equal. Null equals nothing, as in SQL.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int32(a), Value::Int32(b)) => a == b,
        (Value::Int64(a), Value::Int64(b)) => a == b,
        (Value::Int32(a), Value::Int64(b)) => (*a as i64) == *b,
        (Value::Int64(a), Value::Int32(b)) => *a == (*b as i64),
        (Value::Float64(a), Value::Float64(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
        _ => false,
    }
}

/// Compare two values, returning their ordering if comparable.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Int32(a), Value::Int32(b)) => Some(a.cmp(b)),
        (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
        (Value::Int32(a), Value::Int64(b)) => Some((*a as i64).cmp(b)),
        (Value::Int64(a), Value::Int32(b)) => Some(a.cmp(&(*b as i64))),
        (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn compare_nulls_first(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}
