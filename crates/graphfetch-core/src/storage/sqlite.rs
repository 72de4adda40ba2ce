//! SQLite storage executor.
//!
//! Renders query descriptions to parameterized SQL and decodes rows using the
//! column types carried by the description. Text predicates use `instr` rather
//! than `LIKE`, so matching is case-sensitive and `%`/`_` are literal.

use std::sync::atomic::{AtomicUsize, Ordering};

use graphfetch_proto::{OrderDirection, ProjectionRow, Value};
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Row};
use tracing::{debug, instrument};

use crate::catalog::{Catalog, ScalarType};
use crate::error::StorageError;
use crate::query::{ColumnRef, JoinKind, PredicateOp, QueryDescription, Selection};

use super::{EntityRow, JoinedRow, RowSet, StorageExecutor, TableWriter};

/// SQLite executor over one connection.
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
    round_trips: AtomicUsize,
}

impl SqliteExecutor {
    /// Wrap an open connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            round_trips: AtomicUsize::new(0),
        }
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// Number of queries executed so far.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::Relaxed)
    }

    /// Run a closure with the underlying connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(&self.conn.lock())
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn sql_type(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Bool | ScalarType::Int32 | ScalarType::Int64 | ScalarType::Timestamp => {
            "INTEGER"
        }
        ScalarType::Float64 => "REAL",
        ScalarType::String => "TEXT",
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Int32(i) => SqlValue::Integer(*i as i64),
        Value::Int64(i) => SqlValue::Integer(*i),
        Value::Float64(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Timestamp(t) => SqlValue::Integer(*t),
    }
}

fn decode(value: ValueRef<'_>, column: &ColumnRef) -> Result<Value, StorageError> {
    let mismatch = || {
        StorageError::Decode(format!(
            "column {} holds {:?}, expected {:?}",
            column.name,
            value.data_type(),
            column.scalar
        ))
    };
    Ok(match (value, column.scalar) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(i), ScalarType::Bool) => Value::Bool(i != 0),
        (ValueRef::Integer(i), ScalarType::Int32) => {
            Value::Int32(i32::try_from(i).map_err(|_| mismatch())?)
        }
        (ValueRef::Integer(i), ScalarType::Int64) => Value::Int64(i),
        (ValueRef::Integer(i), ScalarType::Timestamp) => Value::Timestamp(i),
        (ValueRef::Integer(i), ScalarType::Float64) => Value::Float64(i as f64),
        (ValueRef::Real(f), ScalarType::Float64) => Value::Float64(f),
        (ValueRef::Text(bytes), ScalarType::String) => Value::String(
            std::str::from_utf8(bytes)
                .map_err(|e| StorageError::Decode(e.to_string()))?
                .to_string(),
        ),
        _ => return Err(mismatch()),
    })
}

/// Read an entity part starting at `start`; `None` when its identity is null.
fn read_entity(
    row: &Row<'_>,
    start: usize,
    columns: &[ColumnRef],
    identity: &str,
) -> Result<Option<EntityRow>, StorageError> {
    let mut fields = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        fields.push((column.name.clone(), decode(row.get_ref(start + i)?, column)?));
    }
    match fields.iter().find(|(n, _)| n == identity).map(|(_, v)| v) {
        Some(Value::Null) => Ok(None),
        Some(id) => {
            let id = id
                .as_i64()
                .ok_or_else(|| StorageError::Decode(format!("identity is {}", id.type_name())))?;
            Ok(Some(EntityRow { id, fields }))
        }
        None => Err(StorageError::Decode(format!(
            "identity column {} not selected",
            identity
        ))),
    }
}

/// Render a description to SQL and its positional parameters.
///
/// The root is aliased `t0` and join `i` is aliased `t{i + 1}`.
pub fn render_sql(query: &QueryDescription) -> Result<(String, Vec<Value>), StorageError> {
    let alias_of = |alias: &Option<String>| -> Result<String, StorageError> {
        match alias {
            None => Ok("t0".to_string()),
            Some(a) => query
                .joins
                .iter()
                .position(|j| &j.alias == a)
                .map(|i| format!("t{}", i + 1))
                .ok_or_else(|| StorageError::Decode(format!("unknown alias '{}'", a))),
        }
    };

    let mut select = Vec::new();
    match &query.selection {
        Selection::Entities => {
            for column in &query.root.columns {
                select.push(format!("t0.{}", quote(&column.name)));
            }
            for (i, join) in query.joins.iter().enumerate() {
                if join.fetched {
                    for column in &join.columns {
                        select.push(format!("t{}.{}", i + 1, quote(&column.name)));
                    }
                }
            }
        }
        Selection::Columns(columns) => {
            for column in columns {
                select.push(format!(
                    "{}.{}",
                    alias_of(&column.alias)?,
                    quote(&column.column.name)
                ));
            }
        }
    }

    let mut sql = format!(
        "SELECT {} FROM {} t0",
        select.join(", "),
        quote(&query.root.table)
    );

    for (i, join) in query.joins.iter().enumerate() {
        let kind = match join.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        sql.push_str(&format!(
            " {} {} t{} ON {}.{} = t{}.{}",
            kind,
            quote(&join.table),
            i + 1,
            alias_of(&join.parent)?,
            quote(&join.local_field),
            i + 1,
            quote(&join.remote_field)
        ));
    }

    let mut params = Vec::new();
    if !query.predicates.is_empty() {
        let mut terms = Vec::with_capacity(query.predicates.len());
        for predicate in &query.predicates {
            let column = format!("{}.{}", alias_of(&predicate.alias)?, quote(&predicate.column));
            terms.push(match &predicate.op {
                PredicateOp::Eq(value) => {
                    params.push(value.clone());
                    format!("{} = ?", column)
                }
                PredicateOp::Contains(text) => {
                    params.push(Value::String(text.clone()));
                    format!("instr({}, ?) > 0", column)
                }
                PredicateOp::StartsWith(text) => {
                    params.push(Value::String(text.clone()));
                    format!("instr({}, ?) = 1", column)
                }
                PredicateOp::In(values) if values.is_empty() => "0".to_string(),
                PredicateOp::In(values) => {
                    params.extend(values.iter().cloned());
                    let marks = vec!["?"; values.len()].join(", ");
                    format!("{} IN ({})", column, marks)
                }
            });
        }
        sql.push_str(" WHERE ");
        sql.push_str(&terms.join(" AND "));
    }

    if !query.order_by.is_empty() {
        let mut keys = Vec::with_capacity(query.order_by.len());
        for key in &query.order_by {
            let dir = match key.direction {
                OrderDirection::Asc => "ASC",
                OrderDirection::Desc => "DESC",
            };
            keys.push(format!("{}.{} {}", alias_of(&key.alias)?, quote(&key.column), dir));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    // SQLite limits are signed 64-bit
    let limit = query.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
    match (limit, query.offset) {
        (Some(limit), 0) => sql.push_str(&format!(" LIMIT {}", limit)),
        (Some(limit), offset) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        (None, 0) => {}
        (None, offset) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
    }

    Ok((sql, params))
}

impl StorageExecutor for SqliteExecutor {
    #[instrument(skip(self, query), fields(root = %query.root.table, joins = query.joins.len()))]
    fn execute(&self, query: &QueryDescription) -> Result<RowSet, StorageError> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        let (sql, params) = render_sql(query)?;
        debug!(sql = %sql, params = params.len(), "sqlite query");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql)))?;

        let result = match &query.selection {
            Selection::Entities => {
                let fetched: Vec<_> = query.fetched_joins().collect();
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let root = read_entity(row, 0, &query.root.columns, &query.root.identity)?
                        .ok_or_else(|| StorageError::Decode("root identity is null".into()))?;
                    let mut start = query.root.columns.len();
                    let mut joined = Vec::with_capacity(fetched.len());
                    for join in &fetched {
                        joined.push((
                            join.alias.clone(),
                            read_entity(row, start, &join.columns, &join.identity)?,
                        ));
                        start += join.columns.len();
                    }
                    out.push(JoinedRow { root, joined });
                }
                RowSet::Entities(out)
            }
            Selection::Columns(columns) => {
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let mut values = Vec::with_capacity(columns.len());
                    for (i, column) in columns.iter().enumerate() {
                        values.push((column.output.clone(), decode(row.get_ref(i)?, &column.column)?));
                    }
                    out.push(ProjectionRow::new(values));
                }
                RowSet::Projection(out)
            }
        };

        debug!(rows = result.len(), "sqlite query executed");
        Ok(result)
    }
}

impl TableWriter for SqliteExecutor {
    fn create_tables(&self, catalog: &Catalog) -> Result<(), StorageError> {
        let mut ddl = String::new();
        for entity in catalog.schema().entities.values() {
            let columns: Vec<String> = entity
                .fields
                .iter()
                .map(|f| {
                    let mut column = format!("{} {}", quote(&f.name), sql_type(f.storage_type()));
                    if f.name == entity.identity_field {
                        column.push_str(" PRIMARY KEY");
                    } else if !f.is_nullable() {
                        column.push_str(" NOT NULL");
                    }
                    column
                })
                .collect();
            ddl.push_str(&format!(
                "CREATE TABLE IF NOT EXISTS {} ({});\n",
                quote(&entity.table),
                columns.join(", ")
            ));
        }

        for relation in &catalog.schema().relations {
            if let Some(target) = catalog.schema().get_entity(&relation.to_entity) {
                if relation.to_field != target.identity_field {
                    ddl.push_str(&format!(
                        "CREATE INDEX IF NOT EXISTS {} ON {}({});\n",
                        quote(&format!("idx_{}_{}", target.table, relation.to_field)),
                        quote(&target.table),
                        quote(&relation.to_field)
                    ));
                }
            }
        }

        self.conn.lock().execute_batch(&ddl)?;
        Ok(())
    }

    fn insert(&self, table: &str, row: &[(&str, Value)]) -> Result<(), StorageError> {
        let columns: Vec<String> = row.iter().map(|(name, _)| quote(name)).collect();
        let marks = vec!["?"; row.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table),
            columns.join(", "),
            marks
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(row.iter().map(|(_, v)| to_sql(v))))?;
        Ok(())
    }
}
