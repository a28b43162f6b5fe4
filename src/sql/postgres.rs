//! PostgreSQL driver: one pooled connection per request, statements sent as text.

use crate::clock;
use crate::sql::{quoted, Driver, Naming, Outcome, Query, StatementKind, StorageError, StorageErrorKind};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgRow, PgValueFormat};
use sqlx::{PgPool, Postgres};

pub struct PgDriver {
    conn: PoolConnection<Postgres>,
}

impl PgDriver {
    /// Takes a connection out of the pool for the lifetime of one request.
    pub async fn acquire(pool: &PgPool) -> Result<Self, StorageError> {
        let conn = pool
            .acquire()
            .await
            .map_err(|e| storage_error(e, None))?;
        Ok(PgDriver { conn })
    }

    async fn control(&mut self, statement: &str) -> Result<(), StorageError> {
        tracing::debug!(sql = %statement, "transaction");
        sqlx::Executor::execute(&mut *self.conn, sqlx::raw_sql(statement))
            .await
            .map_err(|e| storage_error(e, Some(StorageErrorKind::Transaction)))?;
        Ok(())
    }
}

impl Naming for PgDriver {}

#[async_trait]
impl Driver for PgDriver {
    async fn execute(&mut self, query: &Query) -> Result<Outcome, StorageError> {
        match (query.kind, query.returning.as_deref()) {
            (StatementKind::Select | StatementKind::Count, _) => {
                let rows = sqlx::Executor::fetch_all(&mut *self.conn, sqlx::raw_sql(&query.sql))
                    .await
                    .map_err(|e| storage_error(e, None))?;
                Ok(Outcome::Rows(rows.iter().map(row_to_map).collect()))
            }
            (StatementKind::Insert, Some(key)) => {
                let sql = format!("{} RETURNING {}", query.sql, quoted(key));
                let row = sqlx::Executor::fetch_optional(&mut *self.conn, sqlx::raw_sql(&sql))
                    .await
                    .map_err(|e| storage_error(e, None))?;
                let rows = u64::from(row.is_some());
                let last_insert_id = row.as_ref().map(|r| cell_to_value(r, key));
                Ok(Outcome::Affected {
                    rows,
                    last_insert_id,
                })
            }
            _ => {
                let done = sqlx::Executor::execute(&mut *self.conn, sqlx::raw_sql(&query.sql))
                    .await
                    .map_err(|e| storage_error(e, None))?;
                Ok(Outcome::Affected {
                    rows: done.rows_affected(),
                    last_insert_id: None,
                })
            }
        }
    }

    async fn begin(&mut self) -> Result<(), StorageError> {
        self.control("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        self.control("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        self.control("ROLLBACK").await
    }
}

/// Map a sqlx failure to a storage error; `kind` overrides the classification.
fn storage_error(e: sqlx::Error, kind: Option<StorageErrorKind>) -> StorageError {
    let classified = match &e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StorageErrorKind::Connection,
        sqlx::Error::Database(_) | sqlx::Error::ColumnNotFound(_) => StorageErrorKind::Statement,
        _ => StorageErrorKind::Unknown,
    };
    let code = match &e {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()).unwrap_or_default(),
        _ => String::new(),
    };
    StorageError::new(kind.unwrap_or(classified), code, e.to_string())
}

fn row_to_map(row: &PgRow) -> Map<String, Value> {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    // Timestamps read back in the same text form they are written in.
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(clock::format(&d));
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(clock::format_naive(&d));
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    // numeric, time, enums, arrays and the like: keep the text the server sent.
    raw_text(row, name).map(Value::String).unwrap_or(Value::Null)
}

fn raw_text(row: &PgRow, name: &str) -> Option<String> {
    use sqlx::{Row, ValueRef};
    let raw = row.try_get_raw(name).ok()?;
    if raw.is_null() || raw.format() != PgValueFormat::Text {
        return None;
    }
    raw.as_str().ok().map(str::to_string)
}
