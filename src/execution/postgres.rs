//! Pooled Postgres-backed property store
//!
//! Checkout is scoped: the connection returns to the pool when the guard
//! drops, on success, error, and cancellation alike. A `statement_timeout`
//! is applied per checkout so a runaway statement surfaces as a timeout
//! error instead of holding the connection.

use crate::error::{CoreError, CoreResult};
use crate::execution::executor::{PropertyStore, TableData};
use crate::execution::result::{Cell, Row};
use postgres::error::SqlState;
use postgres::{NoTls, SimpleQueryMessage};
use r2d2_postgres::PostgresConnectionManager;
use std::time::Duration;
use tracing::info;

pub struct PostgresPropertyStore {
    pool: r2d2::Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresPropertyStore {
    /// Build a pool over the given connection string
    pub fn connect(url: &str, pool_size: u32) -> CoreResult<Self> {
        let config = url
            .parse::<postgres::Config>()
            .map_err(|e| CoreError::store(format!("invalid connection string: {e}")))?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = r2d2::Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| CoreError::store(format!("failed to build connection pool: {e}")))?;
        info!(pool_size, "property store pool ready");
        Ok(Self { pool })
    }
}

impl PropertyStore for PostgresPropertyStore {
    fn query(&self, sql: &str, timeout: Duration) -> CoreResult<TableData> {
        let mut client = self
            .pool
            .get()
            .map_err(|e| CoreError::store(format!("connection checkout failed: {e}")))?;

        client
            .batch_execute(&format!("SET statement_timeout = {}", timeout.as_millis()))
            .map_err(|e| CoreError::execution(format!("failed to set statement timeout: {e}")))?;

        let messages = client
            .simple_query(sql)
            .map_err(|e| map_pg_error(e, timeout))?;

        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Row> = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                if columns.is_empty() {
                    columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                rows.push((0..row.len()).map(|i| cell_from_text(row.get(i))).collect());
            }
        }
        Ok(TableData { columns, rows })
    }
}

fn map_pg_error(err: postgres::Error, timeout: Duration) -> CoreError {
    if err.code() == Some(&SqlState::QUERY_CANCELED) {
        CoreError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        CoreError::execution(err.to_string())
    }
}

/// Materialize a text-protocol value into a typed cell
fn cell_from_text(value: Option<&str>) -> Cell {
    let Some(text) = value else {
        return Cell::Null;
    };
    if let Ok(n) = text.parse::<i64>() {
        return Cell::Int(n);
    }
    if let Ok(f) = text.parse::<f64>() {
        return Cell::Float(f);
    }
    if text.starts_with('{') || text.starts_with('[') {
        if let Ok(json) = serde_json::from_str(text) {
            return Cell::Json(json);
        }
    }
    Cell::Text(text.to_string())
}
