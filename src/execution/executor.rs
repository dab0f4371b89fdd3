//! Executor - runs statements against the property store
//!
//! Never fails out of the core: store errors and timeouts land in the
//! result's `errors` list and surface as validation issues.

use crate::error::CoreResult;
use crate::execution::result::{ExecutionResult, Row};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Raw tabular payload returned by a property store
#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Capability interface over the backing relational store
///
/// Injected at construction; implementations must release any pooled
/// connection on every exit path, including errors.
pub trait PropertyStore: Send + Sync {
    fn query(&self, sql: &str, timeout: Duration) -> CoreResult<TableData>;
}

pub struct Executor {
    store: Arc<dyn PropertyStore>,
    timeout: Duration,
}

impl Executor {
    pub fn new(store: Arc<dyn PropertyStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Execute one statement, materializing rows and timing
    pub fn execute(&self, sql: &str) -> ExecutionResult {
        let started = Instant::now();
        match self.store.query(sql, self.timeout) {
            Ok(data) => {
                let elapsed = started.elapsed();
                debug!(rows = data.rows.len(), elapsed_ms = elapsed.as_millis() as u64, "statement completed");
                ExecutionResult {
                    columns: data.columns,
                    row_count: data.rows.len() as u64,
                    rows: data.rows,
                    elapsed,
                    errors: Vec::new(),
                    warnings: Vec::new(),
                }
            }
            Err(err) => {
                warn!("statement failed: {err}");
                ExecutionResult::failed(err.to_string(), started.elapsed())
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::execution::result::Cell;

    struct OneRowStore;

    impl PropertyStore for OneRowStore {
        fn query(&self, _sql: &str, _timeout: Duration) -> CoreResult<TableData> {
            Ok(TableData {
                columns: vec!["id".to_string(), "name".to_string()],
                rows: vec![vec![Cell::Int(1), Cell::Text("Corner Lot".to_string())]],
            })
        }
    }

    struct FailingStore;

    impl PropertyStore for FailingStore {
        fn query(&self, _sql: &str, _timeout: Duration) -> CoreResult<TableData> {
            Err(CoreError::execution("relation \"nowhere\" does not exist"))
        }
    }

    #[test]
    fn test_execute_materializes_rows() {
        let executor = Executor::new(Arc::new(OneRowStore), Duration::from_secs(30));
        let result = executor.execute("SELECT id, name FROM \"Georgia Properties\"");
        assert_eq!(result.row_count, 1);
        assert_eq!(result.columns, vec!["id", "name"]);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_execute_captures_errors_instead_of_failing() {
        let executor = Executor::new(Arc::new(FailingStore), Duration::from_secs(30));
        let result = executor.execute("SELECT * FROM nowhere");
        assert_eq!(result.row_count, 0);
        assert!(result.is_err());
        assert!(result.errors[0].contains("does not exist"));
    }
}
