//! Execution result model
//!
//! Rows are materialized as tagged cells so downstream logic dispatches on
//! the tag instead of guessing at positional tuple types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single materialized value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
}

impl Cell {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

pub type Row = Vec<Cell>;

/// Outcome of one statement execution; immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Column names keyed by position
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: u64,
    /// Wall-clock execution time
    pub elapsed: Duration,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ExecutionResult {
    pub fn failed(message: String, elapsed: Duration) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            elapsed,
            errors: vec![message],
            warnings: Vec::new(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }

    pub fn is_err(&self) -> bool {
        !self.errors.is_empty()
    }
}
