//! Learning Store - durable record of correction trails
//!
//! SQLite-backed; the schema is created on open and writes are committed
//! before the call returns. A mutex serializes access so concurrent
//! requests cannot interleave partial writes.

use crate::constraints::Constraints;
use crate::error::{CoreError, CoreResult};
use crate::validation::ValidationStatus;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Deterministic fingerprint over a (user utterance, original SQL) pair
pub fn query_hash(user_utterance: &str, original_sql: &str) -> String {
    format!(
        "{:x}",
        md5::compute(format!("{user_utterance}:{original_sql}"))
    )
}

/// Durable record of one processed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub query_hash: String,
    pub original_sql: String,
    pub final_sql: String,
    pub user_utterance: String,
    pub constraints: Constraints,
    pub correction_reason: String,
    pub timestamp: DateTime<Utc>,
    pub iteration_count: u32,
    pub status: ValidationStatus,
}

/// Aggregate view over the stored records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningStats {
    pub total: u64,
    pub status_histogram: BTreeMap<String, u64>,
    pub avg_iterations: f64,
    /// Up to five most frequent non-empty correction reasons
    pub top_correction_reasons: Vec<(String, u64)>,
}

pub struct LearningStore {
    conn: Mutex<Connection>,
}

const SELECT_COLUMNS: &str = "query_hash, original_query, corrected_query, user_input, \
                              constraints, correction_reason, timestamp, iteration_count, \
                              validation_status";

impl LearningStore {
    /// Open (creating if missing) a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::init_schema(&conn)?;
        info!(path = %path.as_ref().display(), "learning store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store; used by tests and throwaway sessions
    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> CoreResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS feedback_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query_hash TEXT NOT NULL UNIQUE,
                original_query TEXT NOT NULL,
                corrected_query TEXT NOT NULL,
                user_input TEXT NOT NULL,
                constraints TEXT NOT NULL,
                correction_reason TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                iteration_count INTEGER NOT NULL,
                validation_status TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_query_hash ON feedback_records(query_hash);",
        )?;
        Ok(())
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoreError::store("learning store mutex poisoned"))
    }

    /// Upsert by query_hash; a second call with the same hash overwrites
    pub fn store(&self, record: &FeedbackRecord) -> CoreResult<()> {
        let constraints = serde_json::to_string(&record.constraints)
            .map_err(|e| CoreError::store(format!("failed to serialize constraints: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO feedback_records (
                query_hash, original_query, corrected_query, user_input, constraints,
                correction_reason, timestamp, iteration_count, validation_status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.query_hash,
                record.original_sql,
                record.final_sql,
                record.user_utterance,
                constraints,
                record.correction_reason,
                record.timestamp.to_rfc3339(),
                record.iteration_count,
                record.status.as_str(),
            ],
        )?;
        debug!(query_hash = %record.query_hash, "stored feedback record");
        Ok(())
    }

    /// Most similar prior corrections: newest-first among corrected records,
    /// re-ranked by constraint-shape overlap
    pub fn similar(&self, constraints: &Constraints, limit: usize) -> CoreResult<Vec<FeedbackRecord>> {
        let window = limit.max(16);
        let raw = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM feedback_records \
                 WHERE validation_status = 'corrected' \
                 ORDER BY timestamp DESC, id DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![window as i64], row_to_raw)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut scored: Vec<(u32, FeedbackRecord)> = Vec::with_capacity(raw.len());
        for raw_record in raw {
            let record = raw_record.into_record()?;
            scored.push((constraint_similarity(constraints, &record.constraints), record));
        }
        // Stable sort keeps recency order within equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(limit).map(|(_, r)| r).collect())
    }

    /// Aggregate totals, status histogram, average iterations, top reasons
    pub fn stats(&self) -> CoreResult<LearningStats> {
        let conn = self.lock()?;

        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM feedback_records", [], |r| r.get(0))?;

        let mut status_histogram = BTreeMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT validation_status, COUNT(*) FROM feedback_records \
                 GROUP BY validation_status",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, count) = row?;
                status_histogram.insert(status, count as u64);
            }
        }

        let avg_iterations: f64 = conn
            .query_row(
                "SELECT AVG(iteration_count) FROM feedback_records",
                [],
                |r| r.get::<_, Option<f64>>(0),
            )?
            .unwrap_or(0.0);

        let mut top_correction_reasons = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT correction_reason, COUNT(*) AS uses FROM feedback_records \
                 WHERE correction_reason != '' \
                 GROUP BY correction_reason ORDER BY uses DESC LIMIT 5",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (reason, uses) = row?;
                top_correction_reasons.push((reason, uses as u64));
            }
        }

        Ok(LearningStats {
            total: total as u64,
            status_histogram,
            avg_iterations,
            top_correction_reasons,
        })
    }
}

/// Row image before constraint/timestamp/status decoding
struct RawRecord {
    query_hash: String,
    original_sql: String,
    final_sql: String,
    user_utterance: String,
    constraints_json: String,
    correction_reason: String,
    timestamp: String,
    iteration_count: i64,
    status: String,
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        query_hash: row.get(0)?,
        original_sql: row.get(1)?,
        final_sql: row.get(2)?,
        user_utterance: row.get(3)?,
        constraints_json: row.get(4)?,
        correction_reason: row.get(5)?,
        timestamp: row.get(6)?,
        iteration_count: row.get(7)?,
        status: row.get(8)?,
    })
}

impl RawRecord {
    fn into_record(self) -> CoreResult<FeedbackRecord> {
        let constraints = serde_json::from_str(&self.constraints_json)
            .map_err(|e| CoreError::store(format!("failed to decode constraints: {e}")))?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| CoreError::store(format!("failed to parse timestamp: {e}")))?
            .with_timezone(&Utc);
        let status = ValidationStatus::parse(&self.status).ok_or_else(|| {
            CoreError::store(format!("unknown validation status '{}'", self.status))
        })?;
        Ok(FeedbackRecord {
            query_hash: self.query_hash,
            original_sql: self.original_sql,
            final_sql: self.final_sql,
            user_utterance: self.user_utterance,
            constraints,
            correction_reason: self.correction_reason,
            timestamp,
            iteration_count: self.iteration_count as u32,
            status,
        })
    }
}

fn constraint_similarity(a: &Constraints, b: &Constraints) -> u32 {
    let mut score = 0;
    if a.aggregation.is_some() && a.aggregation == b.aggregation {
        score += 2;
    }
    score += a.counties.intersection(&b.counties).count() as u32;
    score += a
        .property_types
        .intersection(&b.property_types)
        .count() as u32;
    score
}
