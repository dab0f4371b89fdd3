//! Feedback Loop Orchestrator
//!
//! Drives the execute -> validate -> correct cycle over a candidate SQL up
//! to the configured iteration bound, then assembles the response envelope.
//! Every terminal state produces a well-formed envelope; the orchestrator
//! never raises to the caller.

use crate::config::EngineConfig;
use crate::constraints::{ConstraintExtractor, Constraints};
use crate::correction::{Correction, SqlCorrector};
use crate::error::{CoreError, CoreResult};
use crate::execution::{ExecutionResult, Executor, PropertyStore};
use crate::learning::{query_hash, FeedbackRecord, LearningStats, LearningStore, Reporter};
use crate::schema_map::SchemaMap;
use crate::sql_builder::{CandidateSource, SqlBuilder};
use crate::validation::{Issue, ResultValidator, ValidationStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One recorded correction round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionStep {
    /// Execution round that produced the issues (1-based)
    pub iteration: u32,
    pub issues: Vec<Issue>,
    pub reason: String,
    pub before_sql: String,
    pub after_sql: String,
}

/// Response envelope returned for every processed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub final_sql: String,
    pub result: ExecutionResult,
    pub status: ValidationStatus,
    /// Number of correction attempts made
    pub iteration_count: u32,
    pub history: Vec<CorrectionStep>,
    pub constraints: Constraints,
    /// Readable without consulting `history`
    pub explanation: String,
}

pub struct FeedbackEngine {
    config: EngineConfig,
    extractor: ConstraintExtractor,
    executor: Executor,
    validator: ResultValidator,
    corrector: SqlCorrector,
    learning: Arc<LearningStore>,
}

impl FeedbackEngine {
    /// Wire the components; the property store and learning store are
    /// injected so process-wide lifecycle stays with the caller
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn PropertyStore>,
        learning: Arc<LearningStore>,
    ) -> Self {
        let schema = Arc::new(SchemaMap::new(
            config.county_list.clone(),
            config.property_type_synonyms.clone(),
        ));
        let extractor = ConstraintExtractor::new(schema.clone());
        let builder = SqlBuilder::new(
            schema.clone(),
            config.default_limit,
            config.default_order.clone(),
        );
        let executor = Executor::new(store, Duration::from_secs(config.execution_timeout_secs));
        let corrector = SqlCorrector::new(schema, builder, learning.clone());
        Self {
            config,
            extractor,
            executor,
            validator: ResultValidator::new(),
            corrector,
            learning,
        }
    }

    /// Process one request: extract constraints, then loop
    /// execute -> validate -> correct until valid, unfixable, or out of
    /// budget, and persist the trail
    pub fn process(&self, user_utterance: &str, candidate_sql: &str) -> Envelope {
        info!(utterance = user_utterance, "processing query");
        let constraints = self.extractor.extract(user_utterance);

        let mut current_sql = candidate_sql.to_string();
        let mut status = ValidationStatus::Success;
        let mut history: Vec<CorrectionStep> = Vec::new();
        let mut corrections: u32 = 0;
        let mut executions: u32 = 0;

        let mut last_result;
        let mut last_executed_sql;
        loop {
            executions += 1;
            last_result = self.executor.execute(&current_sql);
            last_executed_sql = current_sql.clone();

            let (ok, issues) = self
                .validator
                .validate(&last_result, &constraints, &current_sql);
            if ok {
                info!(iteration = executions, "validation passed");
                break;
            }
            warn!(iteration = executions, issues = issues.len(), "validation failed");

            // Degenerate budgets skip correction entirely
            if executions > self.config.max_iterations {
                let err = CoreError::IterationBudgetExceeded {
                    limit: self.config.max_iterations,
                };
                warn!("{err}");
                status = ValidationStatus::MaxIterations;
                break;
            }

            let Correction {
                sql: corrected,
                reason,
            } = self
                .corrector
                .correct(&current_sql, &constraints, &issues, user_utterance);
            corrections += 1;

            if corrected == current_sql {
                let err = CoreError::NoCorrection;
                warn!("{err}");
                status = ValidationStatus::Failed;
                break;
            }

            history.push(CorrectionStep {
                iteration: executions,
                issues,
                reason,
                before_sql: current_sql.clone(),
                after_sql: corrected.clone(),
            });
            current_sql = corrected;
            status = ValidationStatus::Corrected;

            if executions == self.config.max_iterations {
                let err = CoreError::IterationBudgetExceeded {
                    limit: self.config.max_iterations,
                };
                warn!("{err}");
                status = ValidationStatus::MaxIterations;
                break;
            }
        }

        // The envelope always carries the result of the final SQL; skip the
        // re-execution when the loop's last run already was that SQL
        let final_result = if last_executed_sql == current_sql {
            last_result
        } else {
            self.executor.execute(&current_sql)
        };

        let reasons: Vec<&str> = history.iter().map(|step| step.reason.as_str()).collect();
        let record = FeedbackRecord {
            query_hash: query_hash(user_utterance, candidate_sql),
            original_sql: candidate_sql.to_string(),
            final_sql: current_sql.clone(),
            user_utterance: user_utterance.to_string(),
            constraints: constraints.clone(),
            correction_reason: reasons.join("; "),
            timestamp: Utc::now(),
            iteration_count: corrections,
            status,
        };
        // Persistence failures never reach the caller
        if let Err(err) = self.learning.store(&record) {
            warn!("failed to persist feedback record: {err}");
        }

        let explanation = build_explanation(&history, status);
        info!(
            status = status.as_str(),
            iterations = corrections,
            "request complete"
        );
        Envelope {
            final_sql: current_sql,
            result: final_result,
            status,
            iteration_count: corrections,
            history,
            constraints,
            explanation,
        }
    }

    /// Convenience path: obtain the candidate from an injected source first
    pub fn process_with(
        &self,
        user_utterance: &str,
        source: &dyn CandidateSource,
    ) -> CoreResult<Envelope> {
        let candidate = source.candidate(user_utterance)?;
        Ok(self.process(user_utterance, &candidate))
    }

    pub fn stats(&self) -> CoreResult<LearningStats> {
        self.learning.stats()
    }

    pub fn recommendations(&self) -> CoreResult<Vec<String>> {
        Reporter::new(self.learning.clone()).recommendations()
    }

    pub fn performance_report(&self) -> CoreResult<String> {
        Reporter::new(self.learning.clone()).performance_report()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

fn build_explanation(history: &[CorrectionStep], status: ValidationStatus) -> String {
    if status == ValidationStatus::Success {
        return "Query executed successfully without corrections.".to_string();
    }
    if history.is_empty() {
        return "Query failed validation but no corrections could be applied.".to_string();
    }
    let status_message = match status {
        ValidationStatus::Success => "Query executed successfully without corrections.",
        ValidationStatus::Corrected => "Query was successfully corrected.",
        ValidationStatus::Failed => "Query corrections failed.",
        ValidationStatus::MaxIterations => "Maximum correction attempts reached.",
    };
    let steps: Vec<String> = history
        .iter()
        .map(|step| format!("Iteration {}: {}", step.iteration, step.reason))
        .collect();
    format!("{status_message} Corrections applied: {}", steps.join("; "))
}
