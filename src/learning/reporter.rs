//! Reporter - read-only summaries over the learning store

use crate::error::CoreResult;
use crate::learning::store::LearningStore;
use std::sync::Arc;

pub struct Reporter {
    store: Arc<LearningStore>,
}

impl Reporter {
    pub fn new(store: Arc<LearningStore>) -> Self {
        Self { store }
    }

    /// Human-readable performance summary: totals, status distribution,
    /// average iterations, top correction reasons
    pub fn performance_report(&self) -> CoreResult<String> {
        let stats = self.store.stats()?;
        let mut report = String::new();
        report.push_str("Query correction performance\n");
        report.push_str(&format!("  total requests: {}\n", stats.total));
        report.push_str("  status distribution:\n");
        for (status, count) in &stats.status_histogram {
            report.push_str(&format!("    {status}: {count}\n"));
        }
        report.push_str(&format!(
            "  average iterations: {:.2}\n",
            stats.avg_iterations
        ));
        report.push_str("  top correction reasons:\n");
        for (reason, uses) in &stats.top_correction_reasons {
            report.push_str(&format!("    {uses}x {reason}\n"));
        }
        Ok(report)
    }

    /// Textual advice derived from the most frequent correction reasons
    pub fn recommendations(&self) -> CoreResult<Vec<String>> {
        let stats = self.store.stats()?;
        let mut recommendations = Vec::new();
        for (reason, _) in &stats.top_correction_reasons {
            let lowered = reason.to_lowercase();
            let advice = if lowered.contains("county filter") {
                "County filters are frequently misapplied; prefer the JSON address field \
                 (address->>'county') when filtering by county."
            } else if lowered.contains("count(*)") || lowered.contains("aggregation") {
                "Aggregation intents often arrive without a COUNT projection; emit COUNT(*) \
                 whenever the question asks how many."
            } else if lowered.contains("broadened") {
                "Narrow property type filters miss listings; search property_type and \
                 property_subtype with the full synonym set."
            } else if lowered.contains("between") {
                "Bounded price ranges should be encoded with BETWEEN rather than an \
                 inequality pair."
            } else if lowered.contains("display columns") {
                "List queries should always project listing_url, address, and zoning for \
                 display."
            } else {
                continue;
            };
            let advice = advice.to_string();
            if !recommendations.contains(&advice) {
                recommendations.push(advice);
            }
        }
        Ok(recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::Constraints;
    use crate::learning::store::{query_hash, FeedbackRecord};
    use crate::validation::ValidationStatus;
    use chrono::Utc;

    fn seeded_store() -> Arc<LearningStore> {
        let store = Arc::new(LearningStore::open_in_memory().unwrap());
        for (seed, reason) in [
            ("one", "Fixed walton county filter to use address field"),
            ("two", "Fixed walton county filter to use address field"),
            ("three", "Converted price range to BETWEEN clause"),
        ] {
            store
                .store(&FeedbackRecord {
                    query_hash: query_hash(seed, "SELECT 1"),
                    original_sql: "SELECT 1".to_string(),
                    final_sql: "SELECT 2".to_string(),
                    user_utterance: seed.to_string(),
                    constraints: Constraints::default(),
                    correction_reason: reason.to_string(),
                    timestamp: Utc::now(),
                    iteration_count: 1,
                    status: ValidationStatus::Corrected,
                })
                .unwrap();
        }
        store
    }

    #[test]
    fn test_performance_report_contents() {
        let reporter = Reporter::new(seeded_store());
        let report = reporter.performance_report().unwrap();
        assert!(report.contains("total requests: 3"));
        assert!(report.contains("corrected: 3"));
        assert!(report.contains("average iterations: 1.00"));
        assert!(report.contains("2x Fixed walton county filter"));
    }

    #[test]
    fn test_recommendations_are_derived_and_deduplicated() {
        let reporter = Reporter::new(seeded_store());
        let recommendations = reporter.recommendations().unwrap();
        assert!(recommendations
            .iter()
            .any(|r| r.contains("address->>'county'")));
        assert!(recommendations.iter().any(|r| r.contains("BETWEEN")));
        assert_eq!(
            recommendations.len(),
            recommendations
                .iter()
                .collect::<std::collections::HashSet<_>>()
                .len()
        );
    }
}
