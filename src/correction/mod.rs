//! Corrector - staged SQL repair driven by validation issues
//!
//! Stages run in a fixed order; each may leave the SQL untouched. A pass
//! that changes nothing returns the original statement with a sentinel
//! reason, which the orchestrator reads as failure to converge.

use crate::constraints::{Aggregation, Constraints};
use crate::learning::LearningStore;
use crate::schema_map::SchemaMap;
use crate::sql_builder::{fmt_amount, SqlBuilder};
use crate::validation::Issue;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reason reported when no stage changed the SQL
pub const NO_CORRECTIONS_REASON: &str = "No specific corrections applied";

/// A corrected statement and the human-readable reasons behind it
#[derive(Debug, Clone)]
pub struct Correction {
    pub sql: String,
    pub reason: String,
}

pub struct SqlCorrector {
    schema: Arc<SchemaMap>,
    builder: SqlBuilder,
    learning: Arc<LearningStore>,
}

impl SqlCorrector {
    pub fn new(schema: Arc<SchemaMap>, builder: SqlBuilder, learning: Arc<LearningStore>) -> Self {
        Self {
            schema,
            builder,
            learning,
        }
    }

    /// Synthesize a corrected SQL for the given issues
    pub fn correct(
        &self,
        sql: &str,
        constraints: &Constraints,
        issues: &[Issue],
        _user_utterance: &str,
    ) -> Correction {
        let mut corrected = sql.to_string();
        let mut applied: Vec<String> = Vec::new();

        for issue in issues {
            if let Issue::CountyFieldMisuse { county } = issue {
                self.remap_county(&mut corrected, county, &mut applied);
            }
        }

        if issues
            .iter()
            .any(|i| matches!(i, Issue::AggregationShape { .. }))
        {
            self.fix_aggregation(&mut corrected, constraints, &mut applied);
        }

        if issues.iter().any(|i| matches!(i, Issue::TooFewRows { .. })) {
            self.broaden_property_types(&mut corrected, constraints, &mut applied);
        }

        if issues
            .iter()
            .any(|i| matches!(i, Issue::PriceRangeEncoding { .. }))
        {
            self.fix_price_encoding(&mut corrected, constraints, &mut applied);
        }

        self.ensure_display_columns(&mut corrected, &mut applied);

        self.apply_learned_patterns(&mut corrected, constraints, &mut applied);

        let reason = if applied.is_empty() {
            NO_CORRECTIONS_REASON.to_string()
        } else {
            applied.join("; ")
        };
        debug!(changed = corrected != sql, "correction pass complete");
        Correction {
            sql: corrected,
            reason,
        }
    }

    /// Stage 1: move county filters off property_type onto the JSON address
    fn remap_county(&self, sql: &mut String, county: &str, applied: &mut Vec<String>) {
        let Some(pattern) = narrow_pattern(county) else {
            return;
        };
        if !pattern.is_match(sql) {
            return;
        }
        let replacement = format!("address->>'county' ILIKE '%{county}%'");
        *sql = pattern.replace_all(sql, replacement.as_str()).into_owned();
        applied.push(format!("Fixed {county} county filter to use address field"));
    }

    /// Stage 2: repair the aggregation shape for COUNT intents
    fn fix_aggregation(
        &self,
        sql: &mut String,
        constraints: &Constraints,
        applied: &mut Vec<String>,
    ) {
        if constraints.aggregation != Some(Aggregation::Count) {
            return;
        }

        // A county-grouped count has one canonical shape; rebuild it rather
        // than patching the projection piecemeal.
        if constraints.group_by_county {
            let rebuilt = self.builder.build(constraints);
            if rebuilt != *sql {
                *sql = rebuilt;
                applied.push("Rebuilt county aggregation query".to_string());
            }
            return;
        }

        if !sql.to_lowercase().contains("count(") {
            if let Ok(select) = Regex::new(r"(?i)\bSELECT\s+") {
                let patched = select.replace(sql, "SELECT COUNT(*), ").into_owned();
                if patched != *sql {
                    *sql = patched;
                    applied.push("Added COUNT(*) to aggregation query".to_string());
                }
            }
        }

        let lowered = sql.to_lowercase();
        if lowered.contains("group by") && lowered.contains("asking_price") {
            if let Ok(grouped_price) = Regex::new(r"(?i),\s*asking_price\b") {
                let patched = grouped_price.replace_all(sql, "").into_owned();
                if patched != *sql {
                    *sql = patched;
                    applied.push("Removed asking_price from GROUP BY clause".to_string());
                }
            }
        }
    }

    /// Stage 3: widen narrow type filters to the full synonym set
    fn broaden_property_types(
        &self,
        sql: &mut String,
        constraints: &Constraints,
        applied: &mut Vec<String>,
    ) {
        for canonical in &constraints.property_types {
            let Some(broadened) = self.schema.property_type_predicate(canonical) else {
                continue;
            };
            if sql.contains(&broadened) {
                continue;
            }
            let mut surfaces = vec![canonical.replace('_', " "), canonical.clone()];
            if let Some(synonyms) = self.schema.synonyms(canonical) {
                surfaces.extend(synonyms.iter().cloned());
            }
            for surface in surfaces {
                let Some(pattern) = narrow_pattern(&surface) else {
                    continue;
                };
                if pattern.is_match(sql) {
                    *sql = pattern.replace(sql, broadened.as_str()).into_owned();
                    applied.push(format!("Broadened {canonical} search to include subtypes"));
                    break;
                }
            }
        }
    }

    /// Stage 4: rewrite an inequality pair as BETWEEN
    fn fix_price_encoding(
        &self,
        sql: &mut String,
        constraints: &Constraints,
        applied: &mut Vec<String>,
    ) {
        let Some(range) = constraints.price_range else {
            return;
        };
        let Some(hi) = range.hi else {
            return;
        };
        let Ok(pair) = Regex::new(r"(?i)asking_price\s*>=?\s*[\d.]+\s+AND\s+asking_price\s*<=?\s*[\d.]+")
        else {
            return;
        };
        if !pair.is_match(sql) {
            return;
        }
        let clause = format!(
            "asking_price BETWEEN {} AND {}",
            fmt_amount(range.lo),
            fmt_amount(hi)
        );
        *sql = pair.replace(sql, clause.as_str()).into_owned();
        applied.push("Converted price range to BETWEEN clause".to_string());
    }

    /// Stage 5: list queries must project the display columns callers need
    fn ensure_display_columns(&self, sql: &mut String, applied: &mut Vec<String>) {
        let upper = sql.to_uppercase();
        if ["GROUP BY", "COUNT(", "SUM(", "AVG(", "MAX(", "MIN("]
            .iter()
            .any(|k| upper.contains(k))
        {
            return;
        }
        let Ok(select_from) = Regex::new(r"(?is)SELECT\s+(.+?)\s+FROM") else {
            return;
        };
        let Some(caps) = select_from.captures(sql) else {
            return;
        };
        let current = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let current_lower = current.to_lowercase();
        let missing: Vec<&str> = ["listing_url", "address", "zoning"]
            .into_iter()
            .filter(|column| !current_lower.contains(column))
            .collect();
        if missing.is_empty() {
            return;
        }
        let replacement = format!("{}, {}", current, missing.join(", "));
        *sql = sql.replacen(&current, &replacement, 1);
        applied.push(format!(
            "Added essential display columns: {}",
            missing.join(", ")
        ));
    }

    /// Stage 6: re-apply remappings that fixed similar queries before
    fn apply_learned_patterns(
        &self,
        sql: &mut String,
        constraints: &Constraints,
        applied: &mut Vec<String>,
    ) {
        let records = match self.learning.similar(constraints, 2) {
            Ok(records) => records,
            Err(err) => {
                warn!("failed to fetch prior corrections: {err}");
                return;
            }
        };
        for record in records {
            if !record
                .correction_reason
                .to_lowercase()
                .contains("county filter")
            {
                continue;
            }
            for county in &constraints.counties {
                let Some(pattern) = narrow_pattern(county) else {
                    continue;
                };
                if pattern.is_match(sql) {
                    let replacement = format!("address->>'county' ILIKE '%{county}%'");
                    *sql = pattern.replace_all(sql, replacement.as_str()).into_owned();
                    applied.push("Applied learned county correction pattern".to_string());
                    return;
                }
            }
        }
    }
}

/// Matcher for the narrow `property_type ILIKE '%token%'` form
fn narrow_pattern(token: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"(?i)property_type\s+ILIKE\s+'%{}%'",
        regex::escape(token)
    ))
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintExtractor, OrderBy, OrderDirection, PriceRange};
    use std::collections::BTreeSet;

    fn corrector() -> SqlCorrector {
        let schema = Arc::new(SchemaMap::default());
        let builder = SqlBuilder::new(
            schema.clone(),
            50,
            OrderBy {
                column: "asking_price".to_string(),
                direction: OrderDirection::Asc,
            },
        );
        let learning = Arc::new(LearningStore::open_in_memory().unwrap());
        SqlCorrector::new(schema, builder, learning)
    }

    fn extract(utterance: &str) -> Constraints {
        ConstraintExtractor::new(Arc::new(SchemaMap::default())).extract(utterance)
    }

    #[test]
    fn test_county_remap() {
        let corrector = corrector();
        let mut constraints = Constraints::default();
        constraints.counties = BTreeSet::from(["walton".to_string()]);
        let sql = "SELECT id, name, listing_url, address, zoning FROM \"Georgia Properties\" \
                   WHERE property_type ILIKE '%walton%'";
        let issues = vec![Issue::CountyFieldMisuse {
            county: "walton".to_string(),
        }];
        let correction = corrector.correct(sql, &constraints, &issues, "");
        assert!(correction
            .sql
            .contains("address->>'county' ILIKE '%walton%'"));
        assert!(!correction.sql.contains("property_type ILIKE '%walton%'"));
        assert!(correction.reason.contains("walton county filter"));
    }

    #[test]
    fn test_county_count_rebuild() {
        let corrector = corrector();
        let constraints = extract("how many counties have properties");
        let sql = "SELECT address->>'county' FROM \"Georgia Properties\" GROUP BY address->>'county'";
        let issues = vec![Issue::AggregationShape {
            reason: "missing COUNT".to_string(),
        }];
        let correction = corrector.correct(sql, &constraints, &issues, "");
        assert!(correction.sql.contains("COUNT(*) AS property_count"));
        assert!(correction.sql.contains("GROUP BY address->>'county'"));
        assert!(correction.sql.contains("ORDER BY property_count DESC"));
    }

    #[test]
    fn test_scalar_count_insertion() {
        let corrector = corrector();
        let constraints = extract("count all listings");
        let sql = "SELECT id FROM \"Georgia Properties\"";
        let issues = vec![Issue::AggregationShape {
            reason: "missing COUNT".to_string(),
        }];
        let correction = corrector.correct(sql, &constraints, &issues, "");
        assert!(correction.sql.starts_with("SELECT COUNT(*), id"));
    }

    #[test]
    fn test_broadening_on_too_few_rows() {
        let corrector = corrector();
        let constraints = extract("gas stations in walton county");
        let sql = "SELECT id, name, listing_url, address, zoning FROM \"Georgia Properties\" \
                   WHERE property_type ILIKE '%gas station%'";
        let issues = vec![Issue::TooFewRows { got: 0, min: 1 }];
        let correction = corrector.correct(sql, &constraints, &issues, "");
        assert!(correction.sql.contains("property_subtype ILIKE '%station%'"));
        assert!(correction.reason.contains("Broadened gas_station search"));
    }

    #[test]
    fn test_between_rewrite() {
        let corrector = corrector();
        let mut constraints = Constraints::default();
        constraints.price_range = Some(PriceRange {
            lo: 200_000.0,
            hi: Some(800_000.0),
        });
        let sql = "SELECT id, name, listing_url, address, zoning FROM \"Georgia Properties\" \
                   WHERE asking_price > 200000 AND asking_price < 800000";
        let issues = vec![Issue::PriceRangeEncoding {
            reason: "missing BETWEEN".to_string(),
        }];
        let correction = corrector.correct(sql, &constraints, &issues, "");
        assert!(correction
            .sql
            .contains("asking_price BETWEEN 200000 AND 800000"));
        assert!(!correction.sql.contains("asking_price >"));
    }

    #[test]
    fn test_display_columns_appended() {
        let corrector = corrector();
        let constraints = Constraints::default();
        let sql = "SELECT id, name FROM \"Georgia Properties\"";
        let correction = corrector.correct(sql, &constraints, &[], "");
        assert!(correction
            .sql
            .starts_with("SELECT id, name, listing_url, address, zoning FROM"));
    }

    #[test]
    fn test_aggregations_keep_their_projection() {
        let corrector = corrector();
        let constraints = Constraints::default();
        let sql = "SELECT COUNT(*) FROM \"Georgia Properties\"";
        let correction = corrector.correct(sql, &constraints, &[], "");
        assert_eq!(correction.sql, sql);
        assert_eq!(correction.reason, NO_CORRECTIONS_REASON);
    }

    #[test]
    fn test_no_change_reports_sentinel_reason() {
        let corrector = corrector();
        let correction = corrector.correct("SELEC * FORM x", &Constraints::default(), &[], "");
        assert_eq!(correction.sql, "SELEC * FORM x");
        assert_eq!(correction.reason, NO_CORRECTIONS_REASON);
    }

    #[test]
    fn test_learned_pattern_applies_county_fix() {
        use crate::learning::{query_hash, FeedbackRecord};
        use crate::validation::ValidationStatus;
        use chrono::Utc;

        let schema = Arc::new(SchemaMap::default());
        let builder = SqlBuilder::new(
            schema.clone(),
            50,
            OrderBy {
                column: "asking_price".to_string(),
                direction: OrderDirection::Asc,
            },
        );
        let learning = Arc::new(LearningStore::open_in_memory().unwrap());
        let constraints = extract("properties in walton county");
        learning
            .store(&FeedbackRecord {
                query_hash: query_hash("earlier", "SELECT 1"),
                original_sql: "SELECT 1".to_string(),
                final_sql: "SELECT 2".to_string(),
                user_utterance: "earlier".to_string(),
                constraints: constraints.clone(),
                correction_reason: "Fixed walton county filter to use address field".to_string(),
                timestamp: Utc::now(),
                iteration_count: 1,
                status: ValidationStatus::Corrected,
            })
            .unwrap();
        let corrector = SqlCorrector::new(schema, builder, learning);

        // No CountyFieldMisuse issue this time; only the learned stage fires
        let sql = "SELECT id, name, listing_url, address, zoning FROM \"Georgia Properties\" \
                   WHERE property_type ILIKE '%walton%'";
        let correction = corrector.correct(sql, &constraints, &[], "");
        assert!(correction
            .sql
            .contains("address->>'county' ILIKE '%walton%'"));
        assert!(correction
            .reason
            .contains("Applied learned county correction pattern"));
    }
}
