//! SQL Builder - direct SELECT emission from a constraint record
//!
//! The baseline candidate path used when no external generator is injected.
//! A pure function of [`Constraints`]: clause-by-clause assembly over the
//! fixed property table.

use crate::constraints::{Aggregation, Constraints, FilterValue, OrderBy};
use crate::error::CoreResult;
use crate::schema_map::SchemaMap;
use std::sync::Arc;

/// Physical table targeted by every emitted statement
pub const PROPERTY_TABLE: &str = "\"Georgia Properties\"";

/// Minimum projection for list queries; callers rely on these for display
pub const BASE_PROJECTION: &[&str] = &[
    "id",
    "name",
    "property_type",
    "property_subtype",
    "asking_price",
    "listing_url",
    "address",
    "zoning",
];

/// Format a bound without a trailing fraction when it is integral
pub(crate) fn fmt_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[derive(Clone)]
pub struct SqlBuilder {
    schema: Arc<SchemaMap>,
    default_limit: u32,
    default_order: OrderBy,
}

impl SqlBuilder {
    pub fn new(schema: Arc<SchemaMap>, default_limit: u32, default_order: OrderBy) -> Self {
        Self {
            schema,
            default_limit,
            default_order,
        }
    }

    /// Emit a SELECT implementing the constraint record
    pub fn build(&self, constraints: &Constraints) -> String {
        if let Some(aggregation) = constraints.aggregation {
            return self.build_aggregate(aggregation, constraints);
        }

        let mut columns: Vec<&str> = BASE_PROJECTION.to_vec();
        if constraints.size_range.is_some() {
            columns.push(self.size_column());
        }

        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), PROPERTY_TABLE);
        let conditions = self.conditions(constraints);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let order = constraints
            .order_by
            .clone()
            .unwrap_or_else(|| self.default_order.clone());
        sql.push_str(&format!(
            " ORDER BY {} {}",
            order.column,
            order.direction.as_sql()
        ));
        sql.push_str(&format!(
            " LIMIT {}",
            constraints.limit.unwrap_or(self.default_limit)
        ));
        sql
    }

    fn build_aggregate(&self, aggregation: Aggregation, constraints: &Constraints) -> String {
        let mut conditions = self.conditions(constraints);

        if aggregation == Aggregation::Count && constraints.group_by_county {
            conditions.push("address->>'county' IS NOT NULL".to_string());
            return format!(
                "SELECT address->>'county' AS county, COUNT(*) AS property_count FROM {} WHERE {} \
                 GROUP BY address->>'county' ORDER BY property_count DESC",
                PROPERTY_TABLE,
                conditions.join(" AND ")
            );
        }

        let projection = match aggregation {
            Aggregation::Count => "COUNT(*) AS property_count".to_string(),
            other => format!(
                "{}(asking_price) AS {}_asking_price",
                other.sql_function(),
                other.sql_function().to_lowercase()
            ),
        };
        let mut sql = format!("SELECT {projection} FROM {PROPERTY_TABLE}");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql
    }

    /// Size constraints are denominated in acres
    fn size_column(&self) -> &'static str {
        self.schema.size_column("acres").unwrap_or("size_acres")
    }

    fn conditions(&self, constraints: &Constraints) -> Vec<String> {
        let mut conditions = Vec::new();

        let county_predicates: Vec<String> = constraints
            .counties
            .iter()
            .filter_map(|county| self.schema.county_predicate(county))
            .collect();
        match county_predicates.len() {
            0 => {}
            1 => conditions.push(county_predicates.into_iter().next().unwrap()),
            _ => conditions.push(format!("({})", county_predicates.join(" OR "))),
        }

        if let Some(range) = constraints.size_range {
            let column = self.size_column();
            match range.hi {
                Some(hi) => conditions.push(format!(
                    "{column} BETWEEN {} AND {}",
                    fmt_amount(range.lo),
                    fmt_amount(hi)
                )),
                None => conditions.push(format!("{column} >= {}", fmt_amount(range.lo))),
            }
        }

        if let Some(range) = constraints.price_range {
            match range.hi {
                Some(hi) => conditions.push(format!(
                    "asking_price BETWEEN {} AND {}",
                    fmt_amount(range.lo),
                    fmt_amount(hi)
                )),
                None => conditions.push(format!("asking_price >= {}", fmt_amount(range.lo))),
            }
        }

        let type_predicates: Vec<String> = constraints
            .property_types
            .iter()
            .filter_map(|canonical| self.schema.property_type_predicate(canonical))
            .collect();
        match type_predicates.len() {
            0 => {}
            1 => conditions.push(type_predicates.into_iter().next().unwrap()),
            _ => conditions.push(format!("({})", type_predicates.join(" OR "))),
        }

        for (key, value) in &constraints.filters {
            match (key.as_str(), value) {
                ("status", FilterValue::Text(status)) => {
                    conditions.push(format!("status = '{status}'"));
                }
                ("has_traffic_data", FilterValue::Flag(true)) => {
                    conditions.push("traffic_count_aadt IS NOT NULL".to_string());
                }
                _ => {}
            }
        }

        conditions
    }
}

/// Capability interface over the upstream candidate generator
///
/// The engine does not require candidates to be correct, only parsable by
/// the property store; the loop repairs the rest.
pub trait CandidateSource: Send + Sync {
    fn candidate(&self, user_utterance: &str) -> CoreResult<String>;
}

/// Baseline candidate source: extract constraints, build directly
pub struct DirectCandidateSource {
    extractor: crate::constraints::ConstraintExtractor,
    builder: SqlBuilder,
}

impl DirectCandidateSource {
    pub fn new(schema: Arc<SchemaMap>, default_limit: u32, default_order: OrderBy) -> Self {
        Self {
            extractor: crate::constraints::ConstraintExtractor::new(schema.clone()),
            builder: SqlBuilder::new(schema, default_limit, default_order),
        }
    }
}

impl CandidateSource for DirectCandidateSource {
    fn candidate(&self, user_utterance: &str) -> CoreResult<String> {
        Ok(self.builder.build(&self.extractor.extract(user_utterance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintExtractor, OrderDirection};

    fn builder() -> SqlBuilder {
        SqlBuilder::new(
            Arc::new(SchemaMap::default()),
            50,
            OrderBy {
                column: "asking_price".to_string(),
                direction: OrderDirection::Asc,
            },
        )
    }

    fn extract(utterance: &str) -> Constraints {
        ConstraintExtractor::new(Arc::new(SchemaMap::default())).extract(utterance)
    }

    #[test]
    fn test_empty_constraints_emit_defaults() {
        let sql = builder().build(&Constraints::default());
        assert!(sql.starts_with("SELECT id, name, property_type"));
        assert!(!sql.contains("WHERE"));
        assert!(sql.ends_with("ORDER BY asking_price ASC LIMIT 50"));
    }

    #[test]
    fn test_county_type_and_price_conditions() {
        let sql = builder().build(&extract("gas stations in walton county under $500k"));
        assert!(sql.contains("address->>'county' ILIKE '%walton%'"));
        assert!(sql.contains("property_subtype ILIKE '%station%'"));
        assert!(sql.contains("asking_price BETWEEN 0 AND 500000"));
        assert!(sql.contains("LIMIT 50"));
    }

    #[test]
    fn test_unbounded_price_uses_inequality() {
        let sql = builder().build(&extract("retail over $1m"));
        assert!(sql.contains("asking_price >= 1000000"));
        assert!(!sql.contains("asking_price BETWEEN"));
    }

    #[test]
    fn test_size_constraint_adds_size_column() {
        let sql = builder().build(&extract("3 to 10 acres in fulton"));
        assert!(sql.contains("size_acres BETWEEN 3 AND 10"));
        let projection = sql.split(" FROM ").next().unwrap();
        assert!(projection.contains("size_acres"));
    }

    #[test]
    fn test_county_count_aggregation_shape() {
        let sql = builder().build(&extract("how many counties have properties"));
        assert_eq!(
            sql,
            "SELECT address->>'county' AS county, COUNT(*) AS property_count \
             FROM \"Georgia Properties\" WHERE address->>'county' IS NOT NULL \
             GROUP BY address->>'county' ORDER BY property_count DESC"
        );
    }

    #[test]
    fn test_scalar_aggregations_have_no_limit() {
        let count = builder().build(&extract("count vacant properties"));
        assert!(count.starts_with("SELECT COUNT(*) AS property_count"));
        assert!(!count.contains("LIMIT"));

        let avg = builder().build(&extract("average price in cobb"));
        assert!(avg.contains("AVG(asking_price) AS avg_asking_price"));
        assert!(avg.contains("address->>'county' ILIKE '%cobb%'"));
        assert!(!avg.contains("LIMIT"));
    }

    #[test]
    fn test_explicit_limit_and_order() {
        let sql = builder().build(&extract("cheapest 10 properties"));
        assert!(sql.ends_with("ORDER BY asking_price ASC LIMIT 10"));
    }

    #[test]
    fn test_status_filter() {
        let sql = builder().build(&extract("vacant properties in dekalb"));
        assert!(sql.contains("status = 'Vacant'"));
    }

    #[test]
    fn test_direct_candidate_source() {
        let source = DirectCandidateSource::new(
            Arc::new(SchemaMap::default()),
            50,
            OrderBy {
                column: "asking_price".to_string(),
                direction: OrderDirection::Asc,
            },
        );
        let sql = source.candidate("retail in gwinnett").unwrap();
        assert!(sql.contains("address->>'county' ILIKE '%gwinnett%'"));
    }
}
