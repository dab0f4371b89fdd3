//! Result Validator - structural checks of an execution result
//!
//! Pure rules over the result cardinality and the lowercased SQL text.
//! Validation only covers the constraints that were extracted; it is not a
//! general semantic verifier.

use crate::constraints::{Aggregation, Constraints};
use crate::execution::ExecutionResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal status of one processed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Success,
    Corrected,
    Failed,
    MaxIterations,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Corrected => "corrected",
            Self::Failed => "failed",
            Self::MaxIterations => "max_iterations",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "corrected" => Some(Self::Corrected),
            "failed" => Some(Self::Failed),
            "max_iterations" => Some(Self::MaxIterations),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a result failed validation; each case carries what the corrector needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    TooFewRows { got: u64, min: u64 },
    TooManyRows { got: u64, max: u64 },
    ExecutionError { message: String },
    AggregationShape { reason: String },
    CountyFieldMisuse { county: String },
    PriceRangeEncoding { reason: String },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewRows { got, min } => {
                write!(f, "Too few results: got {got}, expected at least {min}")
            }
            Self::TooManyRows { got, max } => {
                write!(f, "Too many results: got {got}, expected at most {max}")
            }
            Self::ExecutionError { message } => write!(f, "Execution error: {message}"),
            Self::AggregationShape { reason } => {
                write!(f, "Aggregation query validation failed: {reason}")
            }
            Self::CountyFieldMisuse { county } => {
                write!(f, "County filter for '{county}' applied to the wrong field")
            }
            Self::PriceRangeEncoding { reason } => {
                write!(f, "Price range filter appears incorrect: {reason}")
            }
        }
    }
}

pub struct ResultValidator;

impl ResultValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check an executed result against the extracted constraints
    pub fn validate(
        &self,
        result: &ExecutionResult,
        constraints: &Constraints,
        sql: &str,
    ) -> (bool, Vec<Issue>) {
        let mut issues = Vec::new();

        for message in &result.errors {
            issues.push(Issue::ExecutionError {
                message: message.clone(),
            });
        }

        if result.row_count < constraints.expected_min_results {
            issues.push(Issue::TooFewRows {
                got: result.row_count,
                min: constraints.expected_min_results,
            });
        }
        if let Some(max) = constraints.expected_max_results {
            if result.row_count > max {
                issues.push(Issue::TooManyRows {
                    got: result.row_count,
                    max,
                });
            }
        }

        // All SQL inspection happens on the lowercased text
        let lowered = sql.to_lowercase();

        if constraints.aggregation == Some(Aggregation::Count) {
            if !lowered.contains("count(") {
                issues.push(Issue::AggregationShape {
                    reason: "missing COUNT".to_string(),
                });
            }
            if result.row_count == 0 {
                issues.push(Issue::AggregationShape {
                    reason: "empty aggregate".to_string(),
                });
            }
        }

        for county in &constraints.counties {
            let mentioned = lowered.contains(county.as_str());
            let via_address = lowered
                .contains(&format!("address->>'county' ilike '%{county}%'"))
                || lowered.contains("address::text");
            let misused = lowered.contains(&format!("property_type ilike '%{county}%'"));
            if mentioned && !via_address && misused {
                issues.push(Issue::CountyFieldMisuse {
                    county: county.clone(),
                });
            }
        }

        if let Some(range) = constraints.price_range {
            if range.is_bounded() && lowered.contains("asking_price") && !lowered.contains("between")
            {
                issues.push(Issue::PriceRangeEncoding {
                    reason: "missing BETWEEN".to_string(),
                });
            }
        }

        (issues.is_empty(), issues)
    }
}

impl Default for ResultValidator {
    fn default() -> Self {
        Self::new()
    }
}
