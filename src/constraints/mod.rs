//! Typed constraint record extracted from a user utterance
//!
//! This is what the validator checks results against and what the corrector
//! and learning store key on. Collections are ordered so that extraction is
//! structurally deterministic: the same utterance always produces an equal
//! record.

pub mod extractor;

pub use extractor::ConstraintExtractor;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Aggregation intent: the user expects a summary rather than a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregation {
    pub fn sql_function(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

/// Price bounds in base currency units; `hi: None` means unbounded above
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub lo: f64,
    pub hi: Option<f64>,
}

impl PriceRange {
    /// Both bounds finite
    pub fn is_bounded(&self) -> bool {
        self.hi.is_some()
    }
}

/// Size bounds in acres; `hi: None` means unbounded above
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeRange {
    pub lo: f64,
    pub hi: Option<f64>,
}

/// Additional typed filter values (e.g. `status = 'Vacant'`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Flag(bool),
}

/// Structured interpretation of a user utterance
///
/// Owned by the orchestrator for the duration of a request and handed by
/// shared reference to the validator, corrector, and learning store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Constraints {
    /// Canonical lowercase county tokens found in the utterance
    pub counties: BTreeSet<String>,

    pub price_range: Option<PriceRange>,

    pub size_range: Option<SizeRange>,

    /// Canonical property type tokens (closed synonym table)
    pub property_types: BTreeSet<String>,

    pub aggregation: Option<Aggregation>,

    pub order_by: Option<OrderBy>,

    /// Row limit; the SQL builder applies the default when absent
    pub limit: Option<u32>,

    /// Additional typed key/value filters
    pub filters: BTreeMap<String, FilterValue>,

    /// Aggregation is grouped per county rather than a single scalar
    pub group_by_county: bool,

    /// Expected cardinality band inferred from the constraint shape
    pub expected_min_results: u64,
    pub expected_max_results: Option<u64>,
}

impl Constraints {
    /// True when no pattern matched the utterance at all
    pub fn is_empty(&self) -> bool {
        self.counties.is_empty()
            && self.price_range.is_none()
            && self.size_range.is_none()
            && self.property_types.is_empty()
            && self.aggregation.is_none()
            && self.order_by.is_none()
            && self.limit.is_none()
            && self.filters.is_empty()
    }
}
