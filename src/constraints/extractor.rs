//! Constraint Extractor - deterministic scanners over a user utterance
//!
//! A pipeline of pattern scanners, each filling one field of the
//! [`Constraints`] record. The extractor never fails: a pattern that does
//! not match leaves its field absent, and a pattern that partially matches
//! logs at debug and is dropped.

use crate::constraints::{
    Aggregation, Constraints, FilterValue, OrderBy, OrderDirection, PriceRange, SizeRange,
};
use crate::schema_map::SchemaMap;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, LazyLock};
use tracing::debug;

// Price scanners. A match must carry a dollar sign or a magnitude suffix so
// that "over 5 acres" stays a size constraint.
static PRICE_BETWEEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bbetween\s*(\$?)(\d[\d,]*(?:\.\d+)?)\s*([km])?\s*and\s*(\$?)(\d[\d,]*(?:\.\d+)?)\s*([km])?").unwrap()
});
static PRICE_UNDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bunder\s*(\$?)(\d[\d,]*(?:\.\d+)?)\s*([km])?").unwrap());
static PRICE_OVER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bover\s*(\$?)(\d[\d,]*(?:\.\d+)?)\s*([km])?").unwrap());

// Size scanners (acres).
static SIZE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(?:to|and|-)\s*(\d+(?:\.\d+)?)\s*acres?\b").unwrap()
});
static SIZE_OVER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bover\s*(\d+(?:\.\d+)?)\s*acres?\b").unwrap());
static SIZE_EXACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*acres?\b").unwrap());

// Aggregation keywords. Word-boundary anchored so that "walton county" and
// "counties" never read as a COUNT intent.
static AGG_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:how many|number of|count)\b").unwrap());
static AGG_AVG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:average|avg)\b").unwrap());
static AGG_SUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:sum|total)\b").unwrap());
static AGG_MAX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:maximum|max)\b").unwrap());
static AGG_MIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:minimum|min)\b").unwrap());

static COUNTIES_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bcounties\b").unwrap());

// Ordering keywords.
static ORDER_CHEAPEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:cheapest|lowest price)\b").unwrap());
static ORDER_EXPENSIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:expensive|highest)\b").unwrap());
static ORDER_LARGEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:largest|biggest)\b").unwrap());
static ORDER_SMALLEST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bsmallest\b").unwrap());

static LIMIT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bfirst\s+(\d+)\b",
        r"\btop\s+(\d+)\b",
        r"\b(\d+)\s+properties\b",
        r"\blimit\s+(\d+)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static FILTER_VACANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:vacant|empty)\b").unwrap());
static FILTER_AVAILABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bavailable\b").unwrap());
static FILTER_TRAFFIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\btraffic\b").unwrap());

/// Extracts a [`Constraints`] record from free text
///
/// Deterministic and side-effect free; re-running on the same utterance
/// yields an equal record.
pub struct ConstraintExtractor {
    schema: Arc<SchemaMap>,
    /// Canonical type paired with word-boundary matchers for each surface form
    type_matchers: Vec<(String, Vec<Regex>)>,
}

impl ConstraintExtractor {
    pub fn new(schema: Arc<SchemaMap>) -> Self {
        let mut type_matchers = Vec::new();
        let canonicals: Vec<String> = schema.property_types().map(String::from).collect();
        for canonical in canonicals {
            let mut surfaces = vec![canonical.replace('_', " ")];
            if let Some(synonyms) = schema.synonyms(&canonical) {
                surfaces.extend(synonyms.iter().cloned());
            }
            let matchers = surfaces
                .iter()
                .filter_map(|s| Regex::new(&format!(r"\b{}s?\b", regex::escape(s))).ok())
                .collect();
            type_matchers.push((canonical, matchers));
        }
        Self {
            schema,
            type_matchers,
        }
    }

    pub fn extract(&self, utterance: &str) -> Constraints {
        let lower = utterance.to_lowercase();

        let counties = self.extract_counties(&lower);
        let property_types = self.extract_property_types(&lower);
        let price_range = extract_price(&lower);
        let size_range = extract_size(&lower);
        let aggregation = extract_aggregation(&lower);
        let order_by = extract_order(&lower);
        let limit = extract_limit(&lower);
        let filters = extract_filters(&lower);
        let group_by_county = aggregation.is_some() && COUNTIES_WORD.is_match(&lower);
        let (expected_min_results, expected_max_results) =
            estimate_band(&counties, &property_types, aggregation, group_by_county);

        debug!(
            counties = counties.len(),
            types = property_types.len(),
            aggregation = aggregation.is_some(),
            "extracted constraints"
        );

        Constraints {
            counties,
            price_range,
            size_range,
            property_types,
            aggregation,
            order_by,
            limit,
            filters,
            group_by_county,
            expected_min_results,
            expected_max_results,
        }
    }

    fn extract_counties(&self, lower: &str) -> BTreeSet<String> {
        let tokens: HashSet<&str> = lower
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        self.schema
            .counties()
            .filter(|county| {
                if county.contains(' ') {
                    lower.contains(*county)
                } else {
                    tokens.contains(county)
                }
            })
            .map(String::from)
            .collect()
    }

    fn extract_property_types(&self, lower: &str) -> BTreeSet<String> {
        self.type_matchers
            .iter()
            .filter(|(_, matchers)| matchers.iter().any(|m| m.is_match(lower)))
            .map(|(canonical, _)| canonical.clone())
            .collect()
    }
}

fn parse_amount(raw: &str, suffix: Option<&str>) -> Option<f64> {
    let cleaned = raw.replace(',', "");
    let value: f64 = match cleaned.parse() {
        Ok(v) => v,
        Err(_) => {
            debug!(raw, "numeric token did not parse; dropping constraint");
            return None;
        }
    };
    let scale = match suffix {
        Some("k") => 1_000.0,
        Some("m") => 1_000_000.0,
        _ => 1.0,
    };
    Some(value * scale)
}

fn extract_price(lower: &str) -> Option<PriceRange> {
    if let Some(caps) = PRICE_BETWEEN.captures(lower) {
        let dollars = !caps[1].is_empty() || !caps[4].is_empty();
        let suffix_lo = caps.get(3).map(|m| m.as_str());
        let suffix_hi = caps.get(6).map(|m| m.as_str());
        if dollars || suffix_lo.is_some() || suffix_hi.is_some() {
            let a = parse_amount(&caps[2], suffix_lo)?;
            let b = parse_amount(&caps[5], suffix_hi)?;
            return Some(PriceRange {
                lo: a.min(b),
                hi: Some(a.max(b)),
            });
        }
    }
    if let Some(caps) = PRICE_UNDER.captures(lower) {
        let suffix = caps.get(3).map(|m| m.as_str());
        if !caps[1].is_empty() || suffix.is_some() {
            let hi = parse_amount(&caps[2], suffix)?;
            return Some(PriceRange { lo: 0.0, hi: Some(hi) });
        }
    }
    if let Some(caps) = PRICE_OVER.captures(lower) {
        let suffix = caps.get(3).map(|m| m.as_str());
        if !caps[1].is_empty() || suffix.is_some() {
            let lo = parse_amount(&caps[2], suffix)?;
            return Some(PriceRange { lo, hi: None });
        }
    }
    None
}

fn extract_size(lower: &str) -> Option<SizeRange> {
    if let Some(caps) = SIZE_RANGE.captures(lower) {
        let a = parse_amount(&caps[1], None)?;
        let b = parse_amount(&caps[2], None)?;
        return Some(SizeRange {
            lo: a.min(b),
            hi: Some(a.max(b)),
        });
    }
    if let Some(caps) = SIZE_OVER.captures(lower) {
        let lo = parse_amount(&caps[1], None)?;
        return Some(SizeRange { lo, hi: None });
    }
    if let Some(caps) = SIZE_EXACT.captures(lower) {
        let exact = parse_amount(&caps[1], None)?;
        return Some(SizeRange {
            lo: exact,
            hi: Some(exact),
        });
    }
    None
}

fn extract_aggregation(lower: &str) -> Option<Aggregation> {
    if AGG_COUNT.is_match(lower) {
        Some(Aggregation::Count)
    } else if AGG_AVG.is_match(lower) {
        Some(Aggregation::Avg)
    } else if AGG_SUM.is_match(lower) {
        Some(Aggregation::Sum)
    } else if AGG_MAX.is_match(lower) {
        Some(Aggregation::Max)
    } else if AGG_MIN.is_match(lower) {
        Some(Aggregation::Min)
    } else {
        None
    }
}

fn extract_order(lower: &str) -> Option<OrderBy> {
    let (column, direction) = if ORDER_CHEAPEST.is_match(lower) {
        ("asking_price", OrderDirection::Asc)
    } else if ORDER_EXPENSIVE.is_match(lower) {
        ("asking_price", OrderDirection::Desc)
    } else if ORDER_LARGEST.is_match(lower) {
        ("size_acres", OrderDirection::Desc)
    } else if ORDER_SMALLEST.is_match(lower) {
        ("size_acres", OrderDirection::Asc)
    } else {
        return None;
    };
    Some(OrderBy {
        column: column.to_string(),
        direction,
    })
}

fn extract_limit(lower: &str) -> Option<u32> {
    for pattern in LIMIT_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(lower) {
            match caps[1].parse::<u32>() {
                Ok(n) if n > 0 => return Some(n),
                _ => debug!(token = &caps[1], "limit token did not parse; ignoring"),
            }
        }
    }
    None
}

fn extract_filters(lower: &str) -> BTreeMap<String, FilterValue> {
    let mut filters = BTreeMap::new();
    if FILTER_VACANT.is_match(lower) {
        filters.insert("status".to_string(), FilterValue::Text("Vacant".to_string()));
    }
    if FILTER_AVAILABLE.is_match(lower) {
        filters.insert(
            "status".to_string(),
            FilterValue::Text("Available".to_string()),
        );
    }
    if FILTER_TRAFFIC.is_match(lower) {
        filters.insert("has_traffic_data".to_string(), FilterValue::Flag(true));
    }
    filters
}

fn estimate_band(
    counties: &BTreeSet<String>,
    property_types: &BTreeSet<String>,
    aggregation: Option<Aggregation>,
    group_by_county: bool,
) -> (u64, Option<u64>) {
    if aggregation.is_some() {
        if group_by_county {
            return (1, Some(20));
        }
        return (1, Some(1));
    }
    if !counties.is_empty() && !property_types.is_empty() {
        (1, Some(100))
    } else if !counties.is_empty() || !property_types.is_empty() {
        (5, Some(500))
    } else {
        (10, Some(1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ConstraintExtractor {
        ConstraintExtractor::new(Arc::new(SchemaMap::default()))
    }

    #[test]
    fn test_county_and_type_with_price_cap() {
        let constraints = extractor().extract("gas stations in walton county under $500k");
        assert!(constraints.counties.contains("walton"));
        assert!(constraints.property_types.contains("gas_station"));
        assert_eq!(
            constraints.price_range,
            Some(PriceRange {
                lo: 0.0,
                hi: Some(500_000.0)
            })
        );
        // "county" must not read as a COUNT intent
        assert_eq!(constraints.aggregation, None);
        assert_eq!(constraints.expected_min_results, 1);
        assert_eq!(constraints.expected_max_results, Some(100));
    }

    #[test]
    fn test_price_between_with_suffixes() {
        let constraints = extractor().extract("retail between $800k and $200k");
        assert_eq!(
            constraints.price_range,
            Some(PriceRange {
                lo: 200_000.0,
                hi: Some(800_000.0)
            })
        );
        assert!(constraints.property_types.contains("retail"));
        assert_eq!(constraints.expected_max_results, Some(500));
    }

    #[test]
    fn test_price_over_is_unbounded_above() {
        let constraints = extractor().extract("commercial over $1m");
        assert_eq!(
            constraints.price_range,
            Some(PriceRange { lo: 1_000_000.0, hi: None })
        );
    }

    #[test]
    fn test_over_acres_is_a_size_not_a_price() {
        let constraints = extractor().extract("vacant land over 5 acres");
        assert_eq!(constraints.price_range, None);
        assert_eq!(constraints.size_range, Some(SizeRange { lo: 5.0, hi: None }));
    }

    #[test]
    fn test_size_range_and_exact() {
        let range = extractor().extract("3 to 10 acres in fulton");
        assert_eq!(
            range.size_range,
            Some(SizeRange {
                lo: 3.0,
                hi: Some(10.0)
            })
        );
        assert!(range.counties.contains("fulton"));

        let exact = extractor().extract("2.5 acres in cobb");
        assert_eq!(
            exact.size_range,
            Some(SizeRange {
                lo: 2.5,
                hi: Some(2.5)
            })
        );
    }

    #[test]
    fn test_county_aggregation_band() {
        let constraints = extractor().extract("how many counties have properties");
        assert_eq!(constraints.aggregation, Some(Aggregation::Count));
        assert!(constraints.group_by_county);
        assert_eq!(constraints.expected_min_results, 1);
        assert_eq!(constraints.expected_max_results, Some(20));
    }

    #[test]
    fn test_scalar_aggregation_band() {
        let constraints = extractor().extract("average price of commercial properties");
        assert_eq!(constraints.aggregation, Some(Aggregation::Avg));
        assert!(!constraints.group_by_county);
        assert_eq!(constraints.expected_max_results, Some(1));
    }

    #[test]
    fn test_ordering_and_limit() {
        let constraints = extractor().extract("cheapest 10 properties");
        assert_eq!(
            constraints.order_by,
            Some(OrderBy {
                column: "asking_price".to_string(),
                direction: OrderDirection::Asc,
            })
        );
        assert_eq!(constraints.limit, Some(10));
        assert_eq!(constraints.expected_min_results, 10);
        assert_eq!(constraints.expected_max_results, Some(1000));

        let largest = extractor().extract("top 5 largest properties");
        assert_eq!(
            largest.order_by,
            Some(OrderBy {
                column: "size_acres".to_string(),
                direction: OrderDirection::Desc,
            })
        );
        assert_eq!(largest.limit, Some(5));
    }

    #[test]
    fn test_status_filters() {
        let vacant = extractor().extract("vacant properties in dekalb");
        assert_eq!(
            vacant.filters.get("status"),
            Some(&FilterValue::Text("Vacant".to_string()))
        );
        // "vacant" is also a canonical property type
        assert!(vacant.property_types.contains("vacant"));

        let traffic = extractor().extract("retail with traffic data");
        assert_eq!(
            traffic.filters.get("has_traffic_data"),
            Some(&FilterValue::Flag(true))
        );
    }

    #[test]
    fn test_unknown_county_is_ignored() {
        let constraints = extractor().extract("properties in atlantis county");
        assert!(constraints.counties.is_empty());
    }

    #[test]
    fn test_empty_utterance_yields_empty_record() {
        let constraints = extractor().extract("");
        assert!(constraints.is_empty());
        assert_eq!(constraints.expected_min_results, 10);
        assert_eq!(constraints.expected_max_results, Some(1000));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let ex = extractor();
        let utterance = "gas stations in walton county under $500k";
        assert_eq!(ex.extract(utterance), ex.extract(utterance));
    }
}
