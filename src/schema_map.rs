//! Schema Map - natural-language concepts to physical column expressions
//!
//! Static, process-lifetime translation table between county tokens,
//! property-type synonyms, and size units on one side and SQL fragments
//! over the property table on the other. Immutable after construction.

use std::collections::BTreeMap;

/// Canonical county tokens recognized by default (Georgia metro counties).
pub fn default_county_list() -> Vec<String> {
    [
        "dekalb", "fulton", "gwinnett", "walton", "cobb", "clayton", "henry", "douglas",
        "rockdale",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

/// Default canonical property type -> synonym set table.
pub fn default_property_type_synonyms() -> BTreeMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        ("gas_station", &["gas", "station", "fuel", "gasoline"]),
        ("retail", &["retail", "store", "shop"]),
        ("restaurant", &["restaurant", "dining", "food"]),
        ("vacant", &["vacant", "empty", "undeveloped"]),
        ("commercial", &["commercial", "office", "business"]),
    ];
    table
        .iter()
        .map(|(canonical, synonyms)| {
            (
                canonical.to_string(),
                synonyms.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}

/// Bidirectional map between natural-language concepts and column expressions
///
/// Pure and total: unknown tokens yield `None` rather than a predicate.
/// Thread-safe read-only; built once from configuration and shared.
#[derive(Debug, Clone)]
pub struct SchemaMap {
    counties: Vec<String>,
    synonyms: BTreeMap<String, Vec<String>>,
}

impl SchemaMap {
    pub fn new(counties: Vec<String>, synonyms: BTreeMap<String, Vec<String>>) -> Self {
        let counties = counties.into_iter().map(|c| c.to_lowercase()).collect();
        let synonyms = synonyms
            .into_iter()
            .map(|(canonical, set)| {
                (
                    canonical.to_lowercase(),
                    set.into_iter().map(|s| s.to_lowercase()).collect(),
                )
            })
            .collect();
        Self { counties, synonyms }
    }

    /// County filter over the JSON address field, or `None` for unknown tokens
    pub fn county_predicate(&self, token: &str) -> Option<String> {
        let token = token.to_lowercase();
        if !self.counties.iter().any(|c| *c == token) {
            return None;
        }
        Some(format!("address->>'county' ILIKE '%{token}%'"))
    }

    /// Broadened type filter: OR of ILIKE clauses over property_type and
    /// property_subtype for every synonym of the canonical token
    pub fn property_type_predicate(&self, token: &str) -> Option<String> {
        let synonyms = self.synonyms.get(&token.to_lowercase())?;
        let clauses: Vec<String> = synonyms
            .iter()
            .flat_map(|s| {
                [
                    format!("property_type ILIKE '%{s}%'"),
                    format!("property_subtype ILIKE '%{s}%'"),
                ]
            })
            .collect();
        Some(format!("({})", clauses.join(" OR ")))
    }

    /// Physical column backing a size unit
    pub fn size_column(&self, unit: &str) -> Option<&'static str> {
        match unit.to_lowercase().as_str() {
            "acre" | "acres" => Some("size_acres"),
            "sqft" | "square feet" | "lot" | "lot size" => Some("size_sqft"),
            "building" | "building size" => Some("building_sqft"),
            _ => None,
        }
    }

    pub fn counties(&self) -> impl Iterator<Item = &str> {
        self.counties.iter().map(|c| c.as_str())
    }

    pub fn property_types(&self) -> impl Iterator<Item = &str> {
        self.synonyms.keys().map(|k| k.as_str())
    }

    pub fn synonyms(&self, canonical: &str) -> Option<&[String]> {
        self.synonyms.get(canonical).map(|s| s.as_slice())
    }
}

impl Default for SchemaMap {
    fn default() -> Self {
        Self::new(default_county_list(), default_property_type_synonyms())
    }
}
