//! Engine configuration
//!
//! The closed option set accepted by [`crate::FeedbackEngine`]. Everything
//! else (table layout, projection minimums, correction stages) is fixed.

use crate::constraints::{OrderBy, OrderDirection};
use crate::schema_map;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on correction rounds per request
    pub max_iterations: u32,

    /// LIMIT applied when the utterance names none
    pub default_limit: u32,

    /// ORDER BY applied when the utterance names none
    pub default_order: OrderBy,

    /// Per-statement timeout (seconds)
    pub execution_timeout_secs: u64,

    /// Closed list of canonical county tokens
    pub county_list: Vec<String>,

    /// Closed map of canonical property type -> synonym set
    pub property_type_synonyms: BTreeMap<String, Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            default_limit: 50,
            default_order: OrderBy {
                column: "asking_price".to_string(),
                direction: OrderDirection::Asc,
            },
            execution_timeout_secs: 30,
            county_list: schema_map::default_county_list(),
            property_type_synonyms: schema_map::default_property_type_synonyms(),
        }
    }
}
