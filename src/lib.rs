//! # Property SQL Engine
//!
//! A self-correcting natural-language-to-SQL engine for a commercial
//! real-estate property database. The engine takes a user utterance and a
//! candidate SQL statement, extracts typed constraints from the utterance,
//! and then executes, validates, and repairs the statement until the result
//! satisfies the constraints or the iteration budget runs out. Every
//! correction trail is persisted so future repairs can reuse patterns that
//! worked before.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use property_sql_engine::{
//!     EngineConfig, FeedbackEngine, LearningStore, PostgresPropertyStore,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> property_sql_engine::CoreResult<()> {
//! let store = Arc::new(PostgresPropertyStore::connect(
//!     "host=localhost user=postgres dbname=properties",
//!     4,
//! )?);
//! let learning = Arc::new(LearningStore::open("query_learning.db")?);
//! let engine = FeedbackEngine::new(EngineConfig::default(), store, learning);
//!
//! let envelope = engine.process(
//!     "gas stations in walton county under $500k",
//!     "SELECT id, name FROM \"Georgia Properties\" WHERE property_type ILIKE '%walton%'",
//! );
//! println!("{} -> {}", envelope.status, envelope.final_sql);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! - **Constraint extraction**: counties, price/size ranges, property-type
//!   synonyms, aggregation intent, ordering, limit, expected cardinality
//! - **Validation**: result cardinality and structural checks of the SQL
//!   against the extracted constraints
//! - **Correction**: staged repairs (county field remapping, aggregation
//!   shape, synonym broadening, BETWEEN encoding, projection completeness,
//!   learned patterns)
//! - **Learning**: durable per-request records keyed by an MD5 fingerprint,
//!   with similarity lookup and aggregate reporting

// Internal modules
pub mod config;
pub mod constraints;
pub mod correction;
pub mod engine;
pub mod error;
pub mod execution;
pub mod learning;
pub mod schema_map;
pub mod sql_builder;
pub mod validation;

// Public API - main types callers need
pub use config::EngineConfig;
pub use engine::{CorrectionStep, Envelope, FeedbackEngine};
pub use error::{CoreError, CoreResult};

// Constraint model
pub use constraints::{
    Aggregation, ConstraintExtractor, Constraints, FilterValue, OrderBy, OrderDirection,
    PriceRange, SizeRange,
};

// Execution layer
pub use execution::{Cell, ExecutionResult, Executor, PostgresPropertyStore, PropertyStore, Row, TableData};

// Validation and correction
pub use correction::{Correction, SqlCorrector};
pub use validation::{Issue, ResultValidator, ValidationStatus};

// Learning layer
pub use learning::{query_hash, FeedbackRecord, LearningStats, LearningStore, Reporter};

// Candidate generation
pub use schema_map::SchemaMap;
pub use sql_builder::{CandidateSource, DirectCandidateSource, SqlBuilder};
