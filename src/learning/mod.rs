//! Learning layer - durable correction trails and read-only summaries

pub mod reporter;
pub mod store;

pub use reporter::Reporter;
pub use store::{query_hash, FeedbackRecord, LearningStats, LearningStore};
