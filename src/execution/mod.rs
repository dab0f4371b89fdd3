//! Execution layer - property store capability, executor, result model

pub mod executor;
pub mod postgres;
pub mod result;

pub use executor::{Executor, PropertyStore, TableData};
pub use postgres::PostgresPropertyStore;
pub use result::{Cell, ExecutionResult, Row};
