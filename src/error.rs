/// Unified error type for the feedback engine
/// Component operations return these; the orchestrator converts every
/// terminal loop state into an envelope and never raises to the caller.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// The property store rejected or failed the statement
    #[error("Execution error: {message}")]
    Execution { message: String },

    /// The statement exceeded the per-statement timeout
    #[error("Statement timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The learning store failed to read or write
    #[error("Learning store error: {message}")]
    Store { message: String },

    /// The corrector returned the same SQL it was given
    #[error("Corrector produced no change")]
    NoCorrection,

    /// The loop reached the configured iteration bound
    #[error("Iteration budget of {limit} exhausted")]
    IterationBudgetExceeded { limit: u32 },

    /// Internal errors: should never happen, indicates bug
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }
}

/// Result type alias for engine operations
pub type CoreResult<T> = Result<T, CoreError>;
