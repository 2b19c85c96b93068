//! Error types.
//!
//! A sampler failing a check is not an error: those are [`CheckResult`]
//! values. Only malformed input, inconsistent dates and upstream failures
//! surface here.
//!
//! [`CheckResult`]: crate::validation::CheckResult

use thiserror::Error;

/// Failure of one of the upstream reads (rosters, nominations, ...).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{source_name} unavailable: {message}")]
    Unavailable {
        source_name: &'static str,
        message: String,
    },
    #[error("malformed {source_name} record: {message}")]
    Malformed {
        source_name: &'static str,
        message: String,
    },
}

impl RepositoryError {
    pub fn unavailable(source_name: &'static str, message: impl Into<String>) -> Self {
        RepositoryError::Unavailable {
            source_name,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Malformed request; fix and resubmit.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Dates that cannot describe a real schedule (start after finish, ...).
    #[error("inconsistent data: {0}")]
    InconsistentData(String),
    /// Both the cached and the direct data paths failed.
    #[error("validation data unavailable: {0}")]
    Upstream(#[from] RepositoryError),
}
