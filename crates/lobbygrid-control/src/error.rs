//! Control-plane error types.

use thiserror::Error;

pub type ControlResult<T> = Result<T, ControlError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    /// The API server could not be reached or timed out. Retry later.
    #[error("control plane unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The request was understood and refused (invalid spec, quota, ...).
    #[error("rejected by control plane: {0}")]
    Rejected(String),
}

impl ControlError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ControlError::Unavailable(_))
    }
}
