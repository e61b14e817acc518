//! Scheduler error types.

use std::time::Duration;

use thiserror::Error;

use lobbygrid_control::ControlError;
use lobbygrid_core::{GameType, InstanceId};
use lobbygrid_pool::{AllocationExhausted, PoolError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Exactly one of these is produced per failed create request.
    #[error("failed to create {game} instance: {cause}")]
    InstanceCreationFailed {
        game: GameType,
        #[source]
        cause: CreationCause,
    },

    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error(transparent)]
    Control(#[from] ControlError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Why a creation failed.
#[derive(Debug, Error)]
pub enum CreationCause {
    /// The id namespace is full. Fatal configuration problem.
    #[error(transparent)]
    AllocationExhausted(#[from] AllocationExhausted),

    #[error("control plane unavailable: {0}")]
    ControlPlaneUnavailable(#[source] ControlError),

    #[error("control plane refused the request: {0}")]
    ControlPlaneRejected(#[source] ControlError),

    #[error("game did not become ready within {0:?}")]
    CreationTimeout(Duration),

    #[error("cancelled by shutdown")]
    Cancelled,

    #[error("game unit {0}")]
    UnitFailed(String),
}

impl CreationCause {
    pub fn from_control(e: ControlError) -> Self {
        if e.is_transient() {
            CreationCause::ControlPlaneUnavailable(e)
        } else {
            CreationCause::ControlPlaneRejected(e)
        }
    }

    pub fn from_pool(e: PoolError) -> Self {
        match e {
            PoolError::Control(e) => Self::from_control(e),
            other => CreationCause::ControlPlaneRejected(ControlError::Rejected(other.to_string())),
        }
    }
}

impl SchedulerError {
    pub fn cause(&self) -> Option<&CreationCause> {
        match self {
            SchedulerError::InstanceCreationFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
