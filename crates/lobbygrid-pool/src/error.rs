//! Pool error types.

use thiserror::Error;

use lobbygrid_control::ControlError;
use lobbygrid_core::{ResourceId, Stage};

#[derive(Debug, Error)]
pub enum PoolError {
    /// Another writer moved the volume first. Never surfaced past the pool.
    #[error("lost claim race for {0}")]
    ClaimRace(ResourceId),

    #[error("volume {id} is {actual}, expected {expected}")]
    UnexpectedStage {
        id: ResourceId,
        expected: Stage,
        actual: Stage,
    },

    /// `from` → `to` skips a stage or moves backwards.
    #[error("volume {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ResourceId,
        from: Stage,
        to: Stage,
    },

    #[error("volume {0} has no readable stage")]
    Unlabelled(ResourceId),

    #[error(transparent)]
    Control(#[from] ControlError),
}

pub type PoolResult<T> = Result<T, PoolError>;
