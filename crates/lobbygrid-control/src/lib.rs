//! lobbygrid-control — the cluster control-plane boundary.
//!
//! lobbygrid never schedules anything itself. It issues declarative
//! requests (create a volume, create a unit, patch a label) through the
//! [`ControlPlane`] trait and reads status back. The control plane is the
//! system of record: every stage, claim, and finish time lives in labels on
//! the objects it stores.
//!
//! # Architecture
//!
//! ```text
//! ControlPlane (async trait, object safe)
//!   ├── volumes:  create / list / read / patch label / delete
//!   ├── units:    create / list / read / suspend / delete
//!   └── watch:    broadcast stream of UnitEvent
//!
//! MemoryControlPlane
//!   └── in-process implementation with fault injection, used by the
//!       test suites and by `lobbyd run --simulate`
//! ```

pub mod error;
pub mod memory;
pub mod plane;
pub mod types;

pub use error::{ControlError, ControlResult};
pub use memory::MemoryControlPlane;
pub use plane::ControlPlane;
pub use types::*;
