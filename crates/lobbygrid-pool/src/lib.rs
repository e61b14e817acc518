//! lobbygrid-pool — warm world volumes and instance identifiers.
//!
//! Provisioning a fresh world dominates game start-up time, so the pool
//! pre-generates worlds while nobody is playing and hands them out on
//! demand.
//!
//! # Volume lifecycle
//!
//! ```text
//!   reconcile()            reconcile()           take_ready()        reconciler
//!  ─────────────▶ pre-gen ─────────────▶ ready ─────────────▶ game ────────────▶ finished
//!   create volume          unit succeeded        claim               game exited
//!   + pre-gen unit         unit deleted
//! ```
//!
//! The ready queue and the generating set sit behind a single mutex, so
//! concurrent claims never hand out the same world.

pub mod error;
pub mod ids;
pub mod pool;

pub use error::{PoolError, PoolResult};
pub use ids::{AllocationExhausted, IdAllocator};
pub use pool::{advance_stage, CreationGuard, PoolConfig, PoolReport, PoolSnapshot, ResourcePool};
