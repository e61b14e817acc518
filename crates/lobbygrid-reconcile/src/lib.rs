//! lobbygrid-reconcile — the periodic control loop.
//!
//! Every tick re-derives the world from the control plane and repairs
//! whatever drifted: finished games are retired, the routing table is
//! pruned (or rebuilt after a restart), abandoned worlds are finished,
//! old worlds are deleted, and the pool is topped up.
//!
//! # Architecture
//!
//! ```text
//! Reconciler::run ── every interval ──▶ tick()
//!   ├── game units      terminal → world finished, unit deleted
//!   ├── routing table   prune dead entries, restore missing ones
//!   ├── world volumes   retire orphaned claims, delete expired worlds
//!   └── ResourcePool::reconcile(live games)
//! ```
//!
//! The reconciler is the only writer of the `finished` stage.

pub mod reconciler;

pub use reconciler::{Reconciler, ReconcilerConfig, TickReport};
