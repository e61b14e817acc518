//! lobbygrid-scheduler — turns "I want to play" into a joinable game.
//!
//! # Architecture
//!
//! ```text
//! Lobby (connection-layer facade)
//!   ├── list_joinable / resolve ──────────▶ RoutingTable
//!   ├── request_create ── tokio::spawn ──▶ Orchestrator::create_instance
//!   │                                         ├── ResourcePool (claim or provision a world)
//!   │                                         ├── IdAllocator (reserve an id)
//!   │                                         ├── ControlPlane (submit unit, watch for ready)
//!   │                                         └── RoutingTable (publish)
//!   ├── delete ───────────────────────────▶ Orchestrator::delete_instance
//!   └── Notifier (Creating / Ready / Failed to the player, Announced to everyone)
//! ```
//!
//! Cleanup after a game ends is not done here; the reconciler owns every
//! transition to `finished`.

pub mod error;
pub mod lobby;
pub mod notifier;
pub mod orchestrator;

pub use error::{CreationCause, SchedulerError, SchedulerResult};
pub use lobby::Lobby;
pub use notifier::{ChannelNotifier, LogNotifier, Notice, Notifier, Recipient};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
