//! lobbygrid-proxy — where players get sent.
//!
//! The lobby's connection layer asks the [`RoutingTable`] which games are
//! joinable and which address a game id maps to. The orchestrator publishes
//! entries when a game becomes reachable; the reconciler prunes them when
//! the game ends and rebuilds them after a restart.

pub mod router;

pub use router::RoutingTable;
