//! lobbygrid-core — types shared by every lobbygrid crate.
//!
//! - [`types`]: instances, world volumes, lifecycle stages, game types
//! - [`labels`]: the label vocabulary that encodes lifecycle state on
//!   control-plane objects (the only durable state lobbygrid has)
//! - [`config`]: `lobby.toml` parsing and validation
//! - [`shutdown`]: the shutdown signal every background loop waits on

pub mod config;
pub mod labels;
pub mod shutdown;
pub mod types;

pub use config::{ConfigError, LobbyConfig};
pub use types::*;

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
