//! Objects exchanged with the control plane.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use lobbygrid_core::labels::Labels;
use lobbygrid_core::{ResourceId, UnitId};

// ── Volumes ────────────────────────────────────────────────────────

/// Request for a new persistent world volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Name prefix; the control plane appends a unique suffix.
    pub name_prefix: String,
    pub storage_class: String,
    /// Requested capacity, e.g. `"5Gi"`.
    pub size: String,
}

/// A volume as stored by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeResource {
    pub id: ResourceId,
    pub labels: Labels,
    /// Epoch millis.
    pub created_at: u64,
}

// ── Execution units ────────────────────────────────────────────────

/// What an execution unit runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Pre-builds a world on a volume, then exits.
    PreGeneration,
    /// Serves a live game; exits when the game ends.
    Game,
}

/// Request for a new execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub kind: UnitKind,
    /// Name prefix; the control plane appends a unique suffix.
    pub name_prefix: String,
    /// Volume mounted as the world directory.
    pub volume: ResourceId,
    /// Plugin URLs fetched by the init step before the server starts.
    pub payloads: Vec<String>,
    /// Port the server listens on.
    pub port: u16,
    /// Stop the server once the game has ended and everyone left.
    pub auto_stop: bool,
}

/// Lifecycle phase reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl UnitPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitPhase::Succeeded | UnitPhase::Failed)
    }
}

/// An execution unit as observed in the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionUnit {
    pub id: UnitId,
    pub kind: UnitKind,
    pub labels: Labels,
    pub volume: ResourceId,
    pub phase: UnitPhase,
    pub suspended: bool,
    /// Port the server listens on.
    pub port: u16,
    /// Set once the server inside the unit accepts connections.
    pub endpoint: Option<SocketAddr>,
    /// Epoch millis.
    pub created_at: u64,
}

impl ExecutionUnit {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Running and reachable.
    pub fn ready_endpoint(&self) -> Option<SocketAddr> {
        match self.phase {
            UnitPhase::Running => self.endpoint,
            _ => None,
        }
    }
}

/// Change notification from the unit watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitEvent {
    Added(ExecutionUnit),
    Modified(ExecutionUnit),
    Deleted(ExecutionUnit),
}

impl UnitEvent {
    pub fn unit(&self) -> &ExecutionUnit {
        match self {
            UnitEvent::Added(u) | UnitEvent::Modified(u) | UnitEvent::Deleted(u) => u,
        }
    }
}

// ── Selectors ──────────────────────────────────────────────────────

/// Equality-based label selector (`purpose=game,stage=ready`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    terms: Vec<(String, String)>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.terms.push((key.to_string(), value.to_string()));
        self
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.terms
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

impl std::fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let terms: Vec<String> = self.terms.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&terms.join(","))
    }
}
