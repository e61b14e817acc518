//! Domain types for lobbygrid.
//!
//! Nothing here is persisted by lobbygrid itself. Instances and world
//! volumes are reconstructed from control-plane labels on every
//! reconciliation tick (see [`crate::labels`]).

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::labels::{self, Labels};

/// Short, human-typeable identifier of a running game (e.g. `"42"`).
pub type InstanceId = String;

/// Identifier of a world volume in the control plane.
pub type ResourceId = String;

/// Identifier of an execution unit (job) in the control plane.
pub type UnitId = String;

// ── Game types ─────────────────────────────────────────────────────

/// The game payload an instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    HunterVsSpeedrunner,
    BlockShuffle,
}

impl GameType {
    const ALL: [GameType; 2] = [GameType::HunterVsSpeedrunner, GameType::BlockShuffle];

    /// Every game type, in display order.
    pub fn all() -> &'static [GameType] {
        &Self::ALL
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::HunterVsSpeedrunner => "hunter_vs_speedrunner",
            GameType::BlockShuffle => "block_shuffle",
        }
    }

    /// Location of the plugin jar the game unit downloads at start-up.
    pub fn payload_url(&self) -> &'static str {
        match self {
            GameType::HunterVsSpeedrunner => {
                "https://saggyresourcepack.blob.core.windows.net/www/SpeedrunnerVsHunter-1.0.jar"
            }
            GameType::BlockShuffle => {
                "https://saggyresourcepack.blob.core.windows.net/www/BlockShuffle-1.0.jar"
            }
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known game type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown game type: {0}")]
pub struct UnknownGameType(pub String);

impl FromStr for GameType {
    type Err = UnknownGameType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|g| g.as_str() == wanted)
            .ok_or_else(|| UnknownGameType(s.to_string()))
    }
}

// ── World volumes ──────────────────────────────────────────────────

/// Lifecycle stage of a world volume.
///
/// Stages only ever move forward, one step at a time:
/// `PreGenerating → Ready → InUse → Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreGenerating,
    Ready,
    InUse,
    Finished,
}

impl Stage {
    /// Value stored under the `stage` label.
    pub fn label_value(&self) -> &'static str {
        match self {
            Stage::PreGenerating => "pre-gen",
            Stage::Ready => "ready",
            Stage::InUse => "game",
            Stage::Finished => "finished",
        }
    }

    pub fn from_label_value(value: &str) -> Option<Self> {
        match value {
            "pre-gen" => Some(Stage::PreGenerating),
            "ready" => Some(Stage::Ready),
            "game" => Some(Stage::InUse),
            "finished" => Some(Stage::Finished),
            _ => None,
        }
    }

    /// The stage that follows this one, if any.
    pub fn successor(&self) -> Option<Stage> {
        match self {
            Stage::PreGenerating => Some(Stage::Ready),
            Stage::Ready => Some(Stage::InUse),
            Stage::InUse => Some(Stage::Finished),
            Stage::Finished => None,
        }
    }

    pub fn can_advance_to(&self, next: Stage) -> bool {
        self.successor() == Some(next)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label_value())
    }
}

/// A world volume as reconstructed from its control-plane labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackingResource {
    pub id: ResourceId,
    pub stage: Stage,
    /// Epoch millis the control plane created the volume.
    pub created_at: u64,
    /// Epoch millis the game on this volume finished.
    pub finished_at: Option<u64>,
    /// Epoch millis the volume was claimed for a game.
    pub claimed_at: Option<u64>,
    /// The game that used this volume was abandoned or deleted.
    pub released: bool,
}

impl BackingResource {
    /// Decode a volume's labels. Returns `None` for volumes that are not
    /// lobbygrid worlds or carry an unknown stage.
    pub fn from_labels(id: &str, created_at: u64, labels: &Labels) -> Option<Self> {
        if labels.get(labels::PURPOSE).map(String::as_str) != Some(labels::PURPOSE_WORLD) {
            return None;
        }
        let stage = Stage::from_label_value(labels.get(labels::STAGE)?)?;
        Some(Self {
            id: id.to_string(),
            stage,
            created_at,
            finished_at: labels::millis(labels, labels::FINISHED_AT),
            claimed_at: labels::millis(labels, labels::CLAIMED_AT),
            released: labels.get(labels::RELEASED).map(String::as_str) == Some("true"),
        })
    }
}

// ── Instances ──────────────────────────────────────────────────────

/// Lifecycle state of a game instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Creating,
    Running,
    Finished,
}

/// One player-joinable game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub game: GameType,
    pub resource_id: ResourceId,
    pub unit_id: UnitId,
    /// Network address players connect to. `None` until the unit is ready.
    pub endpoint: Option<SocketAddr>,
    pub state: InstanceState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_type_parses_case_insensitively() {
        assert_eq!("BLOCK_SHUFFLE".parse::<GameType>(), Ok(GameType::BlockShuffle));
        assert_eq!(
            " hunter_vs_speedrunner ".parse::<GameType>(),
            Ok(GameType::HunterVsSpeedrunner)
        );
        assert!("tag".parse::<GameType>().is_err());
    }

    #[test]
    fn every_game_type_round_trips_through_display() {
        for game in GameType::all() {
            assert_eq!(game.to_string().parse::<GameType>().unwrap(), *game);
        }
    }

    #[test]
    fn stages_advance_one_step_at_a_time() {
        assert!(Stage::PreGenerating.can_advance_to(Stage::Ready));
        assert!(Stage::Ready.can_advance_to(Stage::InUse));
        assert!(Stage::InUse.can_advance_to(Stage::Finished));

        assert!(!Stage::PreGenerating.can_advance_to(Stage::InUse));
        assert!(!Stage::InUse.can_advance_to(Stage::Ready));
        assert!(!Stage::Finished.can_advance_to(Stage::PreGenerating));
        assert_eq!(Stage::Finished.successor(), None);
    }

    #[test]
    fn stage_label_values_match_cluster_vocabulary() {
        for stage in [Stage::PreGenerating, Stage::Ready, Stage::InUse, Stage::Finished] {
            assert_eq!(Stage::from_label_value(stage.label_value()), Some(stage));
        }
        assert_eq!(Stage::InUse.label_value(), "game");
    }

    #[test]
    fn backing_resource_decodes_labels() {
        let mut l = Labels::new();
        l.insert(labels::PURPOSE.into(), labels::PURPOSE_WORLD.into());
        l.insert(labels::STAGE.into(), "finished".into());
        l.insert(labels::FINISHED_AT.into(), "1700000000000".into());
        l.insert(labels::RELEASED.into(), "true".into());

        let res = BackingResource::from_labels("world-1", 5, &l).unwrap();
        assert_eq!(res.stage, Stage::Finished);
        assert_eq!(res.finished_at, Some(1_700_000_000_000));
        assert_eq!(res.claimed_at, None);
        assert!(res.released);
        assert_eq!(res.created_at, 5);
    }

    #[test]
    fn backing_resource_ignores_foreign_volumes() {
        let mut l = Labels::new();
        l.insert(labels::STAGE.into(), "ready".into());
        assert!(BackingResource::from_labels("x", 0, &l).is_none());

        l.insert(labels::PURPOSE.into(), labels::PURPOSE_WORLD.into());
        l.insert(labels::STAGE.into(), "melted".into());
        assert!(BackingResource::from_labels("x", 0, &l).is_none());
    }
}
