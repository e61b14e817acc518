//! Label vocabulary.
//!
//! lobbygrid keeps no database. Every piece of lifecycle state lives in
//! labels on control-plane objects, so a restarted daemon recovers
//! everything from one full listing.

use std::collections::BTreeMap;

/// Label map attached to volumes and execution units.
pub type Labels = BTreeMap<String, String>;

/// What a volume or unit is for.
pub const PURPOSE: &str = "purpose";
pub const PURPOSE_WORLD: &str = "world";
pub const PURPOSE_PRE_GEN: &str = "pre-gen";
pub const PURPOSE_GAME: &str = "game";

/// Volume lifecycle stage (see [`crate::Stage::label_value`]).
pub const STAGE: &str = "stage";
/// Epoch millis a volume's game finished.
pub const FINISHED_AT: &str = "game-finish-time";
/// Epoch millis a volume was claimed for a game.
pub const CLAIMED_AT: &str = "claimed-at";
/// Set to `"true"` once a claimed volume's game was abandoned or deleted.
pub const RELEASED: &str = "released";

/// Instance id carried by game units.
pub const INSTANCE_ID: &str = "game-id";
/// Game type carried by game units.
pub const GAME_TYPE: &str = "game-type";
/// Volume mounted by an execution unit.
pub const WORLD: &str = "world";

/// Build a label map from key/value pairs.
pub fn labels<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Read an epoch-millis label. Missing or malformed values yield `None`.
pub fn millis(labels: &Labels, key: &str) -> Option<u64> {
    labels.get(key)?.parse().ok()
}
