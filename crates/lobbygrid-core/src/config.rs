//! lobby.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration:
//!
//! ```toml
//! [pool]
//! target_size = 10
//! generation_concurrency = 1
//!
//! [ids]
//! width = 2
//!
//! [lifecycle]
//! creation_timeout = "5m"
//!
//! [reconcile]
//! interval = "5s"
//! retention = "7d"
//!
//! [cluster]
//! namespace = "beans-mini-games"
//! storage_class = "local-path"
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding `cluster.namespace`.
pub const ENV_NAMESPACE: &str = "LOBBY_NAMESPACE";
/// Environment variable overriding `cluster.storage_class`.
pub const ENV_STORAGE_CLASS: &str = "LOBBY_STORAGE_CLASS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration {0:?} (expected e.g. \"500ms\", \"5s\", \"5m\", \"2h\", \"7d\")")]
    Duration(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LobbyConfig {
    pub pool: PoolSection,
    pub ids: IdSection,
    pub lifecycle: LifecycleSection,
    pub reconcile: ReconcileSection,
    pub cluster: ClusterSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolSection {
    /// Number of ready + generating worlds to keep on hand.
    pub target_size: u32,
    /// Maximum pre-generation units in flight.
    pub generation_concurrency: u32,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            target_size: 10,
            generation_concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdSection {
    /// Decimal digits per instance id. The namespace holds `10^width` ids.
    pub width: u32,
}

impl Default for IdSection {
    fn default() -> Self {
        Self { width: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LifecycleSection {
    /// How long a creation waits for the game to report a ready endpoint.
    pub creation_timeout: HumanDuration,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            creation_timeout: HumanDuration(Duration::from_secs(5 * 60)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcileSection {
    pub interval: HumanDuration,
    /// How long finished worlds are kept before deletion.
    pub retention: HumanDuration,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            interval: HumanDuration(Duration::from_secs(5)),
            retention: HumanDuration(Duration::from_secs(7 * 24 * 60 * 60)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterSection {
    pub namespace: String,
    pub storage_class: String,
    pub volume_size: String,
    /// Port game servers listen on inside their unit.
    pub game_port: u16,
    /// Plugin every game unit loads next to its game payload.
    pub game_plugin_url: String,
    /// Plugins the pre-generation unit loads.
    pub pre_gen_plugin_urls: Vec<String>,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            namespace: "beans-mini-games".to_string(),
            storage_class: "local-path".to_string(),
            volume_size: "5Gi".to_string(),
            game_port: 25565,
            game_plugin_url:
                "https://saggyresourcepack.blob.core.windows.net/www/BeansGamePlugin-1.0-SNAPSHOT.jar"
                    .to_string(),
            pre_gen_plugin_urls: vec![
                "https://saggyresourcepack.blob.core.windows.net/www/PreGen-1.0.jar".to_string(),
                "https://saggyresourcepack.blob.core.windows.net/www/Chunky-1.3.52.jar".to_string(),
            ],
        }
    }
}

impl LobbyConfig {
    /// Read, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Apply `LOBBY_*` overrides using the given variable lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ns) = lookup(ENV_NAMESPACE) {
            self.cluster.namespace = ns;
        }
        if let Some(class) = lookup(ENV_STORAGE_CLASS) {
            self.cluster.storage_class = class;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=9).contains(&self.ids.width) {
            return Err(ConfigError::Invalid(format!(
                "ids.width must be between 1 and 9, got {}",
                self.ids.width
            )));
        }
        if self.pool.generation_concurrency == 0 && self.pool.target_size > 0 {
            return Err(ConfigError::Invalid(
                "pool.generation_concurrency must be at least 1 when pool.target_size > 0".into(),
            ));
        }
        if self.reconcile.interval.0.is_zero() {
            return Err(ConfigError::Invalid("reconcile.interval must be non-zero".into()));
        }
        if self.lifecycle.creation_timeout.0.is_zero() {
            return Err(ConfigError::Invalid(
                "lifecycle.creation_timeout must be non-zero".into(),
            ));
        }
        if self.cluster.namespace.is_empty() {
            return Err(ConfigError::Invalid("cluster.namespace must not be empty".into()));
        }
        Ok(())
    }
}

// ── Durations ──────────────────────────────────────────────────────

/// A duration written the way operators write them: `"500ms"`, `"5s"`,
/// `"5m"`, `"2h"`, `"7d"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn get(&self) -> Duration {
        self.0
    }
}

impl TryFrom<String> for HumanDuration {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        parse_duration(&s).map(HumanDuration)
    }
}

impl From<HumanDuration> for String {
    fn from(d: HumanDuration) -> Self {
        d.to_string()
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.as_millis();
        const DAY: u128 = 24 * 60 * 60 * 1000;
        match ms {
            0 => write!(f, "0s"),
            ms if ms % DAY == 0 => write!(f, "{}d", ms / DAY),
            ms if ms % 3_600_000 == 0 => write!(f, "{}h", ms / 3_600_000),
            ms if ms % 60_000 == 0 => write!(f, "{}m", ms / 60_000),
            ms if ms % 1000 == 0 => write!(f, "{}s", ms / 1000),
            ms => write!(f, "{ms}ms"),
        }
    }
}

/// Parse a duration string like `"30s"` or `"7d"`.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let bad = || ConfigError::Duration(s.to_string());

    let (digits, unit_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else if let Some(n) = s.strip_suffix('d') {
        (n, 24 * 3_600_000)
    } else {
        return Err(bad());
    };

    let n: u64 = digits.trim().parse().map_err(|_| bad())?;
    n.checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(bad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let config = LobbyConfig::from_toml_str("").unwrap();
        assert_eq!(config, LobbyConfig::default());
        assert_eq!(config.pool.target_size, 10);
        assert_eq!(config.pool.generation_concurrency, 1);
        assert_eq!(config.ids.width, 2);
        assert_eq!(config.lifecycle.creation_timeout.get(), Duration::from_secs(300));
        assert_eq!(config.reconcile.interval.get(), Duration::from_secs(5));
        assert_eq!(config.reconcile.retention.get(), Duration::from_secs(7 * 86_400));
        config.validate().unwrap();
    }

    #[test]
    fn parses_partial_sections() {
        let config = LobbyConfig::from_toml_str(
            r#"
[pool]
target_size = 3

[lifecycle]
creation_timeout = "90s"

[reconcile]
retention = "2d"
"#,
        )
        .unwrap();
        assert_eq!(config.pool.target_size, 3);
        assert_eq!(config.pool.generation_concurrency, 1);
        assert_eq!(config.lifecycle.creation_timeout.get(), Duration::from_secs(90));
        assert_eq!(config.reconcile.retention.get(), Duration::from_secs(2 * 86_400));
    }

    #[test]
    fn rejects_bad_duration() {
        let err = LobbyConfig::from_toml_str("[reconcile]\ninterval = \"soon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_rejects_bad_width() {
        let mut config = LobbyConfig::default();
        config.ids.width = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.ids.width = 10;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_zero_concurrency_with_target() {
        let mut config = LobbyConfig::default();
        config.pool.generation_concurrency = 0;
        assert!(config.validate().is_err());
        config.pool.target_size = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_cluster_settings() {
        let env: HashMap<&str, &str> =
            [(ENV_NAMESPACE, "games-staging"), (ENV_STORAGE_CLASS, "ssd")].into();
        let mut config = LobbyConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.cluster.namespace, "games-staging");
        assert_eq!(config.cluster.storage_class, "ssd");
    }

    #[test]
    fn duration_values() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604_800));
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn serialized_config_parses_back() {
        let config = LobbyConfig::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("creation_timeout = \"5m\""));
        assert!(text.contains("retention = \"7d\""));
        assert_eq!(LobbyConfig::from_toml_str(&text).unwrap(), config);
    }
}
