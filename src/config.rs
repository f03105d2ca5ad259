//! Engine configuration: player bounds, per-role bounds and phase durations.
//!
//! Defaults are usable as-is; a JSON file passed with `--config` overrides any
//! subset of fields, and CLI flags override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::game::Phase;
use crate::error::ConfigError;

/// Inclusive count range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: usize,
    pub max: usize,
}

impl Bounds {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub const fn contains(&self, n: usize) -> bool {
        n >= self.min && n <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleBounds {
    pub killers: Bounds,
    pub healers: Bounds,
    pub investigators: Bounds,
}

impl Default for RoleBounds {
    fn default() -> Self {
        Self {
            killers: Bounds::new(1, 4),
            healers: Bounds::new(0, 2),
            investigators: Bounds::new(0, 2),
        }
    }
}

/// Phase durations, stored in whole seconds in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseDurations {
    #[serde(with = "secs")]
    pub role_reveal: Duration,
    #[serde(with = "secs")]
    pub night: Duration,
    #[serde(with = "secs")]
    pub discussion: Duration,
    #[serde(with = "secs")]
    pub voting: Duration,
    /// Pause on the results screen before the next night
    #[serde(with = "secs")]
    pub results: Duration,
    /// Idle time on the game-over screen before returning to the lobby
    #[serde(with = "secs")]
    pub game_over: Duration,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            role_reveal: Duration::from_secs(8),
            night: Duration::from_secs(45),
            discussion: Duration::from_secs(90),
            voting: Duration::from_secs(45),
            results: Duration::from_secs(6),
            game_over: Duration::from_secs(60),
        }
    }
}

impl PhaseDurations {
    /// Timer length for a phase; `None` for the lobby, which never times out.
    pub const fn for_phase(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::Lobby => None,
            Phase::RoleReveal => Some(self.role_reveal),
            Phase::Night => Some(self.night),
            Phase::Discussion => Some(self.discussion),
            Phase::Voting => Some(self.voting),
            Phase::Results => Some(self.results),
            Phase::GameOver => Some(self.game_over),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub players: Bounds,
    pub roles: RoleBounds,
    pub durations: PhaseDurations,
    pub max_name_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            players: Bounds::new(3, 16),
            roles: RoleBounds::default(),
            durations: PhaseDurations::default(),
            max_name_len: 20,
        }
    }
}

impl EngineConfig {
    /// Loads a JSON config file; missing fields fall back to defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Rejects bounds that could never admit a legal game.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ranges = [
            ("players", self.players),
            ("killers", self.roles.killers),
            ("healers", self.roles.healers),
            ("investigators", self.roles.investigators),
        ];
        for (name, b) in ranges {
            if b.min > b.max {
                return Err(ConfigError::Invalid(format!(
                    "{name} bounds are inverted ({} > {})",
                    b.min, b.max
                )));
            }
        }
        if self.players.min < 3 {
            return Err(ConfigError::Invalid("at least 3 players are required".into()));
        }
        if self.roles.killers.min == 0 {
            return Err(ConfigError::Invalid("every game needs at least one killer".into()));
        }
        if self.max_name_len == 0 {
            return Err(ConfigError::Invalid("max_name_len must be positive".into()));
        }
        let d = &self.durations;
        for (name, dur) in [
            ("role_reveal", d.role_reveal),
            ("night", d.night),
            ("discussion", d.discussion),
            ("voting", d.voting),
        ] {
            if dur.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} duration must be positive")));
            }
        }
        Ok(())
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
