/// Core identifiers and the phase enum shared by the engine, transport and client
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transient id the transport assigns to each socket
pub type ConnectionId = Uuid;

/// Stable seat number, assigned in join order and never reused within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Named stage of a session. `GameOver` is terminal until the host resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Lobby,
    RoleReveal,
    Night,
    Discussion,
    Voting,
    Results,
    GameOver,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::RoleReveal => "role_reveal",
            Self::Night => "night",
            Self::Discussion => "discussion",
            Self::Voting => "voting",
            Self::Results => "results",
            Self::GameOver => "game_over",
        }
    }

    /// Phases that end on a timer (or the host skipping them)
    pub const fn is_timed(self) -> bool {
        !matches!(self, Self::Lobby)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
