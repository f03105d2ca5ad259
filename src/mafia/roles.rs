//! Roles, factions and role assignment.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::random::Randomizer;
use crate::core::game::PlayerId;
use crate::error::GameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Killers,
    Town,
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Killers => "killers",
            Self::Town => "town",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Kill,
    Heal,
    Investigate,
}

impl ActionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kill => "kill",
            Self::Heal => "heal",
            Self::Investigate => "investigate",
        }
    }
}

/// Data attached to each role, looked up once via [`Role::traits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleTraits {
    pub faction: Faction,
    pub night_action: Option<ActionKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Killer,
    Healer,
    Investigator,
    Townsperson,
}

impl Role {
    pub const fn traits(self) -> RoleTraits {
        match self {
            Self::Killer => RoleTraits {
                faction: Faction::Killers,
                night_action: Some(ActionKind::Kill),
            },
            Self::Healer => RoleTraits {
                faction: Faction::Town,
                night_action: Some(ActionKind::Heal),
            },
            Self::Investigator => RoleTraits {
                faction: Faction::Town,
                night_action: Some(ActionKind::Investigate),
            },
            Self::Townsperson => RoleTraits {
                faction: Faction::Town,
                night_action: None,
            },
        }
    }

    pub const fn faction(self) -> Faction {
        self.traits().faction
    }

    pub const fn night_action(self) -> Option<ActionKind> {
        self.traits().night_action
    }

    pub const fn can_act(self) -> bool {
        self.traits().night_action.is_some()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Killer => "killer",
            Self::Healer => "healer",
            Self::Investigator => "investigator",
            Self::Townsperson => "townsperson",
        })
    }
}

/// How many of each special role to deal; townspeople fill the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfiguration {
    pub total_players: usize,
    pub killers: usize,
    #[serde(default)]
    pub healers: usize,
    #[serde(default)]
    pub investigators: usize,
}

impl RoleConfiguration {
    pub const fn specials(&self) -> usize {
        self.killers + self.healers + self.investigators
    }

    /// `None` when the specials alone exceed the table size.
    pub const fn townspeople(&self) -> Option<usize> {
        self.total_players.checked_sub(self.specials())
    }

    /// Everyone who is not a killer.
    pub const fn non_killers(&self) -> usize {
        self.total_players.saturating_sub(self.killers)
    }

    /// The 3-player table with one of each special role and no townspeople.
    pub const fn is_minimal(&self) -> bool {
        self.total_players == 3 && self.killers == 1 && self.healers == 1 && self.investigators == 1
    }

    /// Sensible deal for a table of `n`: a killer per four seats, then a healer
    /// from four players and an investigator from five.
    pub const fn recommended(n: usize) -> Self {
        let killers = if n / 4 == 0 { 1 } else { n / 4 };
        Self {
            total_players: n,
            killers,
            healers: if n >= 4 { 1 } else { 0 },
            investigators: if n >= 5 { 1 } else { 0 },
        }
    }
}

pub struct RoleAssigner;

impl RoleAssigner {
    /// Deals one role to each player. The multiset of roles matches `config`
    /// exactly; which player gets which depends only on the shuffle.
    pub fn assign<R: Rng>(
        players: &[PlayerId],
        config: &RoleConfiguration,
        randomizer: &mut Randomizer<R>,
    ) -> Result<Vec<(PlayerId, Role)>, GameError> {
        let mismatch = GameError::ConfigurationMismatch {
            roles: config.total_players,
            players: players.len(),
        };
        let Some(townspeople) = config.townspeople() else {
            error!(?config, "role configuration has more specials than seats");
            return Err(mismatch);
        };
        if players.len() != config.total_players {
            error!(?config, players = players.len(), "role count does not match roster");
            return Err(mismatch);
        }

        let mut tags = Vec::with_capacity(players.len());
        tags.extend(std::iter::repeat(Role::Killer).take(config.killers));
        tags.extend(std::iter::repeat(Role::Healer).take(config.healers));
        tags.extend(std::iter::repeat(Role::Investigator).take(config.investigators));
        tags.extend(std::iter::repeat(Role::Townsperson).take(townspeople));
        randomizer.shuffle(&mut tags);

        debug!(players = players.len(), killers = config.killers, "roles dealt");
        Ok(players.iter().copied().zip(tags).collect())
    }
}
