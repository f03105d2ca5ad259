//! Stateless intent validation.
//!
//! Every check here runs before `SessionState` is touched:
//! - names: trimmed, non-empty, bounded length, printable, unique per table
//! - role configurations: totals, per-role bounds, killer ratio
//! - night actions: living actor whose role performs that kind, living target
//! - votes: living voter, living target other than the voter

use super::roles::{ActionKind, Role, RoleConfiguration};
use super::session::{NightAction, Player, Vote};
use crate::config::EngineConfig;
use crate::core::game::PlayerId;
use crate::error::GameError;

/// Returns the trimmed name on success.
pub fn validate_name(raw: &str, roster: &[Player], config: &EngineConfig) -> Result<String, GameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(GameError::validation("name must not be empty"));
    }
    if name.chars().count() > config.max_name_len {
        return Err(GameError::validation(format!(
            "name must be at most {} characters",
            config.max_name_len
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(GameError::validation("name contains control characters"));
    }
    if roster.iter().any(|p| p.name.eq_ignore_ascii_case(name)) {
        return Err(GameError::validation(format!("name '{name}' is already taken")));
    }
    Ok(name.to_string())
}

/// Checks a configuration against the table size and configured bounds.
pub fn validate_role_config(
    rc: &RoleConfiguration,
    seated: usize,
    config: &EngineConfig,
) -> Result<(), GameError> {
    if rc.total_players != seated {
        return Err(GameError::validation(format!(
            "configuration is for {} players but {seated} are seated",
            rc.total_players
        )));
    }
    if !config.players.contains(seated) {
        return Err(GameError::validation(format!(
            "a game needs between {} and {} players",
            config.players.min, config.players.max
        )));
    }
    let bounds = &config.roles;
    for (name, count, b) in [
        ("killers", rc.killers, bounds.killers),
        ("healers", rc.healers, bounds.healers),
        ("investigators", rc.investigators, bounds.investigators),
    ] {
        if !b.contains(count) {
            return Err(GameError::validation(format!(
                "{name} must be between {} and {}, got {count}",
                b.min, b.max
            )));
        }
    }
    if rc.killers == 0 {
        return Err(GameError::validation("at least one killer is required"));
    }
    match rc.townspeople() {
        None => {
            return Err(GameError::validation(format!(
                "{} special roles do not fit {} players",
                rc.specials(),
                rc.total_players
            )));
        }
        Some(0) if !rc.is_minimal() => {
            return Err(GameError::validation("at least one townsperson is required"));
        }
        Some(_) => {}
    }
    if rc.killers >= rc.non_killers() {
        return Err(GameError::validation(format!(
            "{} killers would already control a table of {}",
            rc.killers, rc.total_players
        )));
    }
    Ok(())
}

fn living<'a>(roster: &'a [Player], id: PlayerId, what: &str) -> Result<&'a Player, GameError> {
    let player = roster
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| GameError::validation(format!("unknown {what} {id}")))?;
    if !player.is_alive {
        return Err(GameError::validation(format!("{what} {} is dead", player.name)));
    }
    Ok(player)
}

/// Builds a night action from an intent, or explains why it is not allowed.
///
/// Healers may protect themselves. Killers may not target themselves or a
/// fellow killer; investigators may not investigate themselves.
pub fn validate_night_action(
    actor: PlayerId,
    kind: ActionKind,
    target: PlayerId,
    roster: &[Player],
) -> Result<NightAction, GameError> {
    let actor_p = living(roster, actor, "actor")?;
    let role = actor_p
        .role
        .ok_or_else(|| GameError::validation("roles have not been dealt"))?;
    if role.night_action() != Some(kind) {
        return Err(GameError::validation(format!("a {role} cannot {}", kind.as_str())));
    }
    let target_p = living(roster, target, "target")?;
    match kind {
        ActionKind::Kill if target_p.role == Some(Role::Killer) => {
            return Err(GameError::validation("killers cannot target a killer"));
        }
        ActionKind::Investigate if target == actor => {
            return Err(GameError::validation("you cannot investigate yourself"));
        }
        _ => {}
    }
    Ok(NightAction { actor, kind, target })
}

pub fn validate_vote(voter: PlayerId, target: PlayerId, roster: &[Player]) -> Result<Vote, GameError> {
    living(roster, voter, "voter")?;
    living(roster, target, "target")?;
    if voter == target {
        return Err(GameError::validation("you cannot vote for yourself"));
    }
    Ok(Vote { voter, target })
}
