//! The mutable session aggregate.
//!
//! `SessionState` is owned by exactly one `PhaseController`; every mutation
//! goes through the methods below, which enforce the phase tag on collected
//! intents and clear per-phase sets on entry.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::roles::{ActionKind, Role};
use crate::core::game::{ConnectionId, Phase, PlayerId};
use crate::error::GameError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub connection: ConnectionId,
    pub name: String,
    pub is_host: bool,
    pub is_alive: bool,
    pub is_connected: bool,
    pub is_ready: bool,
    pub role: Option<Role>,
}

impl Player {
    /// Alive and holding a role with a night action.
    pub fn can_act_at_night(&self) -> bool {
        self.is_alive && self.role.is_some_and(Role::can_act)
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            is_host: self.is_host,
            is_alive: self.is_alive,
            is_connected: self.is_connected,
            is_ready: self.is_ready,
        }
    }
}

/// What every client may know about a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub is_alive: bool,
    pub is_connected: bool,
    pub is_ready: bool,
}

/// A player as revealed at game over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalPlayer {
    pub id: PlayerId,
    pub name: String,
    pub role: Option<Role>,
    pub is_alive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightAction {
    pub actor: PlayerId,
    pub kind: ActionKind,
    pub target: PlayerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: PlayerId,
    pub target: PlayerId,
}

/// How the roster is treated when a game goes back to the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Same group, new game: connected players stay seated.
    SameGroup,
    /// Everyone but the host has to join again.
    NewGroup,
}

#[derive(Debug, Default)]
pub struct SessionState {
    players: Vec<Player>,
    phase: Phase,
    round: u32,
    generation: u64,
    night_actions: BTreeMap<PlayerId, NightAction>,
    votes: BTreeMap<PlayerId, Vote>,
    ready: BTreeSet<PlayerId>,
    host: Option<ConnectionId>,
    next_id: u32,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// Bumped on every phase entry; identifies one phase instance.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn host_connection(&self) -> Option<ConnectionId> {
        self.host
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// The seated player currently bound to `connection`, connected or not.
    pub fn player_by_connection(&self, connection: ConnectionId) -> Option<&Player> {
        self.players.iter().find(|p| p.connection == connection)
    }

    pub fn is_host(&self, connection: ConnectionId) -> bool {
        self.host == Some(connection)
    }

    pub fn views(&self) -> Vec<PlayerView> {
        self.players.iter().map(Player::view).collect()
    }

    pub fn final_roster(&self) -> Vec<FinalPlayer> {
        self.players
            .iter()
            .map(|p| FinalPlayer {
                id: p.id,
                name: p.name.clone(),
                role: p.role,
                is_alive: p.is_alive,
            })
            .collect()
    }

    pub fn night_actions(&self) -> Vec<NightAction> {
        self.night_actions.values().copied().collect()
    }

    pub fn votes(&self) -> Vec<Vote> {
        self.votes.values().copied().collect()
    }

    pub fn action_of(&self, actor: PlayerId) -> Option<&NightAction> {
        self.night_actions.get(&actor)
    }

    // ------------------------------------------------------------------
    // Completion checks. Disconnected players are never waited on.
    // ------------------------------------------------------------------

    fn night_actors(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_connected && p.can_act_at_night())
    }

    fn living_connected(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_connected && p.is_alive)
    }

    /// `(submitted, required)` for the phase currently collecting intents.
    pub fn progress(&self) -> Option<(usize, usize)> {
        match self.phase {
            Phase::Night => {
                let required: Vec<_> = self.night_actors().collect();
                let done = required.iter().filter(|p| self.night_actions.contains_key(&p.id)).count();
                Some((done, required.len()))
            }
            Phase::Discussion => {
                let required: Vec<_> = self.living_connected().collect();
                let done = required.iter().filter(|p| self.ready.contains(&p.id)).count();
                Some((done, required.len()))
            }
            Phase::Voting => {
                let required: Vec<_> = self.living_connected().collect();
                let done = required.iter().filter(|p| self.votes.contains_key(&p.id)).count();
                Some((done, required.len()))
            }
            _ => None,
        }
    }

    /// True once everyone the current phase waits on has acted. An empty
    /// required set never completes; the timer ends such a phase.
    pub fn is_phase_complete(&self) -> bool {
        matches!(self.progress(), Some((done, required)) if required > 0 && done == required)
    }

    // ------------------------------------------------------------------
    // Lobby
    // ------------------------------------------------------------------

    /// Seats a new player. The first player seated becomes host.
    pub fn join(&mut self, connection: ConnectionId, name: String) -> Result<PlayerId, GameError> {
        self.require_phase(Phase::Lobby, "join")?;
        if self.player_by_connection(connection).is_some() {
            return Err(GameError::validation("this connection has already joined"));
        }
        self.next_id += 1;
        let id = PlayerId(self.next_id);
        let is_host = self.players.is_empty();
        if is_host {
            self.host = Some(connection);
        }
        info!(player = %id, %name, is_host, "player joined");
        self.players.push(Player {
            id,
            connection,
            name,
            is_host,
            is_alive: true,
            is_connected: true,
            is_ready: false,
            role: None,
        });
        Ok(id)
    }

    /// Rebinds a disconnected seat to a new connection (reclaiming a seat mid-game).
    pub fn reconnect(&mut self, id: PlayerId, connection: ConnectionId) -> Result<(), GameError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| GameError::validation(format!("no player {id}")))?;
        if player.is_connected {
            return Err(GameError::validation(format!("{} is already connected", player.name)));
        }
        player.connection = connection;
        player.is_connected = true;
        info!(player = %id, "player reconnected");
        Ok(())
    }

    /// Lobby: the seat is removed. In game: the seat stays, marked disconnected.
    /// Returns the affected player id.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<PlayerId> {
        let idx = self.players.iter().position(|p| p.connection == connection)?;
        let id = self.players[idx].id;
        if self.phase == Phase::Lobby {
            self.players.remove(idx);
            self.ready.remove(&id);
            debug!(player = %id, "player left the lobby");
        } else {
            let p = &mut self.players[idx];
            if !p.is_connected {
                return None;
            }
            p.is_connected = false;
            p.is_ready = false;
            self.ready.remove(&id);
            debug!(player = %id, "player disconnected mid-game");
        }
        Some(id)
    }

    // ------------------------------------------------------------------
    // Game flow
    // ------------------------------------------------------------------

    /// Enters `phase`, clearing whatever that phase collects.
    pub fn enter_phase(&mut self, phase: Phase) {
        match phase {
            Phase::Night => {
                self.round += 1;
                self.night_actions.clear();
            }
            Phase::RoleReveal | Phase::Discussion => self.clear_ready(),
            Phase::Voting => self.votes.clear(),
            Phase::Lobby => {
                self.round = 0;
                self.night_actions.clear();
                self.votes.clear();
                self.clear_ready();
            }
            Phase::Results | Phase::GameOver => {}
        }
        self.phase = phase;
        self.generation += 1;
    }

    /// Binds dealt roles and resets life flags for a fresh game.
    pub fn apply_roles(&mut self, assignments: &[(PlayerId, Role)]) -> Result<(), GameError> {
        let seated = self.players.len();
        if assignments.len() != seated {
            return Err(GameError::ConfigurationMismatch {
                roles: assignments.len(),
                players: seated,
            });
        }
        for p in &mut self.players {
            let role = assignments
                .iter()
                .find(|(id, _)| *id == p.id)
                .map(|(_, role)| *role)
                .ok_or(GameError::ConfigurationMismatch {
                    roles: assignments.len(),
                    players: seated,
                })?;
            p.role = Some(role);
            p.is_alive = true;
        }
        Ok(())
    }

    /// Records a night action, replacing the actor's previous one.
    pub fn record_action(&mut self, action: NightAction) -> Result<(), GameError> {
        self.require_phase(Phase::Night, "submit_night_action")?;
        if let Some(prev) = self.night_actions.insert(action.actor, action) {
            debug!(actor = %action.actor, old = %prev.target, new = %action.target, "night action replaced");
        }
        Ok(())
    }

    /// Records a vote, replacing the voter's previous one.
    pub fn record_vote(&mut self, vote: Vote) -> Result<(), GameError> {
        self.require_phase(Phase::Voting, "cast_vote")?;
        if let Some(prev) = self.votes.insert(vote.voter, vote) {
            debug!(voter = %vote.voter, old = %prev.target, new = %vote.target, "vote replaced");
        }
        Ok(())
    }

    /// Ready flags are meaningful in the lobby and during discussion.
    pub fn set_ready(&mut self, id: PlayerId, ready: bool) -> Result<(), GameError> {
        if !matches!(self.phase, Phase::Lobby | Phase::Discussion) {
            return Err(GameError::PhaseViolation { intent: "set_ready", phase: self.phase });
        }
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| GameError::validation(format!("no player {id}")))?;
        player.is_ready = ready;
        if ready {
            self.ready.insert(id);
        } else {
            self.ready.remove(&id);
        }
        Ok(())
    }

    /// Marks a player dead. Returns false if they were already dead.
    pub fn eliminate(&mut self, id: PlayerId) -> bool {
        match self.players.iter_mut().find(|p| p.id == id) {
            Some(p) if p.is_alive => {
                p.is_alive = false;
                true
            }
            _ => false,
        }
    }

    /// Back to the lobby after a game.
    pub fn reset_to_lobby(&mut self, mode: ResetMode) {
        let host = self.host;
        self.players.retain(|p| match mode {
            ResetMode::SameGroup => p.is_connected,
            ResetMode::NewGroup => Some(p.connection) == host,
        });
        for p in &mut self.players {
            p.role = None;
            p.is_alive = true;
            p.is_ready = false;
        }
        self.enter_phase(Phase::Lobby);
    }

    /// Drops everything; used when the host leaves.
    pub fn clear(&mut self) {
        let next_id = self.next_id;
        let generation = self.generation;
        *self = Self::default();
        // Seat numbers and generations stay monotonic across sessions.
        self.next_id = next_id;
        self.generation = generation + 1;
    }

    fn clear_ready(&mut self) {
        self.ready.clear();
        for p in &mut self.players {
            p.is_ready = false;
        }
    }

    fn require_phase(&self, phase: Phase, intent: &'static str) -> Result<(), GameError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(GameError::PhaseViolation { intent, phase: self.phase })
        }
    }

    // ------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------

    /// Structural checks run after every committed mutation.
    pub fn check_invariants(&self) -> Result<(), GameError> {
        let hosts = self.players.iter().filter(|p| p.is_host).count();
        if !self.players.is_empty() && hosts != 1 {
            return Err(GameError::InvariantBreach(format!("{hosts} hosts in a non-empty session")));
        }
        if let Some(host) = self.players.iter().find(|p| p.is_host) {
            if Some(host.connection) != self.host {
                return Err(GameError::InvariantBreach("host flag and host connection disagree".into()));
            }
        }
        let ids: BTreeSet<_> = self.players.iter().map(|p| p.id).collect();
        if ids.len() != self.players.len() {
            return Err(GameError::InvariantBreach("duplicate player id".into()));
        }
        if !matches!(self.phase, Phase::Lobby) && self.players.iter().any(|p| p.role.is_none()) {
            return Err(GameError::InvariantBreach(format!(
                "player without a role during {}",
                self.phase
            )));
        }
        if matches!(self.phase, Phase::Lobby | Phase::RoleReveal) && !self.night_actions.is_empty() {
            return Err(GameError::InvariantBreach("night actions outside a round".into()));
        }
        if self.ready.iter().any(|id| !ids.contains(id)) {
            return Err(GameError::InvariantBreach("ready flag for an unknown player".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn lobby_with(n: usize) -> (SessionState, Vec<ConnectionId>) {
        let mut s = SessionState::new();
        let conns: Vec<_> = (0..n).map(|_| Uuid::new_v4()).collect();
        for (i, c) in conns.iter().enumerate() {
            s.join(*c, format!("p{i}")).unwrap();
        }
        (s, conns)
    }

    fn deal(s: &mut SessionState, roles: &[Role]) {
        let assignments: Vec<_> = s.players().iter().map(|p| p.id).zip(roles.iter().copied()).collect();
        s.apply_roles(&assignments).unwrap();
    }

    #[test]
    fn first_joiner_is_host() {
        let (s, conns) = lobby_with(3);
        assert!(s.players()[0].is_host);
        assert!(!s.players()[1].is_host);
        assert!(s.is_host(conns[0]));
        s.check_invariants().unwrap();
    }

    #[test]
    fn join_outside_lobby_is_phase_violation() {
        let (mut s, _) = lobby_with(3);
        deal(&mut s, &[Role::Killer, Role::Healer, Role::Townsperson]);
        s.enter_phase(Phase::RoleReveal);
        let err = s.join(Uuid::new_v4(), "late".into()).unwrap_err();
        assert_eq!(err, GameError::PhaseViolation { intent: "join", phase: Phase::RoleReveal });
    }

    #[test]
    fn lobby_leave_removes_in_game_leave_marks_disconnected() {
        let (mut s, conns) = lobby_with(4);
        assert_eq!(s.disconnect(conns[3]), Some(PlayerId(4)));
        assert_eq!(s.players().len(), 3);

        deal(&mut s, &[Role::Killer, Role::Townsperson, Role::Townsperson]);
        s.enter_phase(Phase::Night);
        assert_eq!(s.disconnect(conns[2]), Some(PlayerId(3)));
        assert_eq!(s.players().len(), 3);
        let p = s.player(PlayerId(3)).unwrap();
        assert!(!p.is_connected);
        assert_eq!(p.role, Some(Role::Townsperson));
        // A second disconnect of the same seat changes nothing.
        assert_eq!(s.disconnect(conns[2]), None);
    }

    #[test]
    fn night_actions_are_last_write_wins() {
        let (mut s, _) = lobby_with(3);
        deal(&mut s, &[Role::Killer, Role::Healer, Role::Townsperson]);
        s.enter_phase(Phase::Night);
        s.record_action(NightAction { actor: PlayerId(1), kind: ActionKind::Kill, target: PlayerId(2) }).unwrap();
        s.record_action(NightAction { actor: PlayerId(1), kind: ActionKind::Kill, target: PlayerId(3) }).unwrap();
        assert_eq!(s.night_actions().len(), 1);
        assert_eq!(s.action_of(PlayerId(1)).unwrap().target, PlayerId(3));
    }

    #[test]
    fn votes_are_last_write_wins_and_cleared_on_entry() {
        let (mut s, _) = lobby_with(3);
        deal(&mut s, &[Role::Killer, Role::Healer, Role::Townsperson]);
        s.enter_phase(Phase::Voting);
        s.record_vote(Vote { voter: PlayerId(2), target: PlayerId(1) }).unwrap();
        s.record_vote(Vote { voter: PlayerId(2), target: PlayerId(3) }).unwrap();
        assert_eq!(s.votes(), vec![Vote { voter: PlayerId(2), target: PlayerId(3) }]);

        s.enter_phase(Phase::Results);
        s.enter_phase(Phase::Night);
        s.enter_phase(Phase::Discussion);
        s.enter_phase(Phase::Voting);
        assert!(s.votes().is_empty());
    }

    #[test]
    fn vote_during_night_is_rejected_without_mutation() {
        let (mut s, _) = lobby_with(3);
        deal(&mut s, &[Role::Killer, Role::Healer, Role::Townsperson]);
        s.enter_phase(Phase::Night);
        let err = s.record_vote(Vote { voter: PlayerId(2), target: PlayerId(1) }).unwrap_err();
        assert_eq!(err, GameError::PhaseViolation { intent: "cast_vote", phase: Phase::Night });
        assert!(s.votes().is_empty());
    }

    #[test]
    fn night_completion_counts_only_connected_actors() {
        let (mut s, conns) = lobby_with(4);
        deal(&mut s, &[Role::Killer, Role::Healer, Role::Townsperson, Role::Townsperson]);
        s.enter_phase(Phase::Night);
        assert_eq!(s.progress(), Some((0, 2)));
        s.record_action(NightAction { actor: PlayerId(1), kind: ActionKind::Kill, target: PlayerId(3) }).unwrap();
        assert!(!s.is_phase_complete());
        s.disconnect(conns[1]);
        assert_eq!(s.progress(), Some((1, 1)));
        assert!(s.is_phase_complete());
    }

    #[test]
    fn ready_cleared_on_discussion_entry() {
        let (mut s, _) = lobby_with(3);
        s.set_ready(PlayerId(2), true).unwrap();
        deal(&mut s, &[Role::Killer, Role::Healer, Role::Townsperson]);
        s.enter_phase(Phase::Night);
        s.enter_phase(Phase::Discussion);
        assert_eq!(s.progress(), Some((0, 3)));
        assert!(!s.player(PlayerId(2)).unwrap().is_ready);
    }

    #[test]
    fn roles_for_strangers_are_a_configuration_mismatch() {
        let (mut s, _) = lobby_with(3);
        let assignments = [
            (PlayerId(1), Role::Killer),
            (PlayerId(2), Role::Healer),
            (PlayerId(9), Role::Townsperson),
        ];
        let err = s.apply_roles(&assignments).unwrap_err();
        assert_eq!(err, GameError::ConfigurationMismatch { roles: 3, players: 3 });

        let err = s.apply_roles(&assignments[..2]).unwrap_err();
        assert_eq!(err, GameError::ConfigurationMismatch { roles: 2, players: 3 });
    }

    #[test]
    fn lobby_readiness_does_not_survive_the_deal() {
        let (mut s, _) = lobby_with(3);
        s.set_ready(PlayerId(1), true).unwrap();
        s.set_ready(PlayerId(3), true).unwrap();
        deal(&mut s, &[Role::Killer, Role::Healer, Role::Townsperson]);
        s.enter_phase(Phase::RoleReveal);
        assert!(s.views().iter().all(|p| !p.is_ready));
        s.enter_phase(Phase::Night);
        assert!(s.views().iter().all(|p| !p.is_ready));
    }

    #[test]
    fn round_counts_nights_and_resets_in_lobby() {
        let (mut s, _) = lobby_with(3);
        deal(&mut s, &[Role::Killer, Role::Healer, Role::Townsperson]);
        s.enter_phase(Phase::Night);
        s.enter_phase(Phase::Night);
        assert_eq!(s.round(), 2);
        s.reset_to_lobby(ResetMode::SameGroup);
        assert_eq!(s.round(), 0);
        assert!(s.players().iter().all(|p| p.role.is_none() && p.is_alive));
    }

    #[test]
    fn new_group_reset_keeps_only_host() {
        let (mut s, conns) = lobby_with(4);
        deal(&mut s, &[Role::Killer, Role::Healer, Role::Townsperson, Role::Townsperson]);
        s.enter_phase(Phase::GameOver);
        s.reset_to_lobby(ResetMode::NewGroup);
        assert_eq!(s.players().len(), 1);
        assert_eq!(s.players()[0].connection, conns[0]);
        s.check_invariants().unwrap();
    }

    #[test]
    fn same_group_reset_drops_disconnected() {
        let (mut s, conns) = lobby_with(4);
        deal(&mut s, &[Role::Killer, Role::Healer, Role::Townsperson, Role::Townsperson]);
        s.enter_phase(Phase::Night);
        s.disconnect(conns[3]);
        s.enter_phase(Phase::GameOver);
        s.reset_to_lobby(ResetMode::SameGroup);
        assert_eq!(s.players().len(), 3);
    }

    #[test]
    fn generation_increases_on_every_entry() {
        let mut s = SessionState::new();
        let g0 = s.generation();
        s.enter_phase(Phase::Lobby);
        assert_eq!(s.generation(), g0 + 1);
        s.clear();
        assert!(s.generation() > g0 + 1);
    }

    #[test]
    fn reconnect_rebinds_seat() {
        let (mut s, conns) = lobby_with(3);
        deal(&mut s, &[Role::Killer, Role::Healer, Role::Townsperson]);
        s.enter_phase(Phase::Night);
        s.disconnect(conns[2]);
        let fresh = Uuid::new_v4();
        s.reconnect(PlayerId(3), fresh).unwrap();
        assert_eq!(s.player_by_connection(fresh).unwrap().id, PlayerId(3));
        assert!(s.reconnect(PlayerId(3), Uuid::new_v4()).is_err());
    }

    #[test]
    fn missing_role_outside_lobby_breaks_invariants() {
        let (mut s, _) = lobby_with(3);
        s.enter_phase(Phase::Night);
        assert!(matches!(s.check_invariants(), Err(GameError::InvariantBreach(_))));
    }
}
