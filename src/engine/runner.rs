//! The phase controller: single writer of [`SessionState`].
//!
//! Every inbound event and every timer expiry is handled on one task, one at
//! a time. A handler validates first, then mutates, then emits deliveries, so
//! a rejected intent never leaves a trace in the session. Phase ends are keyed
//! by the session's phase generation; only the first end for a given
//! generation is honored.

use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::timer::PhaseTimer;
use super::{Delivery, EndCause, EngineEvent, PhaseEnd, Recipient};
use crate::config::EngineConfig;
use crate::core::game::{ConnectionId, Phase, PlayerId};
use crate::core::protocol::{ClientMessage, Progress, ServerMessage, SessionEndReason, StateSnapshot};
use crate::error::GameError;
use crate::mafia::random::Randomizer;
use crate::mafia::roles::{ActionKind, Faction, RoleAssigner, RoleConfiguration};
use crate::mafia::session::{ResetMode, SessionState};
use crate::mafia::{night, validation, vote, win};

enum Step {
    Event(EngineEvent),
    PhaseEnd(PhaseEnd),
    Closed,
}

pub struct PhaseController<R = StdRng> {
    state: SessionState,
    config: EngineConfig,
    randomizer: Randomizer<R>,
    timer: PhaseTimer,
    outbound: mpsc::UnboundedSender<Delivery>,
    timer_tx: mpsc::UnboundedSender<PhaseEnd>,
    timer_rx: mpsc::UnboundedReceiver<PhaseEnd>,
}

impl<R: Rng> PhaseController<R> {
    pub fn new(config: EngineConfig, randomizer: Randomizer<R>, outbound: mpsc::UnboundedSender<Delivery>) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        Self {
            state: SessionState::new(),
            config,
            randomizer,
            timer: PhaseTimer::default(),
            outbound,
            timer_tx,
            timer_rx,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Runs until the inbound queue closes. Returns the breach if the session
    /// state is ever found corrupt; the session cannot continue after that.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<EngineEvent>) -> Result<(), GameError> {
        info!("phase controller started");
        loop {
            let step = tokio::select! {
                event = inbound.recv() => event.map_or(Step::Closed, Step::Event),
                Some(end) = self.timer_rx.recv() => Step::PhaseEnd(end),
            };
            let outcome = match step {
                Step::Event(event) => self.handle_event(event),
                Step::PhaseEnd(end) => self.end_phase(end.generation, end.cause),
                Step::Closed => break,
            };
            if let Err(breach) = outcome {
                error!(error = %breach, phase = %self.state.phase(), "halting session");
                self.timer.cancel();
                self.broadcast(ServerMessage::SessionEnded { reason: SessionEndReason::InternalError });
                return Err(breach);
            }
        }
        self.timer.cancel();
        info!("phase controller stopped");
        Ok(())
    }

    /// Handles one event. Recoverable errors go back to the sender; the
    /// returned error is always fatal.
    pub fn handle_event(&mut self, event: EngineEvent) -> Result<(), GameError> {
        let result = match event {
            EngineEvent::Intent { connection, message } => {
                let intent = message.name();
                match self.handle_intent(connection, message) {
                    Err(err) if !err.is_fatal() => {
                        self.reject(connection, intent, &err);
                        Ok(())
                    }
                    other => other,
                }
            }
            EngineEvent::Disconnected { connection } => self.handle_disconnect(connection),
        };
        result.and_then(|()| self.state.check_invariants())
    }

    fn handle_intent(&mut self, connection: ConnectionId, message: ClientMessage) -> Result<(), GameError> {
        debug!(%connection, intent = message.name(), phase = %self.state.phase(), "intent received");
        match message {
            ClientMessage::Join { name } => self.join(connection, &name),
            ClientMessage::StartGame { config } => self.start_game(connection, config),
            ClientMessage::SubmitNightAction { kind, target } => self.submit_night_action(connection, kind, target),
            ClientMessage::CastVote { target } => self.cast_vote(connection, target),
            ClientMessage::SetReady { ready } => self.set_ready(connection, ready),
            ClientMessage::RequestCurrentState => {
                self.send_snapshot(connection);
                Ok(())
            }
            ClientMessage::Leave => self.handle_disconnect(connection),
            ClientMessage::SkipPhase => self.skip_phase(connection),
            ClientMessage::Restart => {
                self.require_host(connection, "restart the game")?;
                self.require_phase(Phase::GameOver, "restart")?;
                self.return_to_lobby(ResetMode::SameGroup);
                Ok(())
            }
            ClientMessage::ReturnToLobby { new_group } => {
                self.require_host(connection, "return to the lobby")?;
                self.require_phase(Phase::GameOver, "return_to_lobby")?;
                let mode = if new_group { ResetMode::NewGroup } else { ResetMode::SameGroup };
                self.return_to_lobby(mode);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    fn join(&mut self, connection: ConnectionId, raw_name: &str) -> Result<(), GameError> {
        if self.state.phase() != Phase::Lobby {
            return self.reclaim_seat(connection, raw_name);
        }
        if self.state.players().len() >= self.config.players.max {
            return Err(GameError::validation(format!(
                "the table is full ({} players)",
                self.config.players.max
            )));
        }
        let name = validation::validate_name(raw_name, self.state.players(), &self.config)?;
        let id = self.state.join(connection, name)?;
        let is_host = self.state.is_host(connection);
        self.send(connection, ServerMessage::Welcome { player_id: id, is_host });
        self.broadcast_roster();
        Ok(())
    }

    /// Mid-game join: only a disconnected player taking back their own seat.
    fn reclaim_seat(&mut self, connection: ConnectionId, raw_name: &str) -> Result<(), GameError> {
        let name = raw_name.trim();
        let seat = self
            .state
            .players()
            .iter()
            .find(|p| !p.is_connected && p.name.eq_ignore_ascii_case(name))
            .map(|p| (p.id, p.role));
        let Some((id, role)) = seat else {
            return Err(GameError::PhaseViolation { intent: "join", phase: self.state.phase() });
        };
        // A socket that left may come back to its own seat.
        if self.state.player_by_connection(connection).is_some_and(|p| p.id != id) {
            return Err(GameError::validation("this connection already holds a seat"));
        }
        self.state.reconnect(id, connection)?;
        self.send(connection, ServerMessage::Welcome { player_id: id, is_host: false });
        if let Some(role) = role {
            self.send(connection, ServerMessage::RoleAssigned { role });
        }
        self.send_snapshot(connection);
        self.broadcast_roster();
        self.broadcast_progress();
        Ok(())
    }

    fn start_game(&mut self, connection: ConnectionId, config: Option<RoleConfiguration>) -> Result<(), GameError> {
        self.require_host(connection, "start the game")?;
        self.require_phase(Phase::Lobby, "start_game")?;
        let seated = self.state.players().len();
        let rc = config.unwrap_or_else(|| RoleConfiguration::recommended(seated));
        validation::validate_role_config(&rc, seated, &self.config)?;

        let ids: Vec<PlayerId> = self.state.players().iter().map(|p| p.id).collect();
        let assignments = RoleAssigner::assign(&ids, &rc, &mut self.randomizer)?;
        self.state.apply_roles(&assignments)?;
        info!(
            players = seated,
            killers = rc.killers,
            healers = rc.healers,
            investigators = rc.investigators,
            "game started"
        );

        for (id, role) in &assignments {
            if let Some(player) = self.state.player(*id) {
                self.send(player.connection, ServerMessage::RoleAssigned { role: *role });
            }
        }
        self.enter(Phase::RoleReveal);
        Ok(())
    }

    fn submit_night_action(
        &mut self,
        connection: ConnectionId,
        kind: ActionKind,
        target: PlayerId,
    ) -> Result<(), GameError> {
        let actor = self.seat_of(connection)?;
        self.require_phase(Phase::Night, "submit_night_action")?;
        let action = validation::validate_night_action(actor, kind, target, self.state.players())?;
        self.state.record_action(action)?;
        debug!(%actor, kind = kind.as_str(), %target, "night action recorded");
        self.after_submission()
    }

    fn cast_vote(&mut self, connection: ConnectionId, target: PlayerId) -> Result<(), GameError> {
        let voter = self.seat_of(connection)?;
        self.require_phase(Phase::Voting, "cast_vote")?;
        let ballot = validation::validate_vote(voter, target, self.state.players())?;
        self.state.record_vote(ballot)?;
        debug!(%voter, %target, "vote recorded");
        self.after_submission()
    }

    fn set_ready(&mut self, connection: ConnectionId, ready: bool) -> Result<(), GameError> {
        let id = self.seat_of(connection)?;
        if self.state.phase() == Phase::Discussion && !self.state.player(id).is_some_and(|p| p.is_alive) {
            return Err(GameError::validation("the dead do not take part in discussion"));
        }
        self.state.set_ready(id, ready)?;
        self.broadcast_roster();
        if self.state.phase() == Phase::Discussion {
            self.after_submission()?;
        }
        Ok(())
    }

    fn skip_phase(&mut self, connection: ConnectionId) -> Result<(), GameError> {
        self.require_host(connection, "skip the phase")?;
        let phase = self.state.phase();
        if !phase.is_timed() {
            return Err(GameError::PhaseViolation { intent: "skip_phase", phase });
        }
        info!(%phase, "host skipped the phase");
        self.end_phase(self.state.generation(), EndCause::Skipped)
    }

    fn handle_disconnect(&mut self, connection: ConnectionId) -> Result<(), GameError> {
        if self.state.is_host(connection) {
            warn!(%connection, phase = %self.state.phase(), "host left, ending the session");
            self.end_session(SessionEndReason::HostLeft);
            return Ok(());
        }
        let Some(id) = self.state.disconnect(connection) else {
            return Ok(());
        };
        info!(player = %id, phase = %self.state.phase(), "player disconnected");
        self.broadcast_roster();
        self.after_submission()
    }

    /// Publishes progress and ends the phase if nobody is left to wait on.
    fn after_submission(&mut self) -> Result<(), GameError> {
        self.broadcast_progress();
        if self.state.is_phase_complete() {
            return self.end_phase(self.state.generation(), EndCause::Completed);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Ends the phase instance `generation`. Signals for any other instance
    /// (a timer that lost the race against completion, a double skip) are
    /// dropped without effect.
    pub fn end_phase(&mut self, generation: u64, cause: EndCause) -> Result<(), GameError> {
        let current = self.state.generation();
        if generation != current {
            debug!(generation, current, ?cause, "stale phase end ignored");
            return Ok(());
        }
        self.timer.cancel();
        let phase = self.state.phase();
        debug!(%phase, generation, ?cause, "phase ended");

        match phase {
            Phase::Lobby => Ok(()),
            Phase::RoleReveal | Phase::Results => {
                self.enter(Phase::Night);
                Ok(())
            }
            Phase::Night => self.resolve_night(),
            Phase::Discussion => {
                self.enter(Phase::Voting);
                Ok(())
            }
            Phase::Voting => self.resolve_votes(),
            Phase::GameOver => {
                self.return_to_lobby(ResetMode::SameGroup);
                Ok(())
            }
        }?;
        self.state.check_invariants()
    }

    fn resolve_night(&mut self) -> Result<(), GameError> {
        let result = night::resolve(&self.state.night_actions(), self.state.players());
        for id in &result.deaths {
            self.state.eliminate(*id);
        }
        info!(
            round = self.state.round(),
            deaths = result.deaths.len(),
            saved = result.saved.len(),
            healed = ?result.healed,
            investigations = result.investigations.len(),
            "night resolved"
        );

        for inv in &result.investigations {
            if let Some(investigator) = self.state.player(inv.investigator) {
                let to = investigator.connection;
                self.send(to, ServerMessage::InvestigationResult { target: inv.target, verdict: inv.verdict });
            }
        }
        self.broadcast(ServerMessage::NightResolved {
            deaths: result.deaths.clone(),
            saved: result.saved,
            narrative: result.narrative,
        });
        self.broadcast_roster();

        if !result.deaths.is_empty() {
            if let Some(winner) = win::evaluate(self.state.players()) {
                self.finish(winner);
                return Ok(());
            }
        }
        self.enter(Phase::Discussion);
        Ok(())
    }

    fn resolve_votes(&mut self) -> Result<(), GameError> {
        let result = vote::tally(&self.state.votes(), self.state.players());
        if let Some(id) = result.eliminated {
            self.state.eliminate(id);
        }
        info!(
            round = self.state.round(),
            eliminated = ?result.eliminated,
            tie = result.is_tie,
            "votes tallied"
        );
        let eliminated = result.eliminated.is_some();
        self.broadcast(ServerMessage::VoteResolved { result });
        self.broadcast_roster();

        self.enter(Phase::Results);
        if eliminated {
            if let Some(winner) = win::evaluate(self.state.players()) {
                self.finish(winner);
            }
        }
        Ok(())
    }

    fn finish(&mut self, winner: Faction) {
        info!(%winner, round = self.state.round(), "game over");
        self.enter(Phase::GameOver);
        self.broadcast(ServerMessage::GameOver {
            winner,
            narrative: win::narrative(winner).to_string(),
            final_roster: self.state.final_roster(),
        });
    }

    fn return_to_lobby(&mut self, mode: ResetMode) {
        let host = self.state.host_connection();
        let dismissed: Vec<ConnectionId> = match mode {
            ResetMode::SameGroup => Vec::new(),
            ResetMode::NewGroup => self
                .state
                .players()
                .iter()
                .filter(|p| p.is_connected && Some(p.connection) != host)
                .map(|p| p.connection)
                .collect(),
        };
        for connection in dismissed {
            self.send(connection, ServerMessage::SessionEnded { reason: SessionEndReason::Regrouped });
        }
        self.state.reset_to_lobby(mode);
        info!(?mode, players = self.state.players().len(), "back to the lobby");
        self.announce_phase();
        self.broadcast_roster();
    }

    fn end_session(&mut self, reason: SessionEndReason) {
        self.timer.cancel();
        self.broadcast(ServerMessage::SessionEnded { reason });
        self.state.clear();
    }

    fn enter(&mut self, phase: Phase) {
        self.state.enter_phase(phase);
        self.announce_phase();
    }

    /// Arms the timer for the phase just entered and tells everyone.
    fn announce_phase(&mut self) {
        let phase = self.state.phase();
        let duration = self.config.durations.for_phase(phase);
        match duration {
            Some(d) => self.timer.arm(self.state.generation(), d, self.timer_tx.clone()),
            None => self.timer.cancel(),
        }
        info!(%phase, round = self.state.round(), generation = self.state.generation(), "phase entered");
        self.broadcast(ServerMessage::PhaseChanged {
            phase,
            round: self.state.round(),
            duration_ms: duration.map(duration_ms),
        });
        self.broadcast_progress();
    }

    // ------------------------------------------------------------------
    // Guards and output
    // ------------------------------------------------------------------

    fn require_host(&self, connection: ConnectionId, action: &'static str) -> Result<(), GameError> {
        if self.state.is_host(connection) {
            Ok(())
        } else {
            Err(GameError::Permission(action))
        }
    }

    fn require_phase(&self, phase: Phase, intent: &'static str) -> Result<(), GameError> {
        if self.state.phase() == phase {
            Ok(())
        } else {
            Err(GameError::PhaseViolation { intent, phase: self.state.phase() })
        }
    }

    fn seat_of(&self, connection: ConnectionId) -> Result<PlayerId, GameError> {
        self.state
            .player_by_connection(connection)
            .filter(|p| p.is_connected)
            .map(|p| p.id)
            .ok_or_else(|| GameError::validation("join the game first"))
    }

    fn reject(&self, connection: ConnectionId, intent: &str, err: &GameError) {
        match err {
            GameError::ConfigurationMismatch { .. } => error!(%connection, intent, error = %err, "intent rejected"),
            _ => debug!(%connection, intent, error = %err, "intent rejected"),
        }
        self.send(connection, ServerMessage::ActionRejected { kind: err.kind(), context: err.to_string() });
    }

    fn snapshot_for(&self, connection: ConnectionId) -> StateSnapshot {
        let me = self.state.player_by_connection(connection);
        StateSnapshot {
            phase: self.state.phase(),
            round: self.state.round(),
            players: self.state.views(),
            you: me.map(|p| p.id),
            role: me.and_then(|p| p.role),
            remaining_ms: self.timer.remaining().map(duration_ms),
            progress: self.progress(),
        }
    }

    fn send_snapshot(&self, connection: ConnectionId) {
        self.send(connection, ServerMessage::StateSnapshot(self.snapshot_for(connection)));
    }

    fn progress(&self) -> Option<Progress> {
        self.state
            .progress()
            .map(|(submitted, required)| Progress { submitted, required })
    }

    fn broadcast_progress(&self) {
        if let Some(progress) = self.progress() {
            self.broadcast(ServerMessage::Progress(progress));
        }
    }

    fn broadcast_roster(&self) {
        self.broadcast(ServerMessage::RosterUpdated { players: self.state.views() });
    }

    fn send(&self, connection: ConnectionId, message: ServerMessage) {
        self.deliver(Recipient::Connection(connection), message);
    }

    fn broadcast(&self, message: ServerMessage) {
        self.deliver(Recipient::All, message);
    }

    fn deliver(&self, to: Recipient, message: ServerMessage) {
        if self.outbound.send(Delivery { to, message }).is_err() {
            debug!("transport gone, delivery dropped");
        }
    }
}

fn duration_ms(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
