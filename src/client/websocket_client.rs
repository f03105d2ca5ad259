/// Line-oriented viewer: typed commands become intents, server events become
/// colored lines. Holds no game truth beyond what the host last said.
use anyhow::{Context, Result};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::core::game::{Phase, PlayerId};
use crate::core::protocol::{ClientMessage, ServerMessage, SessionEndReason};
use crate::core::terminal::{TerminalColor, TerminalContext};
use crate::mafia::night::Verdict;
use crate::mafia::roles::{ActionKind, Role, RoleConfiguration};
use crate::mafia::session::PlayerView;

const HELP: &[&str] = &[
    "commands:",
    "  ready | unready            toggle ready (lobby, discussion)",
    "  kill|heal|investigate <p>  night action; <p> is a seat number or name",
    "  vote <p>                   cast or change your vote",
    "  state                      ask the host for a full snapshot",
    "  start [killers healers investigators]   host: deal roles and begin",
    "  skip | restart | lobby [new]            host controls",
    "  quit                       leave the table",
];

/// What the viewer remembers between events.
#[derive(Debug, Default, Clone)]
pub struct ClientView {
    pub me: Option<PlayerId>,
    pub is_host: bool,
    pub role: Option<Role>,
    pub phase: Phase,
    pub round: u32,
    pub players: Vec<PlayerView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(ClientMessage),
    Help,
    Quit,
}

impl ClientView {
    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::Welcome { player_id, is_host } => {
                self.me = Some(*player_id);
                self.is_host = *is_host;
            }
            ServerMessage::RosterUpdated { players } => self.players = players.clone(),
            ServerMessage::RoleAssigned { role } => self.role = Some(*role),
            ServerMessage::PhaseChanged { phase, round, .. } => {
                self.phase = *phase;
                self.round = *round;
                if *phase == Phase::Lobby {
                    self.role = None;
                }
            }
            ServerMessage::StateSnapshot(snap) => {
                self.phase = snap.phase;
                self.round = snap.round;
                self.players = snap.players.clone();
                self.me = snap.you.or(self.me);
                self.role = snap.role;
            }
            ServerMessage::SessionEnded { .. } => *self = Self::default(),
            _ => {}
        }
    }

    fn name_of(&self, id: PlayerId) -> String {
        self.players
            .iter()
            .find(|p| p.id == id)
            .map_or_else(|| id.to_string(), |p| p.name.clone())
    }

    /// Resolves a seat number (`3` or `#3`) or a name to a player id.
    fn resolve_target(&self, token: &str) -> Result<PlayerId, String> {
        if let Ok(n) = token.trim_start_matches('#').parse::<u32>() {
            return Ok(PlayerId(n));
        }
        self.players
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(token))
            .map(|p| p.id)
            .ok_or_else(|| format!("no player called '{token}'"))
    }

    /// Lines to print for one server event.
    pub fn describe(&self, message: &ServerMessage) -> Vec<(String, TerminalColor)> {
        match message {
            ServerMessage::Welcome { player_id, is_host } => {
                let mut lines = vec![(format!("Seated as {player_id}."), TerminalColor::Green)];
                if *is_host {
                    lines.push(("You are the host. Type `start` when everyone is in.".into(), TerminalColor::Green));
                }
                lines
            }
            ServerMessage::RosterUpdated { players } => vec![(format!("Table: {}", roster_line(players)), TerminalColor::Default)],
            ServerMessage::RoleAssigned { role } => {
                let mut lines = vec![(format!("Your role: {role}"), TerminalColor::Magenta)];
                if let Some(kind) = role.night_action() {
                    lines.push((format!("At night, type `{} <player>`.", kind.as_str()), TerminalColor::Magenta));
                }
                lines
            }
            ServerMessage::PhaseChanged { phase, round, duration_ms } => {
                let mut header = format!("== {phase}");
                if *round > 0 {
                    header.push_str(&format!(" · round {round}"));
                }
                if let Some(ms) = duration_ms {
                    header.push_str(&format!(" · {}s", ms / 1000));
                }
                header.push_str(" ==");
                let mut lines = vec![(header, TerminalColor::Cyan)];
                if let Some(hint) = self.phase_hint(*phase) {
                    lines.push((hint, TerminalColor::Default));
                }
                lines
            }
            ServerMessage::Progress(p) => vec![(format!("{}/{} done", p.submitted, p.required), TerminalColor::Default)],
            ServerMessage::NightResolved { narrative, .. } => {
                narrative.iter().map(|line| (line.clone(), TerminalColor::Yellow)).collect()
            }
            ServerMessage::InvestigationResult { target, verdict } => vec![(
                format!("Your investigation: {} looks {}.", self.name_of(*target), verdict_word(*verdict)),
                TerminalColor::Magenta,
            )],
            ServerMessage::VoteResolved { result } => {
                let mut lines: Vec<_> = result
                    .counts
                    .iter()
                    .map(|c| (format!("  {}: {}", self.name_of(c.target), c.votes), TerminalColor::Default))
                    .collect();
                lines.push((result.narrative.clone(), TerminalColor::Yellow));
                lines
            }
            ServerMessage::GameOver { winner, narrative, final_roster } => {
                let color = if self.role.map(Role::faction) == Some(*winner) { TerminalColor::Green } else { TerminalColor::Red };
                let mut lines = vec![(narrative.clone(), color)];
                for p in final_roster {
                    let role = p.role.map_or_else(|| "?".to_string(), |r| r.to_string());
                    let fate = if p.is_alive { "survived" } else { "dead" };
                    lines.push((format!("  {} {}: {role}, {fate}", p.id, p.name), TerminalColor::Default));
                }
                if self.is_host {
                    lines.push(("Type `restart` or `lobby new` to go again.".into(), TerminalColor::Default));
                }
                lines
            }
            ServerMessage::ActionRejected { context, .. } => vec![(format!("✗ {context}"), TerminalColor::Red)],
            ServerMessage::StateSnapshot(snap) => {
                let mut lines = vec![(format!("Phase: {} (round {})", snap.phase, snap.round), TerminalColor::Cyan)];
                lines.push((format!("Table: {}", roster_line(&snap.players)), TerminalColor::Default));
                if let Some(role) = snap.role {
                    lines.push((format!("Your role: {role}"), TerminalColor::Magenta));
                }
                if let Some(p) = snap.progress {
                    lines.push((format!("{}/{} done", p.submitted, p.required), TerminalColor::Default));
                }
                lines
            }
            ServerMessage::SessionEnded { reason } => vec![(end_reason(*reason).to_string(), TerminalColor::Red)],
        }
    }

    fn phase_hint(&self, phase: Phase) -> Option<String> {
        let alive = self
            .me
            .and_then(|me| self.players.iter().find(|p| p.id == me))
            .map_or(true, |p| p.is_alive);
        if !alive {
            return None;
        }
        match phase {
            Phase::Night => self
                .role
                .and_then(Role::night_action)
                .map(|kind| format!("Choose: `{} <player>`", kind.as_str())),
            Phase::Discussion => Some("Talk it over, then type `ready`.".into()),
            Phase::Voting => Some("Type `vote <player>`.".into()),
            _ => None,
        }
    }
}

fn roster_line(players: &[PlayerView]) -> String {
    players
        .iter()
        .map(|p| {
            let mut tags = Vec::new();
            if p.is_host {
                tags.push("host");
            }
            if !p.is_alive {
                tags.push("dead");
            }
            if !p.is_connected {
                tags.push("away");
            }
            if p.is_ready {
                tags.push("ready");
            }
            if tags.is_empty() {
                format!("{} {}", p.id, p.name)
            } else {
                format!("{} {} ({})", p.id, p.name, tags.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn verdict_word(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Suspicious => "suspicious",
        Verdict::Innocent => "innocent",
    }
}

fn end_reason(reason: SessionEndReason) -> &'static str {
    match reason {
        SessionEndReason::HostLeft => "The host left. The session is over.",
        SessionEndReason::Regrouped => "The host started a new group. Join again to play.",
        SessionEndReason::InternalError => "The host hit an error and stopped.",
        SessionEndReason::Shutdown => "The host shut down.",
    }
}

/// Turns one typed line into a command for the host.
pub fn parse_command(line: &str, view: &ClientView) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("type `help` for commands".into());
    };
    let args: Vec<&str> = words.collect();
    let target = || -> Result<PlayerId, String> {
        let token = args.first().ok_or("who? give a seat number or a name")?;
        view.resolve_target(token)
    };

    let message = match verb.to_ascii_lowercase().as_str() {
        "help" | "?" => return Ok(Command::Help),
        "quit" | "exit" | "leave" => return Ok(Command::Quit),
        "ready" => ClientMessage::SetReady { ready: true },
        "unready" => ClientMessage::SetReady { ready: false },
        "state" => ClientMessage::RequestCurrentState,
        "skip" => ClientMessage::SkipPhase,
        "restart" => ClientMessage::Restart,
        "lobby" => ClientMessage::ReturnToLobby { new_group: args.first() == Some(&"new") },
        "vote" => ClientMessage::CastVote { target: target()? },
        "kill" => ClientMessage::SubmitNightAction { kind: ActionKind::Kill, target: target()? },
        "heal" => ClientMessage::SubmitNightAction { kind: ActionKind::Heal, target: target()? },
        "investigate" | "inv" => ClientMessage::SubmitNightAction {
            kind: ActionKind::Investigate,
            target: target()?,
        },
        "start" => {
            let config = match args.as_slice() {
                [] => None,
                [k, h, i] => {
                    let count = |s: &str| s.parse::<usize>().map_err(|_| format!("'{s}' is not a count"));
                    Some(RoleConfiguration {
                        total_players: view.players.len(),
                        killers: count(*k)?,
                        healers: count(*h)?,
                        investigators: count(*i)?,
                    })
                }
                _ => return Err("usage: start [killers healers investigators]".into()),
            };
            ClientMessage::StartGame { config }
        }
        other => return Err(format!("unknown command '{other}', type `help`")),
    };
    Ok(Command::Send(message))
}

/// Accepts `host:port` or a full `ws://` URL.
pub fn ws_url(addr: &str) -> String {
    if addr.starts_with("ws://") || addr.starts_with("wss://") {
        addr.to_string()
    } else {
        format!("ws://{addr}")
    }
}

pub struct ViewerClient {
    name: String,
    view: ClientView,
}

impl ViewerClient {
    pub fn new(name: String) -> Self {
        Self { name, view: ClientView::default() }
    }

    /// Connects, joins, and runs until the user quits or the host goes away.
    pub async fn connect_and_play(&mut self, addr: &str) -> Result<()> {
        let url = ws_url(addr);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("could not connect to {url}"))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut term = TerminalContext::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        send(&mut ws_sender, &ClientMessage::Join { name: self.name.clone() }).await?;
        term.print_line("Connected. Type `help` for commands.")?;
        term.flush()?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        send(&mut ws_sender, &ClientMessage::Leave).await?;
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_command(&line, &self.view) {
                        Ok(Command::Send(message)) => send(&mut ws_sender, &message).await?,
                        Ok(Command::Help) => {
                            for h in HELP {
                                term.print_line(h)?;
                            }
                        }
                        Ok(Command::Quit) => {
                            send(&mut ws_sender, &ClientMessage::Leave).await?;
                            let _ = ws_sender.close().await;
                            break;
                        }
                        Err(problem) => term.print_colored_line(&problem, TerminalColor::Red)?,
                    }
                    term.flush()?;
                }

                frame = ws_receiver.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let message = match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!(error = %e, "unreadable server message");
                                continue;
                            }
                        };
                        // Describe before applying so endings still know who we were.
                        for (text, color) in self.view.describe(&message) {
                            term.print_colored_line(&text, color)?;
                        }
                        term.flush()?;
                        let ended = matches!(message, ServerMessage::SessionEnded { .. });
                        self.view.apply(&message);
                        if ended {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("host closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("connection to host failed"),
                },
            }
        }
        Ok(())
    }
}

async fn send<S>(sink: &mut S, message: &ClientMessage) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let json = serde_json::to_string(message)?;
    sink.send(Message::Text(json)).await.context("failed to send to host")?;
    Ok(())
}
