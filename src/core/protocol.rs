/// Wire protocol between the host and its viewers.
///
/// Every frame is one JSON object tagged by `"type"`, e.g.
/// `{"type":"cast_vote","target":3}`. Both enums are closed; anything that
/// fails to decode is rejected at the transport before the engine sees it.
use serde::{Deserialize, Serialize};

use crate::core::game::{Phase, PlayerId};
use crate::error::ErrorKind;
use crate::mafia::night::Verdict;
use crate::mafia::roles::{ActionKind, Faction, Role, RoleConfiguration};
use crate::mafia::session::{FinalPlayer, PlayerView};
use crate::mafia::vote::VoteResult;

/// Intents sent by a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        name: String,
    },
    /// Host only. Without a config the recommended deal for the table is used.
    StartGame {
        #[serde(default)]
        config: Option<RoleConfiguration>,
    },
    SubmitNightAction {
        kind: ActionKind,
        target: PlayerId,
    },
    CastVote {
        target: PlayerId,
    },
    SetReady {
        ready: bool,
    },
    RequestCurrentState,
    Leave,
    /// Host only
    SkipPhase,
    /// Host only: back to the lobby with the same group
    Restart,
    /// Host only: back to the lobby, optionally dismissing everyone else
    ReturnToLobby {
        #[serde(default)]
        new_group: bool,
    },
}

impl ClientMessage {
    /// Intent name used in logs and rejections.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::StartGame { .. } => "start_game",
            Self::SubmitNightAction { .. } => "submit_night_action",
            Self::CastVote { .. } => "cast_vote",
            Self::SetReady { .. } => "set_ready",
            Self::RequestCurrentState => "request_current_state",
            Self::Leave => "leave",
            Self::SkipPhase => "skip_phase",
            Self::Restart => "restart",
            Self::ReturnToLobby { .. } => "return_to_lobby",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub submitted: usize,
    pub required: usize,
}

/// Everything a (re)connecting viewer needs to render the current screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub phase: Phase,
    pub round: u32,
    pub players: Vec<PlayerView>,
    /// The receiver's own seat, if they have one
    pub you: Option<PlayerId>,
    /// The receiver's own role, never anyone else's
    pub role: Option<Role>,
    pub remaining_ms: Option<u64>,
    pub progress: Option<Progress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// The host left or lost their connection
    HostLeft,
    /// The host started over with a new group; join again to play
    Regrouped,
    /// The host hit an internal error and stopped
    InternalError,
    /// The host process is shutting down
    Shutdown,
}

/// Events pushed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        player_id: PlayerId,
        is_host: bool,
    },
    RosterUpdated {
        players: Vec<PlayerView>,
    },
    RoleAssigned {
        role: Role,
    },
    PhaseChanged {
        phase: Phase,
        round: u32,
        duration_ms: Option<u64>,
    },
    Progress(Progress),
    NightResolved {
        deaths: Vec<PlayerId>,
        saved: Vec<PlayerId>,
        narrative: Vec<String>,
    },
    InvestigationResult {
        target: PlayerId,
        verdict: Verdict,
    },
    VoteResolved {
        result: VoteResult,
    },
    GameOver {
        winner: Faction,
        narrative: String,
        final_roster: Vec<FinalPlayer>,
    },
    ActionRejected {
        kind: ErrorKind,
        context: String,
    },
    StateSnapshot(StateSnapshot),
    SessionEnded {
        reason: SessionEndReason,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let msg: ClientMessage = serde_json::from_value(json!({"type": "cast_vote", "target": 3})).unwrap();
        assert_eq!(msg, ClientMessage::CastVote { target: PlayerId(3) });

        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "submit_night_action",
            "kind": "investigate",
            "target": 2
        }))
        .unwrap();
        assert_eq!(msg, ClientMessage::SubmitNightAction { kind: ActionKind::Investigate, target: PlayerId(2) });

        let msg: ClientMessage = serde_json::from_value(json!({"type": "request_current_state"})).unwrap();
        assert_eq!(msg.name(), "request_current_state");
    }

    #[test]
    fn optional_fields_default() {
        let msg: ClientMessage = serde_json::from_value(json!({"type": "start_game"})).unwrap();
        assert_eq!(msg, ClientMessage::StartGame { config: None });
        let msg: ClientMessage = serde_json::from_value(json!({"type": "return_to_lobby"})).unwrap();
        assert_eq!(msg, ClientMessage::ReturnToLobby { new_group: false });
    }

    #[test]
    fn start_game_config_shape() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "start_game",
            "config": {"total_players": 6, "killers": 1, "healers": 1}
        }))
        .unwrap();
        let ClientMessage::StartGame { config: Some(rc) } = msg else {
            panic!("unexpected {msg:?}");
        };
        assert_eq!(rc.investigators, 0);
        assert_eq!(rc.townspeople(), Some(4));
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"teleport"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"cast_vote"}"#).is_err());
    }

    #[test]
    fn server_messages_flatten_newtype_payloads() {
        let value = serde_json::to_value(ServerMessage::Progress(Progress { submitted: 1, required: 3 })).unwrap();
        assert_eq!(value, json!({"type": "progress", "submitted": 1, "required": 3}));

        let value = serde_json::to_value(ServerMessage::PhaseChanged {
            phase: Phase::RoleReveal,
            round: 0,
            duration_ms: Some(8000),
        })
        .unwrap();
        assert_eq!(value["type"], "phase_changed");
        assert_eq!(value["phase"], "role_reveal");
    }

    #[test]
    fn rejection_carries_error_kind() {
        let value = serde_json::to_value(ServerMessage::ActionRejected {
            kind: ErrorKind::PhaseViolation,
            context: "cast_vote is not allowed during night".into(),
        })
        .unwrap();
        assert_eq!(value["type"], "action_rejected");
        assert_eq!(value["kind"], "phase_violation");
    }

    #[test]
    fn session_end_round_trips() {
        let text = serde_json::to_string(&ServerMessage::SessionEnded { reason: SessionEndReason::HostLeft }).unwrap();
        assert_eq!(text, r#"{"type":"session_ended","reason":"host_left"}"#);
    }
}
