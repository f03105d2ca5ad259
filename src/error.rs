//! Error types for the session engine.
//!
//! `GameError` is what the engine reports back to a client in an
//! `action_rejected` message. Only [`GameError::InvariantBreach`] is fatal:
//! it halts the session and the host has to restart.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::game::Phase;

/// Wire-level classification of a rejected intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    PhaseViolation,
    Permission,
    ConfigurationMismatch,
    Internal,
}

/// Errors produced while handling an intent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Malformed name, out-of-range role configuration or malformed action.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Intent arrived in a phase that does not accept it.
    #[error("{intent} is not allowed during {phase}")]
    PhaseViolation {
        intent: &'static str,
        phase: Phase,
    },

    /// Non-host issued a host-only command.
    #[error("only the host may {0}")]
    Permission(&'static str),

    /// Role list and roster disagree.
    #[error("role configuration mismatch: {roles} roles for {players} players")]
    ConfigurationMismatch { roles: usize, players: usize },

    /// Session state is corrupt; the session cannot continue.
    #[error("session invariant violated: {0}")]
    InvariantBreach(String),
}

impl GameError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::PhaseViolation { .. } => ErrorKind::PhaseViolation,
            Self::Permission(_) => ErrorKind::Permission,
            Self::ConfigurationMismatch { .. } => ErrorKind::ConfigurationMismatch,
            Self::InvariantBreach(_) => ErrorKind::Internal,
        }
    }

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantBreach(_))
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
