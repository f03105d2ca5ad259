pub mod core {
    pub mod game;
    pub mod protocol;
    pub mod terminal;
    pub mod websocket;
    pub mod websocket_host;
}

pub mod client {
    pub mod websocket_client;
}

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod mafia;

// Re-export for convenience
pub use crate::config::EngineConfig;
pub use crate::core::game::{ConnectionId, Phase, PlayerId};
pub use crate::error::GameError;
