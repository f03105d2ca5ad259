//! The session engine: one controller task that owns all game state.
//!
//! The transport pushes [`EngineEvent`]s into a bounded queue and drains
//! [`Delivery`]s from an unbounded one; the controller never waits on a socket.

pub mod runner;
pub mod timer;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::core::game::ConnectionId;
use crate::core::protocol::{ClientMessage, ServerMessage};
use crate::error::GameError;
use crate::mafia::random::Randomizer;

pub use runner::PhaseController;

/// Inbound queue depth; transports wait when the controller falls this far behind.
pub const INBOUND_CAPACITY: usize = 256;

/// What the transport feeds the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Intent {
        connection: ConnectionId,
        message: ClientMessage,
    },
    Disconnected {
        connection: ConnectionId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Connection(ConnectionId),
}

/// One outbound message and who should get it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: Recipient,
    pub message: ServerMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCause {
    Timer,
    /// Everyone the phase waits on has acted
    Completed,
    /// Host skipped the phase
    Skipped,
}

/// Request to end the phase instance identified by `generation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseEnd {
    pub generation: u64,
    pub cause: EndCause,
}

/// A running controller and the transport's ends of its channels.
pub struct EngineHandle {
    pub events: mpsc::Sender<EngineEvent>,
    pub deliveries: mpsc::UnboundedReceiver<Delivery>,
    /// Resolves when `events` is dropped, or with the breach that halted the session
    pub task: JoinHandle<Result<(), GameError>>,
}

/// Spawns a controller seeded from OS entropy.
pub fn spawn(config: EngineConfig) -> EngineHandle {
    spawn_with(config, Randomizer::from_entropy())
}

pub fn spawn_with<R>(config: EngineConfig, randomizer: Randomizer<R>) -> EngineHandle
where
    R: Rng + Send + 'static,
{
    let (events, inbound) = mpsc::channel(INBOUND_CAPACITY);
    let (outbound, deliveries) = mpsc::unbounded_channel();
    let controller = PhaseController::new(config, randomizer, outbound);
    let task = tokio::spawn(controller.run(inbound));
    EngineHandle { events, deliveries, task }
}
