/// Wires the engine to the WebSocket transport and runs until shutdown.
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::core::protocol::SessionEndReason;
use crate::core::websocket::WebSocketServer;
use crate::engine::{self, EngineHandle};

/// A bound listener plus a running engine, ready to serve one session.
pub struct Host {
    server: WebSocketServer,
    engine: EngineHandle,
    local: SocketAddr,
}

impl Host {
    /// Validates the config, binds `addr` and spawns the engine. Bind to port 0
    /// to let the OS pick.
    pub async fn bind(addr: &str, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let server = WebSocketServer::bind(addr).await?;
        let local = server.local_addr()?;
        let engine = engine::spawn(config);
        info!(%local, "session open");
        Ok(Self { server, engine, local })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Returns when the engine halts, the listener fails, or Ctrl-C arrives.
    pub async fn run(self) -> Result<()> {
        let Self { server, engine, .. } = self;
        let EngineHandle { events, deliveries, task } = engine;
        let shutdown = server.shutdown_handle();

        tokio::select! {
            served = server.serve(events, deliveries) => served,
            halted = task => match halted {
                Ok(Ok(())) => Ok(()),
                Ok(Err(breach)) => {
                    error!(error = %breach, "session halted");
                    Err(anyhow!(breach).context("the session was halted; restart the host"))
                }
                Err(join) => Err(anyhow!("engine task failed: {join}")),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                shutdown.close_all(SessionEndReason::Shutdown).await;
                // Give the socket writers a moment to flush the goodbye.
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            }
        }
    }
}
