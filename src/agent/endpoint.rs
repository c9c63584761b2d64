//! Durable, reconnecting link between the Relay and the command executor.
//!
//! The endpoint outlives any page: it is the process-wide connection holder
//! the Relay routes commands through.
//!
//! # Connection state machine
//!
//! ```text
//! disconnected → connecting → open → (closed|errored) → reconnect-scheduled ─┐
//!        ▲                                                                   │
//!        └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! On `open` the `{type:"connected"}` handshake is sent immediately. On
//! close or error, the next attempt is scheduled after a fixed 3000 ms
//! delay rather than immediately, to avoid hot-looping against an
//! unreachable relay. Each failed attempt advances to the next candidate
//! address; an exhausted list is re-resolved from scratch, picking up
//! configuration changes made meanwhile.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, RECONNECT_INTERVAL};
use crate::error::Result;
use crate::protocol::{ForwardedCommand, Handshake, ResponseFrame};

use super::executor::CommandExecutor;

// ============================================================================
// AgentEndpoint
// ============================================================================

/// The agent's relay-facing endpoint.
///
/// Runs forever: connects, serves forwarded commands, reconnects.
pub struct AgentEndpoint {
    executor: Arc<CommandExecutor>,
    config: AgentConfig,
}

impl AgentEndpoint {
    /// Creates an endpoint over an executor.
    #[must_use]
    pub fn new(executor: Arc<CommandExecutor>, config: AgentConfig) -> Self {
        Self { executor, config }
    }

    /// Runs the connect/serve/reconnect loop. Never returns.
    pub async fn run(&self) {
        let mut candidates = self.config.resolve_candidates();
        let mut index = 0;

        loop {
            if index >= candidates.len() {
                candidates = self.config.resolve_candidates();
                index = 0;
            }

            let addr = candidates[index].clone();
            debug!(addr = %addr, "Connecting to relay");

            match connect_async(&addr).await {
                Ok((ws_stream, _)) => {
                    info!(addr = %addr, "Relay connection open");
                    if let Err(e) = self.serve(ws_stream).await {
                        warn!(addr = %addr, error = %e, "Relay connection lost");
                    }
                    // A served session counts as progress: restart the
                    // candidate walk from the top next time.
                    candidates = self.config.resolve_candidates();
                    index = 0;
                }
                Err(e) => {
                    warn!(addr = %addr, error = %e, "Relay connect failed");
                    index += 1;
                }
            }

            sleep(RECONNECT_INTERVAL).await;
        }
    }

    /// Serves one open relay connection until it closes.
    ///
    /// Commands are delegated to the executor within the connection's event
    /// handling; a delegation failure is converted into an error-bearing
    /// response, never left unanswered.
    async fn serve(
        &self,
        ws_stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> Result<()> {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Register as *the* in-browser endpoint.
        let handshake = Handshake::connected(format!("agent {}", env!("CARGO_PKG_VERSION")));
        ws_write
            .send(Message::Text(serde_json::to_string(&handshake)?.into()))
            .await?;

        while let Some(message) = ws_read.next().await {
            match message? {
                Message::Text(text) => {
                    let forwarded: ForwardedCommand = match serde_json::from_str(&text) {
                        Ok(f) => f,
                        Err(e) => {
                            warn!(error = %e, "Unparseable forwarded frame");
                            continue;
                        }
                    };

                    let id = forwarded.id;
                    debug!(id = %id, command = forwarded.command.name(), "Command received");

                    let result = self.executor.execute(forwarded.command).await;
                    let response = ResponseFrame::from_result(id, result);

                    ws_write
                        .send(Message::Text(serde_json::to_string(&response)?.into()))
                        .await?;
                }

                Message::Close(_) => {
                    debug!("Relay closed the connection");
                    break;
                }

                // Ignore Binary, Ping, Pong
                _ => {}
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
