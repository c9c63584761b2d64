//! WebSocket connection to a single debugging target.
//!
//! One connection per attached tab. The connection spawns a tokio task
//! handling:
//!
//! - Outgoing protocol commands with per-connection id correlation
//! - Incoming responses, matched strictly by id (never arrival order)
//! - Incoming events (`method` frames), pushed into the session's event
//!   channel as a continuous side effect independent of any command
//!
//! When the socket closes (tab closed, devtools opened, crash), the event
//! channel's sender drops; the session pump observes the closed channel and
//! converges on the detach transition.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for a single protocol round trip.
const CDP_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Map of in-flight protocol command ids to response channels.
type CorrelationMap = FxHashMap<u64, oneshot::Sender<Result<Value>>>;

/// An asynchronous protocol notification (console message, network response,
/// lifecycle event, ...).
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// Event method, e.g. `Runtime.consoleAPICalled`.
    pub method: String,
    /// Event parameters.
    pub params: Value,
}

/// Internal commands for the connection task.
enum ConnectionCommand {
    Send {
        id: u64,
        frame: String,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    RemoveCorrelation(u64),
    Close,
}

// ============================================================================
// CdpConnection
// ============================================================================

/// Handle to a live debugging-socket connection.
///
/// Cloneable; all clones share the same underlying socket and correlation
/// state. Dropping handles does not close the socket; [`close`] does.
///
/// [`close`]: CdpConnection::close
pub struct CdpConnection {
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    next_id: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
}

impl Clone for CdpConnection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            next_id: Arc::clone(&self.next_id),
            alive: Arc::clone(&self.alive),
        }
    }
}

impl CdpConnection {
    /// Connects to a target's debugging socket.
    ///
    /// Events arriving on the socket are forwarded to `event_tx` until the
    /// socket closes, at which point the sender is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the WebSocket handshake fails.
    pub async fn connect(
        ws_url: &str,
        event_tx: mpsc::UnboundedSender<CdpEvent>,
    ) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| Error::connection(format!("debugging socket connect failed: {e}")))?;

        debug!(url = ws_url, "Debugging socket connected");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            event_tx,
            Arc::clone(&alive),
        ));

        Ok(Self {
            command_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            alive,
        })
    }

    /// Returns `true` while the underlying socket is open.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Sends a protocol command and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the socket is closed
    /// - [`Error::ConnectionTimeout`] if no response arrives in time
    /// - [`Error::Protocol`] if the browser reports a protocol error
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        if !self.is_alive() {
            return Err(Error::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = json!({"id": id, "method": method, "params": params}).to_string();

        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(ConnectionCommand::Send {
                id,
                frame,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(CDP_COMMAND_TIMEOUT, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = self.command_tx.send(ConnectionCommand::RemoveCorrelation(id));
                Err(Error::connection_timeout(
                    CDP_COMMAND_TIMEOUT.as_millis() as u64,
                ))
            }
        }
    }

    /// Closes the connection.
    pub fn close(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Close);
    }

    /// Connection task: socket I/O, correlation, event forwarding.
    async fn run_event_loop(
        ws_stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        event_tx: mpsc::UnboundedSender<CdpEvent>,
        alive: Arc<AtomicBool>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let correlation: Mutex<CorrelationMap> = Mutex::new(CorrelationMap::default());

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming(&text, &correlation, &event_tx);
                        }
                        Some(Ok(Message::Close(_))) => {
                            debug!("Debugging socket closed by browser");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Debugging socket error");
                            break;
                        }
                        None => {
                            debug!("Debugging socket stream ended");
                            break;
                        }
                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { id, frame, response_tx }) => {
                            correlation.lock().insert(id, response_tx);
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                if let Some(tx) = correlation.lock().remove(&id) {
                                    let _ = tx.send(Err(Error::connection(e.to_string())));
                                }
                            }
                            trace!(id, "Protocol command sent");
                        }
                        Some(ConnectionCommand::RemoveCorrelation(id)) => {
                            correlation.lock().remove(&id);
                        }
                        Some(ConnectionCommand::Close) => {
                            debug!("Close requested");
                            let _ = ws_write.close().await;
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        alive.store(false, Ordering::SeqCst);

        // Fail whatever is still in flight.
        let pending: Vec<_> = correlation.lock().drain().collect();
        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        // event_tx drops here; the session pump sees the channel close.
        debug!("Debugging socket task terminated");
    }

    /// Routes one incoming frame: response (has `id`) or event (has `method`).
    fn handle_incoming(
        text: &str,
        correlation: &Mutex<CorrelationMap>,
        event_tx: &mpsc::UnboundedSender<CdpEvent>,
    ) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Unparseable protocol frame");
                return;
            }
        };

        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            let tx = correlation.lock().remove(&id);
            let Some(tx) = tx else {
                warn!(id, "Response for unknown protocol command");
                return;
            };

            let result = match value.get("error") {
                Some(error) => {
                    let message = error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown protocol error");
                    Err(Error::protocol(message.to_string()))
                }
                None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
            };

            let _ = tx.send(result);
            return;
        }

        if let Some(method) = value.get("method").and_then(Value::as_str) {
            let event = CdpEvent {
                method: method.to_string(),
                params: value.get("params").cloned().unwrap_or(Value::Null),
            };
            let _ = event_tx.send(event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_incoming_response() {
        let correlation = Mutex::new(CorrelationMap::default());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = oneshot::channel();

        correlation.lock().insert(7, tx);
        CdpConnection::handle_incoming(
            r#"{"id":7,"result":{"value":42}}"#,
            &correlation,
            &event_tx,
        );

        let result = rx.try_recv().expect("response routed").expect("success");
        assert_eq!(result, json!({"value": 42}));
        assert!(event_rx.try_recv().is_err());
    }

    #[test]
    fn test_handle_incoming_error_response() {
        let correlation = Mutex::new(CorrelationMap::default());
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = oneshot::channel();

        correlation.lock().insert(3, tx);
        CdpConnection::handle_incoming(
            r#"{"id":3,"error":{"code":-32000,"message":"Not attached"}}"#,
            &correlation,
            &event_tx,
        );

        let result = rx.try_recv().expect("response routed");
        assert!(result.is_err());
    }

    #[test]
    fn test_handle_incoming_event() {
        let correlation = Mutex::new(CorrelationMap::default());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        CdpConnection::handle_incoming(
            r#"{"method":"Runtime.consoleAPICalled","params":{"type":"log"}}"#,
            &correlation,
            &event_tx,
        );

        let event = event_rx.try_recv().expect("event forwarded");
        assert_eq!(event.method, "Runtime.consoleAPICalled");
        assert_eq!(event.params["type"], "log");
    }

    #[test]
    fn test_handle_incoming_garbage_ignored() {
        let correlation = Mutex::new(CorrelationMap::default());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        CdpConnection::handle_incoming("not json", &correlation, &event_tx);
        assert!(event_rx.try_recv().is_err());
    }
}
