//! The Relay: rendezvous point and request multiplexer.
//!
//! Accepts WebSocket connections on one port. The first connection to send
//! a `{type:"connected"}` handshake becomes *the* in-browser endpoint; a
//! later handshake silently replaces the reference (extension reloaded).
//! Every other frame bearing a command comes from a controller and is
//! forwarded to the endpoint tagged with a relay-local request id.
//!
//! # Correlation
//!
//! A `PendingRequest` exists from the moment a command is forwarded until a
//! matching response arrives or the 30 000 ms deadline elapses. It is
//! removed on first resolution, exactly once. Responses are matched strictly by id,
//! never arrival order, so out-of-order completion across in-flight
//! commands is safe by construction.
//!
//! # Endpoint loss
//!
//! On endpoint disconnect the registration is cleared; in-flight requests
//! are left to expire naturally via their timers. The endpoint may
//! reconnect, and a differently-routed response is never expected for
//! those ids anyway.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::REQUEST_TIMEOUT;
use crate::error::{Error, Result};
use crate::identifiers::{RequestId, RequestIdAllocator};
use crate::protocol::{Command, ForwardedCommand, RelayInbound, ResponseFrame};

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost only).
const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

// ============================================================================
// Types
// ============================================================================

/// Map of forwarded request ids to the waiting controller's channel.
type PendingMap = FxHashMap<RequestId, oneshot::Sender<ResponseFrame>>;

/// The registered in-browser endpoint: its connection identity and the
/// writer channel frames are routed through.
#[derive(Clone)]
struct EndpointHandle {
    conn_id: u64,
    tx: mpsc::UnboundedSender<Message>,
}

// ============================================================================
// RelayOptions
// ============================================================================

/// Relay construction options.
///
/// The request timeout is injectable so the timeout path is testable
/// without waiting the full 30 s.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Port to bind (0 for an OS-assigned port).
    pub port: u16,
    /// Per-request deadline.
    pub request_timeout: Duration,
}

impl RelayOptions {
    /// Creates options for a port with the standard 30 s deadline.
    #[inline]
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Overrides the per-request deadline.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

// ============================================================================
// Relay
// ============================================================================

/// The relay server.
///
/// All shared state (the endpoint registration and the pending-request
/// map) is owned here with explicit create/destroy triggers, not ambient
/// globals.
pub struct Relay {
    port: u16,
    request_timeout: Duration,
    ids: RequestIdAllocator,
    conn_ids: AtomicU64,
    endpoint: RwLock<Option<EndpointHandle>>,
    pending: Mutex<PendingMap>,
    shutdown: AtomicBool,
}

// ============================================================================
// Relay - Constructors
// ============================================================================

impl Relay {
    /// Binds a relay to a port and starts the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(port: u16) -> Result<Arc<Self>> {
        Self::bind_with(RelayOptions::new(port)).await
    }

    /// Binds a relay with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind_with(options: RelayOptions) -> Result<Arc<Self>> {
        let addr = SocketAddr::new(DEFAULT_BIND_IP, options.port);
        let listener = TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        let relay = Arc::new(Self {
            port: actual_port,
            request_timeout: options.request_timeout,
            ids: RequestIdAllocator::new(),
            conn_ids: AtomicU64::new(1),
            endpoint: RwLock::new(None),
            pending: Mutex::new(PendingMap::default()),
            shutdown: AtomicBool::new(false),
        });

        let relay_clone = Arc::clone(&relay);
        tokio::spawn(async move {
            relay_clone.accept_loop(listener).await;
        });

        info!(port = actual_port, "Relay started");

        Ok(relay)
    }
}

// ============================================================================
// Relay - Public API
// ============================================================================

impl Relay {
    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the relay's WebSocket URL.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Returns `true` if an in-browser endpoint is registered.
    #[inline]
    #[must_use]
    pub fn endpoint_connected(&self) -> bool {
        self.endpoint.read().is_some()
    }

    /// Returns the number of in-flight pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Forwards one command to the endpoint and waits for its response.
    ///
    /// Guarantees exactly one response: the endpoint's answer, an immediate
    /// routing error when no endpoint is registered (no `PendingRequest` is
    /// created, nothing is queued), or a synthetic timeout error.
    pub async fn dispatch(&self, command: Command) -> ResponseFrame {
        let endpoint = self.endpoint.read().clone();
        let Some(endpoint) = endpoint else {
            debug!(command = command.name(), "No endpoint registered");
            return ResponseFrame::err_unrouted(Error::NotConnected.to_string());
        };

        let id = self.ids.next();
        let (response_tx, response_rx) = oneshot::channel();
        self.pending.lock().insert(id, response_tx);

        let frame = ForwardedCommand::new(id, command);
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                self.pending.lock().remove(&id);
                return ResponseFrame::err(id, Error::Json(e).to_string());
            }
        };

        if endpoint.tx.send(Message::Text(text.into())).is_err() {
            // Endpoint writer already gone; do not wait out the deadline.
            self.pending.lock().remove(&id);
            return ResponseFrame::err(id, Error::NotConnected.to_string());
        }

        debug!(id = %id, "Command forwarded to endpoint");

        match timeout(self.request_timeout, response_rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => ResponseFrame::err(id, Error::ConnectionClosed.to_string()),
            Err(_) => {
                // First resolution wins: only synthesize the timeout if the
                // entry is still pending.
                if self.pending.lock().remove(&id).is_some() {
                    warn!(id = %id, "Request timed out");
                }
                let timeout_ms = self.request_timeout.as_millis() as u64;
                ResponseFrame::err(id, Error::request_timeout(id, timeout_ms).to_string())
            }
        }
    }

    /// Shuts down the relay: stops accepting and fails all pending requests.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        *self.endpoint.write() = None;

        let pending: Vec<_> = self.pending.lock().drain().collect();
        let count = pending.len();
        drop(pending); // Dropped senders error the waiting dispatchers.

        if count > 0 {
            debug!(count, "Dropped pending requests on shutdown");
        }

        info!(port = self.port, "Relay shut down");
    }
}

// ============================================================================
// Relay - Accept Loop
// ============================================================================

impl Relay {
    /// Background task accepting controller and endpoint connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            // Accept with a short timeout so the shutdown flag is observed.
            match timeout(Duration::from_millis(100), listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let relay = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = relay.handle_connection(stream, addr).await {
                            debug!(error = %e, ?addr, "Connection ended with error");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Handles one connection for its whole lifetime.
    ///
    /// A connection's role is decided per frame: a handshake registers it
    /// as the endpoint, a response resolves a pending request, a command
    /// makes it (for that frame) a controller.
    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<()> {
        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let conn_id = self.conn_ids.fetch_add(1, Ordering::Relaxed);
        debug!(conn_id, ?addr, "Connection established");

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Message>();

        // Writer task: everything this connection is owed flows through one
        // channel, so concurrent dispatch results cannot interleave frames.
        let writer = tokio::spawn(async move {
            while let Some(message) = write_rx.recv().await {
                if ws_write.send(message).await.is_err() {
                    break;
                }
            }
            let _ = ws_write.close().await;
        });

        while let Some(message) = ws_read.next().await {
            let message = match message {
                Ok(m) => m,
                Err(e) => {
                    debug!(conn_id, error = %e, "Read error");
                    break;
                }
            };

            match message {
                Message::Text(text) => {
                    self.handle_frame(conn_id, &text, &write_tx);
                }
                Message::Close(_) => break,
                // Ignore Binary, Ping, Pong
                _ => {}
            }
        }

        // Endpoint gone: clear the registration. In-flight requests keep
        // their timers; they are not proactively failed.
        {
            let mut endpoint = self.endpoint.write();
            if endpoint.as_ref().is_some_and(|e| e.conn_id == conn_id) {
                *endpoint = None;
                info!(conn_id, "Endpoint disconnected");
            }
        }

        drop(write_tx);
        let _ = writer.await;

        debug!(conn_id, "Connection closed");
        Ok(())
    }

    /// Classifies and handles one inbound frame.
    fn handle_frame(
        self: &Arc<Self>,
        conn_id: u64,
        text: &str,
        write_tx: &mpsc::UnboundedSender<Message>,
    ) {
        match RelayInbound::parse(text) {
            Ok(RelayInbound::Handshake(handshake)) => {
                // Silent replacement models "extension reloaded".
                let replaced = self
                    .endpoint
                    .write()
                    .replace(EndpointHandle {
                        conn_id,
                        tx: write_tx.clone(),
                    })
                    .is_some();
                info!(conn_id, message = %handshake.message, replaced, "Endpoint registered");
            }

            Ok(RelayInbound::Response(response)) => {
                self.resolve_pending(response);
            }

            Ok(RelayInbound::Command(command)) => {
                // Run the round trip off the read loop so this controller
                // can pipeline and the endpoint reader is never blocked.
                let relay = Arc::clone(self);
                let write_tx = write_tx.clone();
                tokio::spawn(async move {
                    let response = relay.dispatch(*command).await;
                    if let Ok(text) = serde_json::to_string(&response) {
                        let _ = write_tx.send(Message::Text(text.into()));
                    }
                });
            }

            Err(e) => {
                warn!(conn_id, error = %e, "Dropping unrecognized frame");
            }
        }
    }

    /// Routes an endpoint response to its waiting controller.
    fn resolve_pending(&self, response: ResponseFrame) {
        let Some(id) = response.id else {
            warn!("Endpoint response without id");
            return;
        };

        let tx = self.pending.lock().remove(&id);
        match tx {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => {
                // Already timed out, or never ours.
                warn!(id = %id, "Response for unknown request");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
