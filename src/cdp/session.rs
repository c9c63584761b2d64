//! Per-tab debugging session lifecycle and event capture.
//!
//! State machine per tab: `detached → attached → detached`.
//!
//! - `attached` is entered by an explicit attach, which is idempotent: a tab
//!   already recorded as attached is a no-op success.
//! - Detach is triggered by an explicit detach command, by the browser
//!   dropping the session (tab closed, devtools opened, crash), or by tab
//!   removal. All three converge on one transition that clears the attached
//!   record and discards both event buffers.
//!
//! While attached, every console/exception/network-response notification is
//! appended to the tab's bounded buffers, independent of any command.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cdp::buffers::{
    ConsoleBuffer, ConsoleEntry, NetworkBuffer, NetworkEntry, console_buffer, network_buffer,
};
use crate::cdp::connection::{CdpConnection, CdpEvent};
use crate::cdp::discovery;
use crate::error::{Error, Result};
use crate::identifiers::TabId;

// ============================================================================
// SessionEntry
// ============================================================================

/// One attached session: the debugging connection plus its event buffers.
struct SessionEntry {
    connection: CdpConnection,
    console: Arc<Mutex<ConsoleBuffer>>,
    network: Arc<Mutex<NetworkBuffer>>,
    /// Guards against a stale event pump detaching a newer session.
    generation: u64,
}

// ============================================================================
// SessionRegistry
// ============================================================================

/// Owner of all per-tab debugging sessions.
///
/// Explicit owned state rather than ambient globals: the registry is
/// injected into the executor, so lifecycle and ownership are testable in
/// isolation. At most one session exists per tab id at any time.
pub struct SessionRegistry {
    http_port: u16,
    sessions: Arc<Mutex<FxHashMap<TabId, SessionEntry>>>,
    next_generation: Mutex<u64>,
}

impl SessionRegistry {
    /// Creates a registry bound to a debugging HTTP discovery port.
    #[must_use]
    pub fn new(http_port: u16) -> Self {
        Self {
            http_port,
            sessions: Arc::new(Mutex::new(FxHashMap::default())),
            next_generation: Mutex::new(0),
        }
    }

    /// Returns the discovery port this registry targets.
    #[inline]
    #[must_use]
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Returns `true` if a live session exists for the tab.
    #[must_use]
    pub fn is_attached(&self, tab: &TabId) -> bool {
        self.sessions
            .lock()
            .get(tab)
            .is_some_and(|entry| entry.connection.is_alive())
    }

    /// Returns the number of attached sessions.
    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Attaches the debugger to a tab. Idempotent; concurrent attaches for
    /// one tab resolve to a single registered session.
    ///
    /// On entering `attached`, both event buffers are (re)initialized and
    /// console/exception and network-response capture are enabled.
    ///
    /// # Errors
    ///
    /// Any failure other than "already attached" is fatal to this operation
    /// and surfaced as [`Error::AttachFailed`]; there is no retry at this
    /// layer.
    pub async fn attach(&self, tab: &TabId) -> Result<()> {
        // Already attached locally: no-op success.
        if self.is_attached(tab) {
            debug!(tab = %tab, "Attach requested for attached tab (no-op)");
            return Ok(());
        }

        // A dead leftover entry is the same as detached.
        self.sessions.lock().remove(tab);

        let target = discovery::find_target(self.http_port, tab).await?;
        // The browser withholds the socket URL while another client holds
        // the target exclusively.
        let ws_url = target.web_socket_debugger_url.ok_or_else(|| {
            Error::attach_failed(tab.clone(), "target held by another debugger".to_string())
        })?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connection = CdpConnection::connect(&ws_url, event_tx)
            .await
            .map_err(|e| Error::attach_failed(tab.clone(), e.to_string()))?;

        // Enable capture domains before recording the session so no command
        // can race ahead of event ingestion.
        for (method, params) in [
            ("Runtime.enable", json!({})),
            ("Network.enable", json!({})),
            ("Page.enable", json!({})),
        ] {
            connection
                .send(method, params)
                .await
                .map_err(|e| Error::attach_failed(tab.clone(), e.to_string()))?;
        }

        let console = Arc::new(Mutex::new(console_buffer()));
        let network = Arc::new(Mutex::new(network_buffer()));

        let generation = {
            let mut next = self.next_generation.lock();
            *next += 1;
            *next
        };

        // The attach crossed await points since the is_attached check, so a
        // concurrent attach for the same tab may have registered meanwhile.
        // Re-check under the lock; the loser closes its connection.
        {
            let mut map = self.sessions.lock();
            if map.get(tab).is_some_and(|e| e.connection.is_alive()) {
                drop(map);
                connection.close();
                debug!(tab = %tab, "Concurrent attach already registered, discarding duplicate");
                return Ok(());
            }

            if let Some(stale) = map.insert(
                tab.clone(),
                SessionEntry {
                    connection,
                    console: Arc::clone(&console),
                    network: Arc::clone(&network),
                    generation,
                },
            ) {
                stale.connection.close();
            }
        }

        // Event pump: runs until the debugging socket closes.
        let sessions = Arc::clone(&self.sessions);
        let tab_owned = tab.clone();
        tokio::spawn(async move {
            pump_events(event_rx, &console, &network).await;

            // Socket gone: converge on the detach transition, unless a newer
            // session already replaced this one.
            let mut map = sessions.lock();
            if map.get(&tab_owned).is_some_and(|e| e.generation == generation) {
                map.remove(&tab_owned);
                info!(tab = %tab_owned, "Session lost, detached");
            }
        });

        info!(tab = %tab, "Debugger attached");
        Ok(())
    }

    /// Detaches the debugger from a tab. No-op if unattached.
    ///
    /// Buffered events are not persisted across a detach.
    pub fn detach(&self, tab: &TabId) {
        let removed = self.sessions.lock().remove(tab);

        if let Some(entry) = removed {
            entry.connection.close();
            info!(tab = %tab, "Debugger detached");
        } else {
            debug!(tab = %tab, "Detach requested for unattached tab (no-op)");
        }
    }

    /// Returns the connection handle for an attached tab.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAttached`] if no live session exists.
    pub fn connection(&self, tab: &TabId) -> Result<CdpConnection> {
        let sessions = self.sessions.lock();
        let entry = sessions
            .get(tab)
            .filter(|e| e.connection.is_alive())
            .ok_or_else(|| Error::not_attached(tab.clone()))?;

        Ok(entry.connection.clone())
    }

    /// Attaches if needed and returns the connection handle.
    ///
    /// # Errors
    ///
    /// Propagates attach failures.
    pub async fn ensure_attached(&self, tab: &TabId) -> Result<CdpConnection> {
        if !self.is_attached(tab) {
            self.attach(tab).await?;
        }
        self.connection(tab)
    }

    /// Reads the most recent console entries, optionally clearing.
    ///
    /// The read and the clear happen under one lock acquisition, so entries
    /// ingested after the read are never lost to the clear.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAttached`] if no session exists for the tab.
    pub fn read_console(&self, tab: &TabId, limit: usize, clear: bool) -> Result<Vec<ConsoleEntry>> {
        let console = {
            let sessions = self.sessions.lock();
            let entry = sessions
                .get(tab)
                .ok_or_else(|| Error::not_attached(tab.clone()))?;
            Arc::clone(&entry.console)
        };

        let entries = console.lock().read_recent(limit, clear);
        Ok(entries)
    }

    /// Reads the most recent network entries, optionally clearing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAttached`] if no session exists for the tab.
    pub fn read_network(&self, tab: &TabId, limit: usize, clear: bool) -> Result<Vec<NetworkEntry>> {
        let network = {
            let sessions = self.sessions.lock();
            let entry = sessions
                .get(tab)
                .ok_or_else(|| Error::not_attached(tab.clone()))?;
            Arc::clone(&entry.network)
        };

        let entries = network.lock().read_recent(limit, clear);
        Ok(entries)
    }

    /// Picks the default tab: any attached session, else the first page
    /// target reported by discovery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TargetNotFound`] if nothing is attached and the
    /// browser reports no page targets.
    pub async fn default_tab(&self) -> Result<TabId> {
        if let Some(tab) = self.sessions.lock().keys().next().cloned() {
            return Ok(tab);
        }

        let target = discovery::first_page_target(self.http_port).await?;
        Ok(target.tab_id())
    }
}

// ============================================================================
// Event Ingestion
// ============================================================================

/// Drains the event channel into the buffers until the connection closes.
async fn pump_events(
    mut event_rx: mpsc::UnboundedReceiver<CdpEvent>,
    console: &Arc<Mutex<ConsoleBuffer>>,
    network: &Arc<Mutex<NetworkBuffer>>,
) {
    while let Some(event) = event_rx.recv().await {
        ingest_event(&event, console, network);
    }
}

/// Appends one notification to the matching buffer, if it is one we capture.
fn ingest_event(
    event: &CdpEvent,
    console: &Arc<Mutex<ConsoleBuffer>>,
    network: &Arc<Mutex<NetworkBuffer>>,
) {
    match event.method.as_str() {
        "Runtime.consoleAPICalled" => {
            let kind = event.params["type"].as_str().unwrap_or("log").to_string();
            let text = console_args_text(&event.params["args"]);
            let timestamp = event.params["timestamp"].as_f64().unwrap_or(0.0);
            console.lock().push(ConsoleEntry { kind, text, timestamp });
        }

        "Runtime.exceptionThrown" => {
            let details = &event.params["exceptionDetails"];
            let text = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("uncaught exception")
                .to_string();
            let timestamp = event.params["timestamp"].as_f64().unwrap_or(0.0);
            console.lock().push(ConsoleEntry {
                kind: "exception".to_string(),
                text,
                timestamp,
            });
        }

        "Network.responseReceived" => {
            let response = &event.params["response"];
            let entry = NetworkEntry {
                url: response["url"].as_str().unwrap_or_default().to_string(),
                status: response["status"].as_u64().unwrap_or(0) as u16,
                mime_type: response["mimeType"].as_str().unwrap_or_default().to_string(),
                timestamp: event.params["timestamp"].as_f64().unwrap_or(0.0),
            };
            network.lock().push(entry);
        }

        "Inspector.detached" => {
            warn!(reason = event.params["reason"].as_str().unwrap_or(""), "Browser reported detach");
        }

        _ => {}
    }
}

/// Renders console call arguments into one display string.
fn console_args_text(args: &Value) -> String {
    let Some(args) = args.as_array() else {
        return String::new();
    };

    args.iter()
        .map(|arg| {
            arg.get("value")
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .or_else(|| {
                    arg.get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| arg["type"].as_str().unwrap_or("?").to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn console_event(kind: &str, text: &str, ts: f64) -> CdpEvent {
        CdpEvent {
            method: "Runtime.consoleAPICalled".to_string(),
            params: json!({
                "type": kind,
                "args": [{"type": "string", "value": text}],
                "timestamp": ts,
            }),
        }
    }

    #[test]
    fn test_ingest_console_event() {
        let console = Arc::new(Mutex::new(console_buffer()));
        let network = Arc::new(Mutex::new(network_buffer()));

        ingest_event(&console_event("warn", "low disk", 1.0), &console, &network);

        let entries = console.lock().read_recent(10, false);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "warn");
        assert_eq!(entries[0].text, "low disk");
    }

    #[test]
    fn test_ingest_exception_event() {
        let console = Arc::new(Mutex::new(console_buffer()));
        let network = Arc::new(Mutex::new(network_buffer()));

        let event = CdpEvent {
            method: "Runtime.exceptionThrown".to_string(),
            params: json!({
                "timestamp": 5.0,
                "exceptionDetails": {
                    "text": "Uncaught",
                    "exception": {"description": "TypeError: x is not a function"}
                }
            }),
        };
        ingest_event(&event, &console, &network);

        let entries = console.lock().read_recent(10, false);
        assert_eq!(entries[0].kind, "exception");
        assert!(entries[0].text.contains("TypeError"));
    }

    #[test]
    fn test_ingest_network_event() {
        let console = Arc::new(Mutex::new(console_buffer()));
        let network = Arc::new(Mutex::new(network_buffer()));

        let event = CdpEvent {
            method: "Network.responseReceived".to_string(),
            params: json!({
                "timestamp": 2.0,
                "response": {
                    "url": "https://example.com/api",
                    "status": 404,
                    "mimeType": "application/json"
                }
            }),
        };
        ingest_event(&event, &console, &network);

        let entries = network.lock().read_recent(10, false);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, 404);
        assert_eq!(entries[0].url, "https://example.com/api");
        assert!(console.lock().is_empty());
    }

    #[test]
    fn test_ingest_600_console_events_retains_500() {
        let console = Arc::new(Mutex::new(console_buffer()));
        let network = Arc::new(Mutex::new(network_buffer()));

        for i in 0..600 {
            ingest_event(
                &console_event("log", &format!("msg {i}"), i as f64),
                &console,
                &network,
            );
        }

        let mut buffer = console.lock();
        assert_eq!(buffer.len(), 500);

        let recent = buffer.read_recent(100, false);
        assert_eq!(recent.len(), 100);
        assert_eq!(recent.last().map(|e| e.text.clone()), Some("msg 599".into()));
        assert_eq!(buffer.len(), 500);
    }

    #[test]
    fn test_console_args_joined() {
        let args = json!([
            {"type": "string", "value": "count:"},
            {"type": "number", "value": 7},
            {"type": "object", "description": "Object"}
        ]);
        assert_eq!(console_args_text(&args), "count: 7 Object");
    }

    #[test]
    fn test_detach_unattached_is_noop() {
        let registry = SessionRegistry::new(9222);
        registry.detach(&TabId::new("missing"));
        assert_eq!(registry.attached_count(), 0);
    }

    #[test]
    fn test_connection_for_unattached_tab() {
        let registry = SessionRegistry::new(9222);
        let result = registry.connection(&TabId::new("7"));
        assert!(matches!(result, Err(Error::NotAttached { .. })));
    }

    #[test]
    fn test_read_console_unattached() {
        let registry = SessionRegistry::new(9222);
        let result = registry.read_console(&TabId::new("7"), 100, false);
        assert!(result.is_err());
    }
}
