//! Relay address resolution and agent configuration.
//!
//! Two relay instances may run concurrently on fixed, distinct ports, each
//! bound to a different debugging target: a human-facing browser profile and
//! an automation-only profile.
//!
//! The agent endpoint resolves its relay address in priority order:
//!
//! 1. Explicit override ([`AgentConfig::relay_override`])
//! 2. `BROWSER_RELAY_URL` environment variable
//! 3. Compiled-in default (`ws://127.0.0.1:8765`)
//! 4. Static fallback list
//!
//! The resolved candidate list is deduplicated while preserving order.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::warn;
use url::Url;

// ============================================================================
// Constants
// ============================================================================

/// Default relay port (human-facing browser profile).
pub const DEFAULT_RELAY_PORT: u16 = 8765;

/// Relay port for the automation-only browser profile.
pub const AUTOMATION_RELAY_PORT: u16 = 8766;

/// Default debugging HTTP discovery port.
pub const DEFAULT_CDP_PORT: u16 = 9222;

/// Per-request deadline at the Relay (30s per protocol contract).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed delay between agent reconnect attempts.
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Poll interval for `wait-for-element`.
pub const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Environment variable holding a relay address override.
pub const RELAY_URL_ENV: &str = "BROWSER_RELAY_URL";

/// Static fallback relay addresses, tried after the default.
pub const FALLBACK_RELAY_ADDRS: &[&str] = &[
    "ws://localhost:8765",
    "ws://127.0.0.1:8766",
];

/// Returns the compiled-in default relay address.
#[inline]
#[must_use]
pub fn default_relay_addr() -> String {
    format!("ws://127.0.0.1:{DEFAULT_RELAY_PORT}")
}

// ============================================================================
// AgentConfig
// ============================================================================

/// Configuration for the agent endpoint.
///
/// # Example
///
/// ```ignore
/// let config = AgentConfig::new()
///     .with_relay_override("ws://127.0.0.1:9000")
///     .with_cdp_port(9223);
/// ```
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Explicit relay address override (highest priority).
    pub relay_override: Option<String>,
    /// Debugging HTTP discovery port.
    pub cdp_port: u16,
}

impl AgentConfig {
    /// Creates a configuration with defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            relay_override: None,
            cdp_port: DEFAULT_CDP_PORT,
        }
    }

    /// Sets an explicit relay address override.
    #[inline]
    #[must_use]
    pub fn with_relay_override(mut self, addr: impl Into<String>) -> Self {
        self.relay_override = Some(addr.into());
        self
    }

    /// Sets the debugging HTTP discovery port.
    #[inline]
    #[must_use]
    pub fn with_cdp_port(mut self, port: u16) -> Self {
        self.cdp_port = port;
        self
    }

    /// Resolves candidate relay addresses in priority order, deduplicated.
    ///
    /// Override and environment addresses must parse as `ws`/`wss` URLs;
    /// anything else is skipped with a warning rather than fed into the
    /// reconnect loop forever.
    ///
    /// Re-invoked from scratch whenever the agent exhausts the list, so
    /// configuration changes made meanwhile are picked up.
    #[must_use]
    pub fn resolve_candidates(&self) -> Vec<String> {
        let mut candidates = Vec::new();

        if let Some(ref addr) = self.relay_override {
            if is_ws_addr(addr) {
                candidates.push(addr.clone());
            } else {
                warn!(addr = %addr, "Ignoring invalid relay override");
            }
        }

        if let Ok(addr) = std::env::var(RELAY_URL_ENV) {
            if !addr.is_empty() {
                if is_ws_addr(&addr) {
                    candidates.push(addr);
                } else {
                    warn!(addr = %addr, env = RELAY_URL_ENV, "Ignoring invalid relay address");
                }
            }
        }

        candidates.push(default_relay_addr());

        for addr in FALLBACK_RELAY_ADDRS {
            candidates.push((*addr).to_string());
        }

        dedup_preserving_order(candidates)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `true` for a parseable `ws://` or `wss://` address.
fn is_ws_addr(addr: &str) -> bool {
    Url::parse(addr).is_ok_and(|u| matches!(u.scheme(), "ws" | "wss"))
}

/// Removes duplicate addresses while keeping first-occurrence order.
fn dedup_preserving_order(addrs: Vec<String>) -> Vec<String> {
    let mut seen = rustc_hash::FxHashSet::default();
    addrs
        .into_iter()
        .filter(|a| seen.insert(a.clone()))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_relay_addr() {
        assert_eq!(default_relay_addr(), "ws://127.0.0.1:8765");
    }

    #[test]
    fn test_constants() {
        assert_eq!(REQUEST_TIMEOUT.as_millis(), 30_000);
        assert_eq!(RECONNECT_INTERVAL.as_millis(), 3000);
        assert_eq!(ELEMENT_POLL_INTERVAL.as_millis(), 100);
        assert_ne!(DEFAULT_RELAY_PORT, AUTOMATION_RELAY_PORT);
    }

    #[test]
    fn test_resolve_candidates_override_first() {
        let config = AgentConfig::new().with_relay_override("ws://10.0.0.1:9000");
        let candidates = config.resolve_candidates();

        assert_eq!(candidates[0], "ws://10.0.0.1:9000");
        assert!(candidates.contains(&default_relay_addr()));
    }

    #[test]
    fn test_resolve_candidates_deduplicated() {
        // Override equal to the default must not appear twice.
        let config = AgentConfig::new().with_relay_override(default_relay_addr());
        let candidates = config.resolve_candidates();

        let default_count = candidates
            .iter()
            .filter(|a| **a == default_relay_addr())
            .count();
        assert_eq!(default_count, 1);
        assert_eq!(candidates[0], default_relay_addr());
    }

    #[test]
    fn test_invalid_override_skipped() {
        let config = AgentConfig::new().with_relay_override("http://not-a-ws-url");
        let candidates = config.resolve_candidates();
        assert_eq!(candidates[0], default_relay_addr());
    }

    #[test]
    fn test_is_ws_addr() {
        assert!(is_ws_addr("ws://127.0.0.1:8765"));
        assert!(is_ws_addr("wss://relay.example.com/path"));
        assert!(!is_ws_addr("http://127.0.0.1:8765"));
        assert!(!is_ws_addr("not a url"));
    }

    #[test]
    fn test_dedup_preserving_order() {
        let addrs = vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
            "c".to_string(),
            "b".to_string(),
        ];
        assert_eq!(dedup_preserving_order(addrs), vec!["a", "b", "c"]);
    }
}
