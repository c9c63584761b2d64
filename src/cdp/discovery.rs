//! Debugging target discovery over the browser's local HTTP endpoint.
//!
//! The browser exposes `http://127.0.0.1:{port}/json`, returning a JSON
//! list of inspectable targets. Each page-type target carries a
//! `webSocketDebuggerUrl` the session controller connects to.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::TabId;

// ============================================================================
// TargetInfo
// ============================================================================

/// One inspectable target as reported by the discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    /// Target identifier (becomes the [`TabId`]).
    pub id: String,

    /// Target type: `page`, `iframe`, `service_worker`, ...
    #[serde(rename = "type")]
    pub target_type: String,

    /// Page title.
    #[serde(default)]
    pub title: String,

    /// Current URL.
    #[serde(default)]
    pub url: String,

    /// WebSocket address of the target's debugging socket.
    ///
    /// Absent when another client holds the target exclusively.
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

impl TargetInfo {
    /// Returns the target's tab identifier.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        TabId::new(self.id.clone())
    }

    /// Returns `true` for ordinary page targets.
    #[inline]
    #[must_use]
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Lists all inspectable targets on a debugging port.
///
/// # Errors
///
/// Returns [`Error::Http`] if the discovery endpoint is unreachable.
pub async fn list_targets(http_port: u16) -> Result<Vec<TargetInfo>> {
    let url = format!("http://127.0.0.1:{http_port}/json");
    let targets: Vec<TargetInfo> = reqwest::get(&url).await?.json().await?;

    debug!(port = http_port, count = targets.len(), "Targets discovered");

    Ok(targets)
}

/// Finds a specific target by tab id.
///
/// # Errors
///
/// Returns [`Error::TargetNotFound`] if no target has that id.
pub async fn find_target(http_port: u16, tab: &TabId) -> Result<TargetInfo> {
    let targets = list_targets(http_port).await?;

    targets
        .into_iter()
        .find(|t| t.id == tab.as_str())
        .ok_or_else(|| Error::target_not_found(tab.as_str()))
}

/// Returns the first page-type target (the agent's default tab).
///
/// # Errors
///
/// Returns [`Error::TargetNotFound`] if the browser reports no page targets.
pub async fn first_page_target(http_port: u16) -> Result<TargetInfo> {
    let targets = list_targets(http_port).await?;

    targets
        .into_iter()
        .find(TargetInfo::is_page)
        .ok_or_else(|| Error::target_not_found("no page targets available"))
}

// ============================================================================
// Tests
// ============================================================================
