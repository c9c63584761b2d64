//! Command execution: fan-out from logical commands to protocol calls.
//!
//! One entry point, [`CommandExecutor::execute`], dispatches on the
//! [`Command`] tagged union:
//!
//! - [`NativeCommand`] variants drive the session controller directly with
//!   protocol primitives (input synthesis, screenshots, file lists, buffer
//!   reads), bypassing in-page script restrictions.
//! - [`DomCommand`] variants delegate to the in-page script runtime built by
//!   [`page_script`], evaluated over the same session.
//!
//! Both strategies share one result contract: JSON value or error string.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::cdp::buffers::{DEFAULT_CONSOLE_READ_LIMIT, DEFAULT_NETWORK_READ_LIMIT};
use crate::cdp::connection::CdpConnection;
use crate::cdp::session::SessionRegistry;
use crate::config::ELEMENT_POLL_INTERVAL;
use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::protocol::{Command, DomCommand, NativeCommand, UploadFile};

use super::page_script;

// ============================================================================
// CommandExecutor
// ============================================================================

/// Executes logical commands against the session registry.
pub struct CommandExecutor {
    sessions: SessionRegistry,
}

impl CommandExecutor {
    /// Creates an executor over a session registry.
    #[must_use]
    pub fn new(sessions: SessionRegistry) -> Self {
        Self { sessions }
    }

    /// Returns the underlying session registry.
    #[inline]
    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Executes one command and returns its result value.
    ///
    /// # Errors
    ///
    /// Execution failures surface as descriptive errors; they become the
    /// `error` field of the response envelope, never a process failure.
    pub async fn execute(&self, command: Command) -> Result<Value> {
        debug!(command = command.name(), "Executing command");

        match command {
            Command::Native(cmd) => self.execute_native(cmd).await,
            Command::Dom(cmd) => self.execute_dom(cmd).await,
        }
    }

    /// Resolves an optional explicit tab to a concrete target.
    async fn resolve_tab(&self, tab: Option<TabId>) -> Result<TabId> {
        match tab {
            Some(tab) => Ok(tab),
            None => self.sessions.default_tab().await,
        }
    }
}

// ============================================================================
// Native strategy
// ============================================================================

impl CommandExecutor {
    async fn execute_native(&self, command: NativeCommand) -> Result<Value> {
        match command {
            NativeCommand::Navigate { url, tab } => {
                let tab = self.resolve_tab(tab).await?;
                let conn = self.sessions.ensure_attached(&tab).await?;
                conn.send("Page.navigate", json!({"url": url})).await?;
                Ok(json!({"url": url}))
            }

            NativeCommand::Evaluate { expression, tab } => {
                let tab = self.resolve_tab(tab).await?;
                self.evaluate_with_retry(&tab, &expression).await
            }

            NativeCommand::NativeClick { selector, x, y, tab } => {
                if selector.is_none() && (x.is_none() || y.is_none()) {
                    return Err(Error::execution(
                        "native-click needs a selector or coordinates",
                    ));
                }

                let tab = self.resolve_tab(tab).await?;
                let conn = self.sessions.ensure_attached(&tab).await?;

                let (x, y) = match (x, y, selector) {
                    (Some(x), Some(y), _) => (x, y),
                    (_, _, Some(selector)) => self.resolve_center(&conn, &selector).await?,
                    _ => {
                        return Err(Error::execution(
                            "native-click needs a selector or coordinates",
                        ));
                    }
                };

                // Real pointer semantics: move, press, release.
                dispatch_mouse(&conn, "mouseMoved", x, y, None).await?;
                dispatch_mouse(&conn, "mousePressed", x, y, Some("left")).await?;
                dispatch_mouse(&conn, "mouseReleased", x, y, Some("left")).await?;

                Ok(json!({"clicked": true, "x": x, "y": y}))
            }

            NativeCommand::NativeType {
                text,
                selector,
                clear,
                press_enter,
                tab,
            } => {
                let tab = self.resolve_tab(tab).await?;
                let conn = self.sessions.ensure_attached(&tab).await?;

                if let Some(ref selector) = selector {
                    let script = page_script::focus_and_clear(selector, clear);
                    eval_page(&conn, &script).await?;
                }

                // One native insertion, not key-by-key.
                conn.send("Input.insertText", json!({"text": text})).await?;

                if press_enter {
                    for event_type in ["keyDown", "keyUp"] {
                        conn.send(
                            "Input.dispatchKeyEvent",
                            json!({
                                "type": event_type,
                                "key": "Enter",
                                "code": "Enter",
                                "windowsVirtualKeyCode": 13,
                                "text": "\r",
                            }),
                        )
                        .await?;
                    }
                }

                Ok(json!({"typed": text.chars().count()}))
            }

            NativeCommand::NativeScroll { dx, dy, tab } => {
                let tab = self.resolve_tab(tab).await?;
                let conn = self.sessions.ensure_attached(&tab).await?;

                let (cx, cy) = viewport_center(&conn).await?;
                conn.send(
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": "mouseWheel",
                        "x": cx,
                        "y": cy,
                        "deltaX": dx,
                        "deltaY": dy,
                    }),
                )
                .await?;

                Ok(json!({"scrolled": true}))
            }

            NativeCommand::NativeScreenshot {
                format,
                quality,
                full_page,
                tab,
            } => {
                let tab = self.resolve_tab(tab).await?;
                let conn = self.sessions.connection(&tab)?;

                let format = format.unwrap_or_else(|| "png".to_string());
                let mut params = json!({"format": format});
                if let Some(quality) = quality {
                    params["quality"] = json!(quality.min(100));
                }
                if full_page {
                    let metrics = conn.send("Page.getLayoutMetrics", json!({})).await?;
                    let size = &metrics["cssContentSize"];
                    params["clip"] = json!({
                        "x": 0,
                        "y": 0,
                        "width": size["width"],
                        "height": size["height"],
                        "scale": 1,
                    });
                    params["captureBeyondViewport"] = json!(true);
                }

                let result = conn.send("Page.captureScreenshot", params).await?;
                Ok(json!({"data": result["data"], "format": format}))
            }

            NativeCommand::Screenshot { tab } => {
                // Visible-tab variant: viewport only, attaches on demand.
                let tab = self.resolve_tab(tab).await?;
                let conn = self.sessions.ensure_attached(&tab).await?;
                let result = conn.send("Page.captureScreenshot", json!({})).await?;
                Ok(json!({"data": result["data"], "format": "png"}))
            }

            NativeCommand::NativeUpload { selector, files, tab } => {
                if files.is_empty() {
                    return Err(Error::execution("native-upload needs at least one file"));
                }

                let tab = self.resolve_tab(tab).await?;
                let conn = self.sessions.ensure_attached(&tab).await?;

                // Resolve the input to a native node handle; no base64 round
                // trip through page script.
                let doc = conn.send("DOM.getDocument", json!({"depth": 0})).await?;
                let root_id = doc["root"]["nodeId"].clone();
                let node = conn
                    .send(
                        "DOM.querySelector",
                        json!({"nodeId": root_id, "selector": selector}),
                    )
                    .await?;

                let node_id = node["nodeId"].as_u64().unwrap_or(0);
                if node_id == 0 {
                    return Err(Error::element_not_found(selector));
                }

                conn.send(
                    "DOM.setFileInputFiles",
                    json!({"files": files, "nodeId": node_id}),
                )
                .await?;

                Ok(json!({"uploaded": files.len()}))
            }

            NativeCommand::ReadConsole { limit, clear, tab } => {
                let tab = self.resolve_tab(tab).await?;
                let entries = self.sessions.read_console(
                    &tab,
                    limit.unwrap_or(DEFAULT_CONSOLE_READ_LIMIT),
                    clear,
                )?;
                let count = entries.len();
                Ok(json!({"entries": entries, "count": count}))
            }

            NativeCommand::ReadNetwork { limit, clear, tab } => {
                let tab = self.resolve_tab(tab).await?;
                let entries = self.sessions.read_network(
                    &tab,
                    limit.unwrap_or(DEFAULT_NETWORK_READ_LIMIT),
                    clear,
                )?;
                let count = entries.len();
                Ok(json!({"entries": entries, "count": count}))
            }

            NativeCommand::DebuggerAttach { tab } => {
                let tab = self.resolve_tab(tab).await?;
                self.sessions.attach(&tab).await?;
                Ok(json!({"attached": true, "tab": tab}))
            }

            NativeCommand::DebuggerDetach { tab } => {
                let tab = self.resolve_tab(tab).await?;
                self.sessions.detach(&tab);
                Ok(json!({"attached": false, "tab": tab}))
            }
        }
    }

    /// Evaluates with exactly one re-attach-and-retry cycle.
    ///
    /// An explicit loop with a retry counter capped at one, so a reattach
    /// that itself keeps failing cannot recurse.
    async fn evaluate_with_retry(&self, tab: &TabId, expression: &str) -> Result<Value> {
        let wrapped = page_script::wrap_expression(expression);
        let mut retried = false;

        loop {
            let conn = self.sessions.ensure_attached(tab).await?;
            match eval_page(&conn, &wrapped).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_session_lost() && !retried => {
                    warn!(tab = %tab, error = %e, "Session lost during evaluate, re-attaching");
                    self.sessions.detach(tab);
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Resolves a selector to its viewport center point.
    async fn resolve_center(&self, conn: &CdpConnection, selector: &str) -> Result<(f64, f64)> {
        let script = page_script::center_point(selector);
        let point = eval_page(conn, &script).await?;

        if point.is_null() {
            return Err(Error::element_not_found(selector));
        }

        let x = point["x"].as_f64().unwrap_or(0.0);
        let y = point["y"].as_f64().unwrap_or(0.0);
        Ok((x, y))
    }
}

// ============================================================================
// DOM-fallback strategy
// ============================================================================

impl CommandExecutor {
    async fn execute_dom(&self, command: DomCommand) -> Result<Value> {
        match command {
            DomCommand::Click { selector, tab } => {
                self.run_script(tab, &page_script::click(&selector)).await
            }

            DomCommand::Type {
                selector,
                text,
                clear,
                append,
                tab,
            } => {
                let script = page_script::type_text(&selector, &text, clear, append);
                self.run_script(tab, &script).await
            }

            DomCommand::Scroll { selector, dx, dy, tab } => {
                let script = page_script::scroll(selector.as_deref(), dx, dy);
                self.run_script(tab, &script).await
            }

            DomCommand::GetElement { selector, tab } => {
                self.run_script(tab, &page_script::describe_element(&selector))
                    .await
            }

            DomCommand::GetElements { selector, tab } => {
                self.run_script(tab, &page_script::describe_elements(&selector))
                    .await
            }

            DomCommand::GetText { selector, tab } => {
                self.run_script(tab, &page_script::get_text(&selector)).await
            }

            DomCommand::GetHtml { selector, tab } => {
                self.run_script(tab, &page_script::get_html(selector.as_deref()))
                    .await
            }

            DomCommand::GetAttribute { selector, name, tab } => {
                self.run_script(tab, &page_script::get_attribute(&selector, &name))
                    .await
            }

            DomCommand::WaitForElement {
                selector,
                timeout_ms,
                tab,
            } => self.wait_for_element(tab, &selector, timeout_ms).await,

            DomCommand::Upload { selector, files, tab } => {
                self.dom_upload(tab, &selector, &files).await
            }

            DomCommand::SetHtml { selector, html, tab } => {
                let script = page_script::set_html(selector.as_deref(), &html);
                self.run_script(tab, &script).await
            }
        }
    }

    /// Runs one page script on the resolved tab.
    async fn run_script(&self, tab: Option<TabId>, script: &str) -> Result<Value> {
        let tab = self.resolve_tab(tab).await?;
        let conn = self.sessions.ensure_attached(&tab).await?;
        eval_page(&conn, script).await
    }

    /// Polls for a selector until found or the timeout elapses.
    ///
    /// Timeout is an expected outcome, not an error: the result reports
    /// `{found, timeout}`.
    async fn wait_for_element(
        &self,
        tab: Option<TabId>,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<Value> {
        let tab = self.resolve_tab(tab).await?;
        let conn = self.sessions.ensure_attached(&tab).await?;
        let script = page_script::exists(selector);
        let deadline = Instant::now() + std::time::Duration::from_millis(timeout_ms);

        loop {
            let found = eval_page(&conn, &script).await?;
            if found.as_bool() == Some(true) {
                return Ok(json!({"found": true, "timeout": false}));
            }

            if Instant::now() >= deadline {
                return Ok(json!({"found": false, "timeout": true}));
            }

            sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn dom_upload(
        &self,
        tab: Option<TabId>,
        selector: &str,
        files: &[UploadFile],
    ) -> Result<Value> {
        if files.is_empty() {
            return Err(Error::execution("upload needs at least one file"));
        }

        let script = page_script::upload(selector, files)?;
        let count = self.run_script(tab, &script).await?;
        Ok(json!({"uploaded": count}))
    }
}

// ============================================================================
// Protocol helpers
// ============================================================================

/// Evaluates a script in page context, mapping page exceptions to
/// evaluation errors.
async fn eval_page(conn: &CdpConnection, script: &str) -> Result<Value> {
    let result = conn
        .send(
            "Runtime.evaluate",
            json!({"expression": script, "returnByValue": true}),
        )
        .await?;

    if let Some(details) = result.get("exceptionDetails") {
        let message = details["exception"]["description"]
            .as_str()
            .or_else(|| details["text"].as_str())
            .unwrap_or("script exception");
        return Err(Error::evaluation(message.to_string()));
    }

    Ok(result["result"]["value"].clone())
}

/// Dispatches one synthesized mouse event.
async fn dispatch_mouse(
    conn: &CdpConnection,
    event_type: &str,
    x: f64,
    y: f64,
    button: Option<&str>,
) -> Result<()> {
    let mut params = json!({"type": event_type, "x": x, "y": y});
    if let Some(button) = button {
        params["button"] = json!(button);
        params["clickCount"] = json!(1);
    }

    conn.send("Input.dispatchMouseEvent", params).await?;
    Ok(())
}

/// Returns the viewport center from layout metrics.
async fn viewport_center(conn: &CdpConnection) -> Result<(f64, f64)> {
    let metrics = conn.send("Page.getLayoutMetrics", json!({})).await?;
    let viewport = &metrics["cssLayoutViewport"];
    let width = viewport["clientWidth"].as_f64().unwrap_or(800.0);
    let height = viewport["clientHeight"].as_f64().unwrap_or(600.0);
    Ok((width / 2.0, height / 2.0))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> CommandExecutor {
        CommandExecutor::new(SessionRegistry::new(9222))
    }

    #[tokio::test]
    async fn test_read_console_on_unattached_tab_errors() {
        let exec = executor();
        let result = exec
            .execute(Command::Native(NativeCommand::ReadConsole {
                limit: None,
                clear: false,
                tab: Some(TabId::new("7")),
            }))
            .await;

        assert!(matches!(result, Err(Error::NotAttached { .. })));
    }

    #[tokio::test]
    async fn test_detach_unattached_tab_is_noop_success() {
        let exec = executor();
        let result = exec
            .execute(Command::Native(NativeCommand::DebuggerDetach {
                tab: Some(TabId::new("7")),
            }))
            .await
            .expect("detach is a no-op");

        assert_eq!(result["attached"], json!(false));
    }

    #[tokio::test]
    async fn test_native_click_requires_selector_or_coords() {
        let exec = executor();
        let result = exec
            .execute(Command::Native(NativeCommand::NativeClick {
                selector: None,
                x: None,
                y: None,
                tab: Some(TabId::new("7")),
            }))
            .await;

        // Fails before any session work: the command is unsatisfiable.
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_file_list() {
        let exec = executor();
        let result = exec
            .execute(Command::Native(NativeCommand::NativeUpload {
                selector: "input".to_string(),
                files: vec![],
                tab: Some(TabId::new("7")),
            }))
            .await;

        assert!(matches!(result, Err(Error::Execution { .. })));
    }
}
