//! Command definitions for the relay protocol.
//!
//! A [`Command`] is the unit of work a controller submits. It is immutable
//! once sent, and its name selects one of two execution strategies:
//!
//! | Strategy | Commands |
//! |----------|----------|
//! | [`NativeCommand`] | Protocol-level primitives against an attached session |
//! | [`DomCommand`] | In-page script resolving elements by selector |
//!
//! The split is modeled as a tagged union rather than string-keyed dispatch
//! so the executor's fan-out is exhaustiveness-checked.
//!
//! # Wire format
//!
//! ```json
//! {"command": "native-click", "params": {"selector": "#submit"}}
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::TabId;

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands, split by execution strategy.
///
/// Both variants share one result contract: a JSON value on success, an
/// error string on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Native-protocol strategy (requires or establishes a debugging session).
    Native(NativeCommand),
    /// DOM-fallback strategy (in-page script).
    Dom(DomCommand),
}

impl Command {
    /// Returns the wire name of the command.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Native(c) => c.name(),
            Self::Dom(c) => c.name(),
        }
    }
}

// ============================================================================
// Native Commands
// ============================================================================

/// Commands executed through native debugging protocol primitives.
///
/// These bypass in-page script restrictions (e.g. content-security-policy)
/// by talking to the page exclusively through the protocol. All of them
/// target a tab: explicitly via `tab`, or the executor's current target
/// when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", content = "params", rename_all = "kebab-case")]
pub enum NativeCommand {
    /// Navigate the tab to a URL.
    Navigate {
        /// URL to navigate to.
        url: String,
        /// Target tab (current target if omitted).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Evaluate an expression in page context.
    ///
    /// The expression is wrapped in an isolating invocation; page exceptions
    /// surface as evaluation error results. A lost session triggers exactly
    /// one re-attach-and-retry cycle.
    Evaluate {
        /// JavaScript expression.
        expression: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Click at a selector's center point or explicit coordinates.
    ///
    /// Synthesizes a move → press → release pointer sequence.
    NativeClick {
        /// Structural or XPath selector (resolved to a center point).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Explicit X coordinate.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        /// Explicit Y coordinate.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Insert text as a single native text-insertion event.
    NativeType {
        /// Text to insert.
        text: String,
        /// Element to focus and clear first (optional).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Clear the target before typing.
        #[serde(default)]
        clear: bool,
        /// Follow with a synthesized Enter key-down/key-up pair.
        #[serde(default, rename = "pressEnter")]
        press_enter: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Scroll via a synthesized wheel event at the viewport center.
    NativeScroll {
        /// Horizontal scroll delta (CSS pixels).
        #[serde(default)]
        dx: f64,
        /// Vertical scroll delta (CSS pixels).
        #[serde(default)]
        dy: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Protocol-level screenshot (higher fidelity, attached session).
    NativeScreenshot {
        /// Image format: `png` (default) or `jpeg`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        /// JPEG quality 0-100.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality: Option<u8>,
        /// Capture the full scrollable page instead of the viewport.
        #[serde(default, rename = "fullPage")]
        full_page: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Set a file input's file list at the protocol level.
    ///
    /// No base64 round-trip through page script: paths are handed to the
    /// browser directly against a native node handle.
    NativeUpload {
        /// Selector of the `<input type="file">` element.
        selector: String,
        /// Absolute file paths.
        files: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Read buffered console entries for the tab's session.
    ReadConsole {
        /// Maximum entries to return (default 100).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
        /// Clear the buffer atomically with the read.
        #[serde(default)]
        clear: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Read buffered network entries for the tab's session.
    ReadNetwork {
        /// Maximum entries to return (default 50).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
        /// Clear the buffer atomically with the read.
        #[serde(default)]
        clear: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Attach the debugger to a tab (idempotent).
    DebuggerAttach {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Detach the debugger from a tab (no-op if unattached).
    DebuggerDetach {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Simple visible-tab screenshot (attaches on demand).
    Screenshot {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },
}

impl NativeCommand {
    /// Returns the wire name of the command.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Evaluate { .. } => "evaluate",
            Self::NativeClick { .. } => "native-click",
            Self::NativeType { .. } => "native-type",
            Self::NativeScroll { .. } => "native-scroll",
            Self::NativeScreenshot { .. } => "native-screenshot",
            Self::NativeUpload { .. } => "native-upload",
            Self::ReadConsole { .. } => "read-console",
            Self::ReadNetwork { .. } => "read-network",
            Self::DebuggerAttach { .. } => "debugger-attach",
            Self::DebuggerDetach { .. } => "debugger-detach",
            Self::Screenshot { .. } => "screenshot",
        }
    }

    /// Returns the explicit target tab, if any.
    #[must_use]
    pub fn tab(&self) -> Option<&TabId> {
        match self {
            Self::Navigate { tab, .. }
            | Self::Evaluate { tab, .. }
            | Self::NativeClick { tab, .. }
            | Self::NativeType { tab, .. }
            | Self::NativeScroll { tab, .. }
            | Self::NativeScreenshot { tab, .. }
            | Self::NativeUpload { tab, .. }
            | Self::ReadConsole { tab, .. }
            | Self::ReadNetwork { tab, .. }
            | Self::DebuggerAttach { tab }
            | Self::DebuggerDetach { tab }
            | Self::Screenshot { tab } => tab.as_ref(),
        }
    }
}

// ============================================================================
// DOM Commands
// ============================================================================

/// Commands delegated to the in-page script runtime.
///
/// Elements resolve via structural (CSS) or path-based (XPath) selectors;
/// input is synthesized as standard DOM events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", content = "params", rename_all = "kebab-case")]
pub enum DomCommand {
    /// Dispatch a standard click event sequence on an element.
    Click {
        /// Structural or XPath selector.
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Type into an element with standard input/change events.
    ///
    /// Rich-text (contenteditable) targets manage clear/append/replace
    /// semantics distinctly from value-bearing inputs.
    Type {
        /// Structural or XPath selector.
        selector: String,
        /// Text to type.
        text: String,
        /// Clear existing content first (default true).
        #[serde(default = "default_true")]
        clear: bool,
        /// Append instead of replace.
        #[serde(default)]
        append: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Scroll an element (or the window when no selector is given).
    Scroll {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Horizontal scroll delta.
        #[serde(default)]
        dx: f64,
        /// Vertical scroll delta.
        #[serde(default)]
        dy: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Describe the first element matching a selector.
    GetElement {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Describe all elements matching a selector.
    GetElements {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Read an element's text content.
    GetText {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Read an element's outer HTML (the whole document when no selector).
    GetHtml {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Read an element attribute.
    GetAttribute {
        selector: String,
        /// Attribute name.
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Poll for an element until found or the timeout elapses.
    ///
    /// Returns `{found, timeout}` rather than erroring on timeout.
    WaitForElement {
        selector: String,
        /// Total time to wait in milliseconds (default 5000).
        #[serde(default = "default_wait_timeout", rename = "timeoutMs")]
        timeout_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Populate a file input from in-page script via a DataTransfer.
    Upload {
        /// Selector of the file input.
        selector: String,
        /// File payloads (content carried inline).
        files: Vec<UploadFile>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },

    /// Replace an element's inner HTML (the document body when no selector).
    SetHtml {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// HTML fragment to set.
        html: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<TabId>,
    },
}

impl DomCommand {
    /// Returns the wire name of the command.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::Type { .. } => "type",
            Self::Scroll { .. } => "scroll",
            Self::GetElement { .. } => "get-element",
            Self::GetElements { .. } => "get-elements",
            Self::GetText { .. } => "get-text",
            Self::GetHtml { .. } => "get-html",
            Self::GetAttribute { .. } => "get-attribute",
            Self::WaitForElement { .. } => "wait-for-element",
            Self::Upload { .. } => "upload",
            Self::SetHtml { .. } => "set-html",
        }
    }

    /// Returns the explicit target tab, if any.
    #[must_use]
    pub fn tab(&self) -> Option<&TabId> {
        match self {
            Self::Click { tab, .. }
            | Self::Type { tab, .. }
            | Self::Scroll { tab, .. }
            | Self::GetElement { tab, .. }
            | Self::GetElements { tab, .. }
            | Self::GetText { tab, .. }
            | Self::GetHtml { tab, .. }
            | Self::GetAttribute { tab, .. }
            | Self::WaitForElement { tab, .. }
            | Self::Upload { tab, .. }
            | Self::SetHtml { tab, .. } => tab.as_ref(),
        }
    }
}

// ============================================================================
// UploadFile
// ============================================================================

/// File payload for the DOM-fallback upload path.
///
/// Content travels inline (base64) because page script cannot open local
/// paths; the native upload path takes paths instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFile {
    /// File name presented to the page.
    pub name: String,
    /// MIME type.
    pub mime: String,
    /// Base64-encoded content.
    pub data: String,
}

// ============================================================================
// Serde defaults
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_wait_timeout() -> u64 {
    5000
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigate_wire_format() {
        let json = r#"{"command":"navigate","params":{"url":"https://example.com"}}"#;
        let cmd: Command = serde_json::from_str(json).expect("parse");

        assert!(matches!(cmd, Command::Native(NativeCommand::Navigate { .. })));
        assert_eq!(cmd.name(), "navigate");
    }

    #[test]
    fn test_native_command_roundtrip() {
        let cmd = Command::Native(NativeCommand::NativeClick {
            selector: Some("#submit".to_string()),
            x: None,
            y: None,
            tab: None,
        });
        let json = serde_json::to_string(&cmd).expect("serialize");

        assert!(json.contains("\"command\":\"native-click\""));
        assert!(json.contains("#submit"));

        let back: Command = serde_json::from_str(&json).expect("parse");
        assert_eq!(back.name(), "native-click");
    }

    #[test]
    fn test_dom_command_selected_over_native() {
        let json = r#"{"command":"click","params":{"selector":".btn"}}"#;
        let cmd: Command = serde_json::from_str(json).expect("parse");

        assert!(matches!(cmd, Command::Dom(DomCommand::Click { .. })));
    }

    #[test]
    fn test_type_defaults() {
        let json = r##"{"command":"type","params":{"selector":"#name","text":"hi"}}"##;
        let cmd: Command = serde_json::from_str(json).expect("parse");

        match cmd {
            Command::Dom(DomCommand::Type { clear, append, .. }) => {
                assert!(clear);
                assert!(!append);
            }
            other => panic!("unexpected command: {}", other.name()),
        }
    }

    #[test]
    fn test_wait_for_element_timeout_param() {
        let json =
            r#"{"command":"wait-for-element","params":{"selector":".late","timeoutMs":2000}}"#;
        let cmd: Command = serde_json::from_str(json).expect("parse");

        match cmd {
            Command::Dom(DomCommand::WaitForElement { timeout_ms, .. }) => {
                assert_eq!(timeout_ms, 2000);
            }
            other => panic!("unexpected command: {}", other.name()),
        }
    }

    #[test]
    fn test_read_console_defaults() {
        let json = r#"{"command":"read-console","params":{}}"#;
        let cmd: Command = serde_json::from_str(json).expect("parse");

        match cmd {
            Command::Native(NativeCommand::ReadConsole { limit, clear, tab }) => {
                assert!(limit.is_none());
                assert!(!clear);
                assert!(tab.is_none());
            }
            other => panic!("unexpected command: {}", other.name()),
        }
    }

    #[test]
    fn test_explicit_tab() {
        let json = r#"{"command":"read-console","params":{"tab":"7","limit":100}}"#;
        let cmd: Command = serde_json::from_str(json).expect("parse");

        match cmd {
            Command::Native(c) => assert_eq!(c.tab().map(TabId::as_str), Some("7")),
            Command::Dom(_) => panic!("expected native command"),
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        let json = r#"{"command":"self-destruct","params":{}}"#;
        assert!(serde_json::from_str::<Command>(json).is_err());
    }
}
