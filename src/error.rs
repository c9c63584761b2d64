//! Error types for the browser relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use browser_relay::{Result, Error};
//!
//! async fn example(executor: &CommandExecutor) -> Result<()> {
//!     let value = executor.execute(command).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Routing | [`Error::NotConnected`] |
//! | Session | [`Error::AttachFailed`], [`Error::NotAttached`], [`Error::TargetNotFound`] |
//! | Execution | [`Error::ElementNotFound`], [`Error::Evaluation`], [`Error::Execution`] |
//! | Protocol | [`Error::Protocol`], [`Error::RequestTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{RequestId, TabId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Every variant terminates at the nearest protocol boundary as the `error`
/// field of a response envelope; nothing crashes the Relay or the agent.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when relay or agent configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connection failed or was refused.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt timed out.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Routing Errors
    // ========================================================================
    /// No in-browser endpoint is registered with the Relay.
    ///
    /// Surfaced immediately without a round trip; no request is queued
    /// for a future connection.
    #[error("extension not connected")]
    NotConnected,

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Debugger attach failed for a tab.
    #[error("Attach failed for tab {tab_id}: {message}")]
    AttachFailed {
        /// The tab that failed to attach.
        tab_id: TabId,
        /// Description of the failure.
        message: String,
    },

    /// Operation requires an attached session but none exists.
    #[error("Debugger not attached: tab {tab_id}")]
    NotAttached {
        /// The unattached tab.
        tab_id: TabId,
    },

    /// Debugging target not found via discovery.
    #[error("Target not found: {target}")]
    TargetNotFound {
        /// The missing target identifier or description.
        target: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Element not found by selector.
    #[error("Element not found: {selector}")]
    ElementNotFound {
        /// Selector used (structural or XPath).
        selector: String,
    },

    /// Exception thrown during page-context evaluation.
    ///
    /// Captured and returned as a structured error result rather than
    /// propagated as a transport failure.
    #[error("Evaluation error: {message}")]
    Evaluation {
        /// Error message from the page script.
        message: String,
    },

    /// Command execution failed (invalid selector, missing upload target, ...).
    #[error("Execution error: {message}")]
    Execution {
        /// Description of the execution failure.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Forwarded request received no response within the deadline.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP discovery error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an attach failed error.
    #[inline]
    pub fn attach_failed(tab_id: TabId, message: impl Into<String>) -> Self {
        Self::AttachFailed {
            tab_id,
            message: message.into(),
        }
    }

    /// Creates a not-attached error.
    #[inline]
    pub fn not_attached(tab_id: TabId) -> Self {
        Self::NotAttached { tab_id }
    }

    /// Creates a target not found error.
    #[inline]
    pub fn target_not_found(target: impl Into<String>) -> Self {
        Self::TargetNotFound {
            target: target.into(),
        }
    }

    /// Creates an element not found error.
    #[inline]
    pub fn element_not_found(selector: impl Into<String>) -> Self {
        Self::ElementNotFound {
            selector: selector.into(),
        }
    }

    /// Creates an evaluation error.
    #[inline]
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    /// Creates an execution error.
    #[inline]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection-class error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error indicates the debugging session is gone.
    ///
    /// Used by the executor to decide on the single re-attach-and-retry
    /// cycle for `evaluate`.
    #[inline]
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        matches!(
            self,
            Self::NotAttached { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_not_connected_display() {
        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "extension not connected");
    }

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(RequestId::from_u64(3), 30_000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_session_lost() {
        let lost = Error::not_attached(TabId::new("7"));
        assert!(lost.is_session_lost());
        assert!(Error::ConnectionClosed.is_session_lost());
        assert!(!Error::evaluation("boom").is_session_lost());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
