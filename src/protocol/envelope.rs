//! Protocol envelopes: forwarded commands, responses, and the handshake.
//!
//! Frames are newline-free JSON text over a persistent WebSocket:
//!
//! | Direction | Frame |
//! |-----------|-------|
//! | Controller → Relay | `{"command": ..., "params": {...}}` |
//! | Relay → endpoint | controller frame plus `"id"` |
//! | Endpoint → Relay | `{"id": n, "result": ...}` or `{"id": n, "error": "..."}` |
//! | Endpoint → Relay (once) | `{"type": "connected", "message": "..."}` |
//!
//! Exactly one of `result`/`error` is present on a response. The handshake
//! carries neither a command nor an id; it registers the sending connection
//! as *the* in-browser endpoint.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::Command;

// ============================================================================
// ForwardedCommand
// ============================================================================

/// A controller command tagged with a relay-local request id, as forwarded
/// to the in-browser endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardedCommand {
    /// Relay-assigned request id.
    pub id: RequestId,

    /// The original command, flattened into the frame.
    #[serde(flatten)]
    pub command: Command,
}

impl ForwardedCommand {
    /// Creates a forwarded command.
    #[inline]
    #[must_use]
    pub fn new(id: RequestId, command: Command) -> Self {
        Self { id, command }
    }
}

// ============================================================================
// ResponseFrame
// ============================================================================

/// A correlated response carrying either a result or an error message.
///
/// Endpoint responses always carry the forwarded request's id. Replies
/// written back to a controller echo the id when one was assigned; routing
/// errors raised before id assignment carry none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Matching request id, if one was assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// Result value (success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error message (failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseFrame {
    /// Creates a success response.
    #[inline]
    #[must_use]
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response for an assigned id.
    #[inline]
    #[must_use]
    pub fn err(id: RequestId, error: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            result: None,
            error: Some(error.into()),
        }
    }

    /// Creates an error response with no id (routing errors).
    #[inline]
    #[must_use]
    pub fn err_unrouted(error: impl Into<String>) -> Self {
        Self {
            id: None,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Creates a response from an execution result.
    #[inline]
    #[must_use]
    pub fn from_result(id: RequestId, result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self::ok(id, value),
            Err(e) => Self::err(id, e.to_string()),
        }
    }

    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, converting a carried error message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the response carried an error.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(message) => Err(Error::protocol(message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// One-time `{type:"connected"}` marker sent by the in-browser endpoint
/// upon connecting. Not a command: it registers the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    /// Frame discriminator; always `"connected"` for a valid handshake.
    #[serde(rename = "type")]
    pub kind: String,

    /// Human-readable description of the connecting endpoint.
    pub message: String,
}

impl Handshake {
    /// Creates a `connected` handshake.
    #[inline]
    #[must_use]
    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            kind: "connected".to_string(),
            message: message.into(),
        }
    }

    /// Returns `true` if this frame registers an endpoint.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.kind == "connected"
    }
}

// ============================================================================
// RelayInbound
// ============================================================================

/// Classification of a frame arriving at the Relay.
///
/// Any connection may turn out to be the endpoint (handshake), the endpoint
/// answering (response), or a controller (command); classification is per
/// frame, by shape.
#[derive(Debug, Clone)]
pub enum RelayInbound {
    /// Endpoint registration handshake.
    Handshake(Handshake),
    /// Response from the endpoint for a forwarded command.
    Response(ResponseFrame),
    /// Controller command.
    Command(Box<Command>),
}

impl RelayInbound {
    /// Classifies a text frame by shape.
    ///
    /// Order matters: a handshake has `type`, a response has `id` plus one
    /// of `result`/`error`, everything else must parse as a command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for frames matching none of the shapes.
    pub fn parse(text: &str) -> Result<Self> {
        if let Ok(handshake) = serde_json::from_str::<Handshake>(text) {
            if handshake.is_connected() {
                return Ok(Self::Handshake(handshake));
            }
        }

        if let Ok(response) = serde_json::from_str::<ResponseFrame>(text) {
            if response.id.is_some() && (response.result.is_some() || response.error.is_some()) {
                return Ok(Self::Response(response));
            }
        }

        if let Ok(command) = serde_json::from_str::<Command>(text) {
            return Ok(Self::Command(Box::new(command)));
        }

        Err(Error::protocol(format!("unrecognized frame: {text}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::NativeCommand;

    fn navigate() -> Command {
        Command::Native(NativeCommand::Navigate {
            url: "https://example.com".to_string(),
            tab: None,
        })
    }

    #[test]
    fn test_forwarded_command_has_id_and_command() {
        let frame = ForwardedCommand::new(RequestId::from_u64(9), navigate());
        let json = serde_json::to_string(&frame).expect("serialize");

        assert!(json.contains("\"id\":9"));
        assert!(json.contains("\"command\":\"navigate\""));
        assert!(json.contains("https://example.com"));

        let back: ForwardedCommand = serde_json::from_str(&json).expect("parse");
        assert_eq!(back.id, RequestId::from_u64(9));
        assert_eq!(back.command.name(), "navigate");
    }

    #[test]
    fn test_response_exactly_one_of_result_error() {
        let ok = ResponseFrame::ok(RequestId::from_u64(1), serde_json::json!({"done": true}));
        let json = serde_json::to_string(&ok).expect("serialize");
        assert!(json.contains("result"));
        assert!(!json.contains("error"));

        let err = ResponseFrame::err(RequestId::from_u64(2), "boom");
        let json = serde_json::to_string(&err).expect("serialize");
        assert!(json.contains("error"));
        assert!(!json.contains("result"));
    }

    #[test]
    fn test_response_into_result() {
        let ok = ResponseFrame::ok(RequestId::from_u64(1), serde_json::json!(42));
        assert_eq!(ok.into_result().expect("success"), serde_json::json!(42));

        let err = ResponseFrame::err(RequestId::from_u64(2), "no such element");
        assert!(err.into_result().is_err());
    }

    #[test]
    fn test_handshake_roundtrip() {
        let hs = Handshake::connected("agent 0.1.0");
        let json = serde_json::to_string(&hs).expect("serialize");
        assert!(json.contains("\"type\":\"connected\""));

        let back: Handshake = serde_json::from_str(&json).expect("parse");
        assert!(back.is_connected());
    }

    #[test]
    fn test_classify_handshake() {
        let frame = RelayInbound::parse(r#"{"type":"connected","message":"hi"}"#).expect("parse");
        assert!(matches!(frame, RelayInbound::Handshake(_)));
    }

    #[test]
    fn test_classify_response() {
        let frame = RelayInbound::parse(r#"{"id":3,"result":{"ok":true}}"#).expect("parse");
        match frame {
            RelayInbound::Response(r) => assert_eq!(r.id, Some(RequestId::from_u64(3))),
            other => panic!("unexpected classification: {other:?}"),
        }

        let frame = RelayInbound::parse(r#"{"id":4,"error":"nope"}"#).expect("parse");
        assert!(matches!(frame, RelayInbound::Response(_)));
    }

    #[test]
    fn test_classify_command() {
        let frame = RelayInbound::parse(r#"{"command":"navigate","params":{"url":"x"}}"#)
            .expect("parse");
        match frame {
            RelayInbound::Command(c) => assert_eq!(c.name(), "navigate"),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_classify_garbage() {
        assert!(RelayInbound::parse("not json").is_err());
        assert!(RelayInbound::parse(r#"{"unrelated":1}"#).is_err());
    }
}
