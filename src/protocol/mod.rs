//! Relay wire protocol: commands, envelopes, and frame classification.
//!
//! # Message Flow
//!
//! ```text
//! Controller          Relay              Endpoint            Browser
//!     │  {command}──────▶│                   │                  │
//!     │                  │──{id,command}────▶│                  │
//!     │                  │                   │──CDP / script───▶│
//!     │                  │◀──{id,result}─────│                  │
//!     │◀─{id,result}─────│                   │                  │
//! ```

mod command;
mod envelope;

pub use command::{Command, DomCommand, NativeCommand, UploadFile};
pub use envelope::{ForwardedCommand, Handshake, RelayInbound, ResponseFrame};
