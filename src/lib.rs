//! # browser-relay
//!
//! A command relay for driving a running browser: controllers speak a
//! small JSON protocol to a local WebSocket relay, which forwards each
//! command to an in-browser agent endpoint; the agent executes commands
//! either through the browser's native debugging protocol or through
//! in-page scripts, and routes results back by request id.
//!
//! ## Architecture
//!
//! ```text
//! controller ──ws──▶ Relay ──ws──▶ AgentEndpoint ─▶ CommandExecutor
//!                      │                                 │
//!                      └── request-id correlation        ├─▶ native protocol (CDP)
//!                                                        └─▶ in-page scripts (DOM)
//! ```
//!
//! ## Modules
//!
//! - [`relay`] - WebSocket relay: endpoint registration, forwarding, timeouts
//! - [`agent`] - endpoint client, command executor, page-script builders
//! - [`cdp`] - debugging-protocol sessions, event buffers, target discovery
//! - [`protocol`] - wire types: commands, envelopes, handshake
//! - [`identifiers`] - request and tab identifiers
//! - [`config`] - ports, timeouts, candidate relay addresses
//! - [`error`] - crate-wide error type
//!
//! ## Example
//!
//! ```no_run
//! use browser_relay::relay::Relay;
//!
//! #[tokio::main]
//! async fn main() -> browser_relay::Result<()> {
//!     let relay = Relay::bind(8765).await?;
//!     println!("relay listening on {}", relay.ws_url());
//!     tokio::signal::ctrl_c().await?;
//!     relay.shutdown();
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cdp;
pub mod config;
pub mod error;
pub mod identifiers;
pub mod protocol;
pub mod relay;

pub use agent::{AgentEndpoint, CommandExecutor};
pub use cdp::session::SessionRegistry;
pub use error::{Error, Result};
pub use identifiers::{RequestId, TabId};
pub use protocol::{Command, DomCommand, ForwardedCommand, NativeCommand, ResponseFrame};
pub use relay::{Relay, RelayOptions};
