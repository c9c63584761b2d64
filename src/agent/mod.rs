//! Agent side: the relay-facing endpoint, the command executor, and the
//! in-page script runtime.
//!
//! The endpoint holds the durable connection to the Relay; the executor
//! fans commands out to the native-protocol or DOM-fallback strategy.

pub mod endpoint;
pub mod executor;
pub mod page_script;

pub use endpoint::AgentEndpoint;
pub use executor::CommandExecutor;
