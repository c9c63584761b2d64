//! Native debugging protocol access: discovery, connections, sessions,
//! and event buffers.
//!
//! The session controller owns the `detached → attached → detached` state
//! machine per tab and the bounded console/network buffers fed while a
//! session stays attached.

pub mod buffers;
pub mod connection;
pub mod discovery;
pub mod session;

pub use buffers::{
    CONSOLE_BUFFER_CAPACITY, ConsoleBuffer, ConsoleEntry, DEFAULT_CONSOLE_READ_LIMIT,
    DEFAULT_NETWORK_READ_LIMIT, EventBuffer, NETWORK_BUFFER_CAPACITY, NetworkBuffer, NetworkEntry,
};
pub use connection::{CdpConnection, CdpEvent};
pub use discovery::{TargetInfo, find_target, first_page_target, list_targets};
pub use session::SessionRegistry;
