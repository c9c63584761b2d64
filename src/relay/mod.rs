//! Relay server: rendezvous between controllers and the in-browser
//! endpoint, with request-id correlation and per-request deadlines.

pub mod server;

pub use server::{Relay, RelayOptions};
