//! `relay-agent` - the in-browser endpoint process.
//!
//! Connects to the relay, registers itself as the command endpoint, and
//! executes forwarded commands against the local browser's debugging port.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use browser_relay::agent::{AgentEndpoint, CommandExecutor};
use browser_relay::cdp::session::SessionRegistry;
use browser_relay::config::{AgentConfig, DEFAULT_CDP_PORT};

#[derive(Parser, Debug)]
#[command(name = "relay-agent", about = "Browser command execution agent", version)]
struct Args {
    /// Relay address override, e.g. ws://127.0.0.1:8765.
    #[arg(short, long)]
    relay: Option<String>,

    /// Browser debugging HTTP port.
    #[arg(long, default_value_t = DEFAULT_CDP_PORT)]
    cdp_port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = AgentConfig::new().with_cdp_port(args.cdp_port);
    if let Some(relay) = args.relay {
        config = config.with_relay_override(relay);
    }

    let sessions = SessionRegistry::new(args.cdp_port);
    let executor = Arc::new(CommandExecutor::new(sessions));
    let endpoint = AgentEndpoint::new(executor, config);

    endpoint.run().await;
}
