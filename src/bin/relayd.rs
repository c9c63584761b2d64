//! `relayd` - the relay server daemon.
//!
//! Binds the WebSocket relay on localhost and runs until interrupted.

use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use browser_relay::config::DEFAULT_RELAY_PORT;
use browser_relay::relay::{Relay, RelayOptions};

#[derive(Parser, Debug)]
#[command(name = "relayd", about = "Browser command relay server", version)]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_RELAY_PORT)]
    port: u16,

    /// Per-request deadline in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> browser_relay::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let options = RelayOptions::new(args.port)
        .with_request_timeout(Duration::from_millis(args.timeout_ms));
    let relay = Relay::bind_with(options).await?;

    info!(url = %relay.ws_url(), "Relay ready");

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    relay.shutdown();

    Ok(())
}
