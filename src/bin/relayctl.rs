//! `relayctl` - command-line controller.
//!
//! Sends one command to the relay, waits for the correlated response, and
//! prints the result as JSON. Exits non-zero on an error response.

use std::path::PathBuf;
use std::process::ExitCode;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

use browser_relay::config::default_relay_addr;
use browser_relay::error::{Error, Result};
use browser_relay::protocol::{Command, DomCommand, NativeCommand, ResponseFrame, UploadFile};
use browser_relay::TabId;

#[derive(Parser, Debug)]
#[command(name = "relayctl", about = "Browser relay controller", version)]
struct Args {
    /// Relay address.
    #[arg(long, default_value_t = default_relay_addr())]
    relay: String,

    /// Target tab id (the agent's current target if omitted).
    #[arg(long, global = true)]
    tab: Option<String>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Navigate the tab to a URL.
    Navigate { url: String },

    /// Evaluate a JavaScript expression in page context.
    Evaluate { expression: String },

    /// Click an element via standard DOM events.
    Click { selector: String },

    /// Type into an element via standard DOM events.
    Type {
        selector: String,
        text: String,
        /// Append to existing content instead of replacing it.
        #[arg(long)]
        append: bool,
    },

    /// Scroll an element, or the window.
    Scroll {
        #[arg(long)]
        selector: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        dx: f64,
        #[arg(long, default_value_t = 0.0)]
        dy: f64,
    },

    /// Describe the first element matching a selector.
    GetElement { selector: String },

    /// Describe all elements matching a selector.
    GetElements { selector: String },

    /// Read an element's text content.
    GetText { selector: String },

    /// Read an element's outer HTML, or the whole document.
    GetHtml {
        #[arg(long)]
        selector: Option<String>,
    },

    /// Read an element attribute.
    GetAttribute { selector: String, name: String },

    /// Wait for an element to appear.
    WaitFor {
        selector: String,
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },

    /// Replace an element's inner HTML, or the document body.
    SetHtml {
        html: String,
        #[arg(long)]
        selector: Option<String>,
    },

    /// Upload local files to a file input (content sent inline).
    Upload {
        selector: String,
        /// Local file paths.
        files: Vec<PathBuf>,
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
    },

    /// Click via native pointer events.
    NativeClick {
        #[arg(long)]
        selector: Option<String>,
        #[arg(long)]
        x: Option<f64>,
        #[arg(long)]
        y: Option<f64>,
    },

    /// Insert text via a native text-insertion event.
    NativeType {
        text: String,
        #[arg(long)]
        selector: Option<String>,
        #[arg(long)]
        clear: bool,
        #[arg(long)]
        press_enter: bool,
    },

    /// Scroll via a native wheel event.
    NativeScroll {
        #[arg(long, default_value_t = 0.0)]
        dx: f64,
        #[arg(long, default_value_t = 0.0)]
        dy: f64,
    },

    /// Capture a screenshot of the visible tab.
    Screenshot,

    /// Capture a protocol-level screenshot (attached session required).
    NativeScreenshot {
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        quality: Option<u8>,
        #[arg(long)]
        full_page: bool,
    },

    /// Set a file input's files at the protocol level (paths, no inline data).
    NativeUpload {
        selector: String,
        files: Vec<String>,
    },

    /// Read buffered console entries.
    ReadConsole {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        clear: bool,
    },

    /// Read buffered network entries.
    ReadNetwork {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        clear: bool,
    },

    /// Attach the debugger to the tab.
    Attach,

    /// Detach the debugger from the tab.
    Detach,
}

impl Action {
    /// Builds the wire command, consuming the parsed arguments.
    fn into_command(self, tab: Option<TabId>) -> Result<Command> {
        let command = match self {
            Self::Navigate { url } => Command::Native(NativeCommand::Navigate { url, tab }),
            Self::Evaluate { expression } => {
                Command::Native(NativeCommand::Evaluate { expression, tab })
            }
            Self::Click { selector } => Command::Dom(DomCommand::Click { selector, tab }),
            Self::Type {
                selector,
                text,
                append,
            } => Command::Dom(DomCommand::Type {
                selector,
                text,
                clear: !append,
                append,
                tab,
            }),
            Self::Scroll { selector, dx, dy } => Command::Dom(DomCommand::Scroll {
                selector,
                dx,
                dy,
                tab,
            }),
            Self::GetElement { selector } => Command::Dom(DomCommand::GetElement { selector, tab }),
            Self::GetElements { selector } => {
                Command::Dom(DomCommand::GetElements { selector, tab })
            }
            Self::GetText { selector } => Command::Dom(DomCommand::GetText { selector, tab }),
            Self::GetHtml { selector } => Command::Dom(DomCommand::GetHtml { selector, tab }),
            Self::GetAttribute { selector, name } => Command::Dom(DomCommand::GetAttribute {
                selector,
                name,
                tab,
            }),
            Self::WaitFor {
                selector,
                timeout_ms,
            } => Command::Dom(DomCommand::WaitForElement {
                selector,
                timeout_ms,
                tab,
            }),
            Self::SetHtml { html, selector } => Command::Dom(DomCommand::SetHtml {
                selector,
                html,
                tab,
            }),
            Self::Upload {
                selector,
                files,
                mime,
            } => Command::Dom(DomCommand::Upload {
                selector,
                files: read_upload_files(&files, &mime)?,
                tab,
            }),
            Self::NativeClick { selector, x, y } => Command::Native(NativeCommand::NativeClick {
                selector,
                x,
                y,
                tab,
            }),
            Self::NativeType {
                text,
                selector,
                clear,
                press_enter,
            } => Command::Native(NativeCommand::NativeType {
                text,
                selector,
                clear,
                press_enter,
                tab,
            }),
            Self::NativeScroll { dx, dy } => {
                Command::Native(NativeCommand::NativeScroll { dx, dy, tab })
            }
            Self::Screenshot => Command::Native(NativeCommand::Screenshot { tab }),
            Self::NativeScreenshot {
                format,
                quality,
                full_page,
            } => Command::Native(NativeCommand::NativeScreenshot {
                format,
                quality,
                full_page,
                tab,
            }),
            Self::NativeUpload { selector, files } => {
                Command::Native(NativeCommand::NativeUpload {
                    selector,
                    files,
                    tab,
                })
            }
            Self::ReadConsole { limit, clear } => {
                Command::Native(NativeCommand::ReadConsole { limit, clear, tab })
            }
            Self::ReadNetwork { limit, clear } => {
                Command::Native(NativeCommand::ReadNetwork { limit, clear, tab })
            }
            Self::Attach => Command::Native(NativeCommand::DebuggerAttach { tab }),
            Self::Detach => Command::Native(NativeCommand::DebuggerDetach { tab }),
        };
        Ok(command)
    }
}

/// Reads local files and base64-encodes them for the in-page upload path.
fn read_upload_files(paths: &[PathBuf], mime: &str) -> Result<Vec<UploadFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        files.push(UploadFile {
            name,
            mime: mime.to_string(),
            data: BASE64.encode(bytes),
        });
    }
    Ok(files)
}

/// Sends one command and waits for the correlated response.
async fn round_trip(relay: &str, command: Command) -> Result<serde_json::Value> {
    let (ws_stream, _) = connect_async(relay).await?;
    let (mut ws_write, mut ws_read) = ws_stream.split();

    ws_write
        .send(Message::Text(serde_json::to_string(&command)?.into()))
        .await?;

    while let Some(message) = ws_read.next().await {
        match message? {
            Message::Text(text) => {
                let response: ResponseFrame = serde_json::from_str(&text)
                    .map_err(|e| Error::protocol(format!("malformed relay response: {e}")))?;
                return response.into_result();
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    Err(Error::ConnectionClosed)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let tab = args.tab.map(TabId::from);

    let command = match args.action.into_command(tab) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match round_trip(&args.relay, command).await {
        Ok(result) => {
            println!("{result:#}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
