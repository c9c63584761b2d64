//! Behavioral tests for the executor and session registry against a
//! scripted local browser: a stub `/json` discovery endpoint plus a
//! WebSocket server speaking just enough of the debugging protocol.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use browser_relay::{Command, CommandExecutor, DomCommand, NativeCommand, SessionRegistry, TabId};

const TAB: &str = "tab-1";

// ============================================================================
// Scripted browser fixture
// ============================================================================

/// How the scripted browser answers `Runtime.evaluate`, counted across all
/// connections.
#[derive(Clone)]
enum EvalScript {
    /// Every evaluation yields `false`.
    AlwaysFalse,
    /// First evaluation yields `false`, later ones `true`.
    FalseThenTrue,
    /// First evaluation drops the socket, later ones yield the value.
    DropFirstThenValue(i64),
    /// Every evaluation drops the socket.
    AlwaysDrop,
}

#[derive(Default)]
struct BrowserStats {
    connections: AtomicUsize,
    evaluate_calls: AtomicUsize,
}

struct FakeBrowser {
    http_port: u16,
    stats: Arc<BrowserStats>,
}

impl FakeBrowser {
    async fn start(script: EvalScript) -> Self {
        let ws_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ws");
        let ws_port = ws_listener.local_addr().expect("ws addr").port();
        let http_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind http");
        let http_port = http_listener.local_addr().expect("http addr").port();

        let stats = Arc::new(BrowserStats::default());

        tokio::spawn(serve_discovery(http_listener, ws_port));
        tokio::spawn(serve_sessions(ws_listener, script, Arc::clone(&stats)));

        Self { http_port, stats }
    }

    fn executor(&self) -> CommandExecutor {
        CommandExecutor::new(SessionRegistry::new(self.http_port))
    }

    fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    fn evaluate_calls(&self) -> usize {
        self.stats.evaluate_calls.load(Ordering::SeqCst)
    }
}

/// Minimal discovery endpoint: one page target pointing at the scripted
/// WebSocket server.
async fn serve_discovery(listener: TcpListener, ws_port: u16) {
    while let Ok((mut stream, _)) = listener.accept().await {
        tokio::spawn(async move {
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request).await;

            let body = json!([{
                "id": TAB,
                "type": "page",
                "title": "fixture",
                "url": "about:blank",
                "webSocketDebuggerUrl":
                    format!("ws://127.0.0.1:{ws_port}/devtools/page/{TAB}"),
            }])
            .to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
    }
}

async fn serve_sessions(listener: TcpListener, script: EvalScript, stats: Arc<BrowserStats>) {
    while let Ok((stream, _)) = listener.accept().await {
        stats.connections.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(serve_one_session(stream, script.clone(), Arc::clone(&stats)));
    }
}

async fn serve_one_session(stream: TcpStream, script: EvalScript, stats: Arc<BrowserStats>) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else { continue };
        let frame: Value = serde_json::from_str(&text).expect("command frame");
        let id = frame["id"].as_u64().expect("command id");

        let result = if frame["method"] == "Runtime.evaluate" {
            let call = stats.evaluate_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let value = match &script {
                EvalScript::AlwaysFalse => json!({"type": "boolean", "value": false}),
                EvalScript::FalseThenTrue => json!({"type": "boolean", "value": call > 1}),
                EvalScript::DropFirstThenValue(value) => {
                    if call == 1 {
                        let _ = ws.close(None).await;
                        return;
                    }
                    json!({"type": "number", "value": value})
                }
                EvalScript::AlwaysDrop => {
                    let _ = ws.close(None).await;
                    return;
                }
            };
            json!({"result": value})
        } else {
            // Domain enables and anything else succeed with an empty result.
            json!({})
        };

        let reply = json!({"id": id, "result": result});
        if ws
            .send(Message::Text(reply.to_string().into()))
            .await
            .is_err()
        {
            return;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn wait_for_element_reports_timeout_not_error() {
    let browser = FakeBrowser::start(EvalScript::AlwaysFalse).await;
    let executor = browser.executor();

    let result = executor
        .execute(Command::Dom(DomCommand::WaitForElement {
            selector: ".never".to_string(),
            timeout_ms: 300,
            tab: Some(TabId::new(TAB)),
        }))
        .await
        .expect("timeout is an expected outcome");

    assert_eq!(result, json!({"found": false, "timeout": true}));
}

#[tokio::test]
async fn wait_for_element_finds_late_element() {
    let browser = FakeBrowser::start(EvalScript::FalseThenTrue).await;
    let executor = browser.executor();

    let result = executor
        .execute(Command::Dom(DomCommand::WaitForElement {
            selector: ".late".to_string(),
            timeout_ms: 2000,
            tab: Some(TabId::new(TAB)),
        }))
        .await
        .expect("found before deadline");

    assert_eq!(result, json!({"found": true, "timeout": false}));
}

#[tokio::test]
async fn evaluate_reattaches_once_after_session_loss() {
    let browser = FakeBrowser::start(EvalScript::DropFirstThenValue(42)).await;
    let executor = browser.executor();

    let result = executor
        .execute(Command::Native(NativeCommand::Evaluate {
            expression: "6 * 7".to_string(),
            tab: Some(TabId::new(TAB)),
        }))
        .await
        .expect("retry succeeds");

    assert_eq!(result, json!(42));
    // One failed attempt, one retried attempt, one fresh session.
    assert_eq!(browser.evaluate_calls(), 2);
    assert_eq!(browser.connections(), 2);
}

#[tokio::test]
async fn evaluate_gives_up_after_single_retry() {
    let browser = FakeBrowser::start(EvalScript::AlwaysDrop).await;
    let executor = browser.executor();

    let result = executor
        .execute(Command::Native(NativeCommand::Evaluate {
            expression: "1".to_string(),
            tab: Some(TabId::new(TAB)),
        }))
        .await;

    assert!(result.is_err());
    // The retry is capped at one; no third attempt is made.
    assert_eq!(browser.evaluate_calls(), 2);
}

#[tokio::test]
async fn attach_on_attached_tab_is_noop() {
    let browser = FakeBrowser::start(EvalScript::AlwaysFalse).await;
    let executor = browser.executor();
    let tab = TabId::new(TAB);

    for _ in 0..2 {
        let result = executor
            .execute(Command::Native(NativeCommand::DebuggerAttach {
                tab: Some(tab.clone()),
            }))
            .await
            .expect("attach succeeds");
        assert_eq!(result["attached"], json!(true));
    }

    // The second attach reused the existing session.
    assert_eq!(browser.connections(), 1);
    assert!(executor.sessions().is_attached(&tab));
}

#[tokio::test]
async fn concurrent_attach_keeps_single_session() {
    let browser = FakeBrowser::start(EvalScript::AlwaysFalse).await;
    let registry = SessionRegistry::new(browser.http_port);
    let tab = TabId::new(TAB);

    let (first, second) = tokio::join!(registry.attach(&tab), registry.attach(&tab));
    first.expect("first attach");
    second.expect("second attach");

    assert_eq!(registry.attached_count(), 1);
    assert!(registry.is_attached(&tab));
}
