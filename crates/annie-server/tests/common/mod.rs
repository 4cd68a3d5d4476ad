//! Shared harness: a seeded database, a scripted fake speech agent, and the
//! real server on an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use annie_db::{create_pool, get_call, run_migrations, CallRecord, DbPool, DbRuntimeSettings};
use annie_server::config::Config;
use annie_server::{app, AppState};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

pub struct TestDb {
    _file: tempfile::NamedTempFile,
    pub pool: DbPool,
}

/// Organization 1, patient 5 (Mary Smith), call 42 assigned to `annie_RPM`.
pub fn seeded_db() -> TestDb {
    let file = tempfile::NamedTempFile::new().unwrap();
    let pool = create_pool(file.path().to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO organizations (id, name) VALUES (1, 'Sunrise Clinic');
             INSERT INTO patients (id, org_id, patient_id, name, dob)
                 VALUES (5, 1, 'P-5', 'Mary Smith', '1948-03-09');
             INSERT INTO calls (id, org_id, patient_id, agent) VALUES (42, 1, 5, 'annie_RPM');",
        )
        .unwrap();
    }
    TestDb { _file: file, pool }
}

/// Polls until the call record satisfies `done`.
pub async fn wait_for_call(pool: &DbPool, call_id: i64, done: impl Fn(&CallRecord) -> bool) -> CallRecord {
    for _ in 0..100 {
        let record = get_call(&pool.get().unwrap(), call_id).unwrap().unwrap();
        if done(&record) {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("call {call_id} never reached the expected state");
}

/// What the fake agent observed from the bridge.
#[derive(Debug)]
pub enum Seen {
    Settings(Value),
    Audio(usize),
    Control(Value),
}

#[derive(Debug, Clone)]
pub enum AgentScript {
    /// Sends `after_settings` text frames, then echoes audio back.
    Echo { after_settings: Vec<String> },
    /// Closes the session right after the settings message.
    CloseAfterSettings,
    /// Rejects the handshake with 401.
    Reject,
}

/// Accepts one agent session and plays `script`.
pub async fn spawn_fake_agent(script: AgentScript) -> (SocketAddr, mpsc::UnboundedReceiver<Seen>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();

        if let AgentScript::Reject = script {
            let reject = |_: &Request, _: Response| -> Result<Response, ErrorResponse> {
                let mut denied = ErrorResponse::new(Some("bad token".to_string()));
                *denied.status_mut() = StatusCode::UNAUTHORIZED;
                Err(denied)
            };
            let _ = tokio_tungstenite::accept_hdr_async(tcp, reject).await;
            return;
        }

        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = seen_tx.send(Seen::Settings(serde_json::from_str(text.as_str()).unwrap()));
        }

        let after_settings = match script {
            AgentScript::Echo { after_settings } => after_settings,
            _ => {
                let _ = ws.close(None).await;
                return;
            }
        };

        for text in after_settings {
            if ws.send(Message::text(text)).await.is_err() {
                return;
            }
        }

        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Binary(audio) => {
                    let _ = seen_tx.send(Seen::Audio(audio.len()));
                    if ws.send(Message::binary(audio)).await.is_err() {
                        break;
                    }
                }
                Message::Text(text) => {
                    let _ = seen_tx.send(Seen::Control(serde_json::from_str(text.as_str()).unwrap()));
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    (addr, seen_rx)
}

/// Runs the real app against `agent_addr`, returning its address.
pub async fn start_server(pool: DbPool, agent_addr: SocketAddr, prompts_dir: &Path, api_key: &str) -> SocketAddr {
    let mut config = Config::default();
    config.agent.url = format!("ws://{agent_addr}/v1/agent/converse");
    config.agent.api_key = api_key.to_string();
    config.agent.connect_timeout_secs = 2;
    config.bridge.prompts_dir = prompts_dir.to_string_lossy().into_owned();
    config.bridge.stream_token_wait_ms = 2_000;

    let state = AppState::from_config(pool, &config, CancellationToken::new()).unwrap();
    let app = app(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

/// A prompts directory holding `annie_RPM.txt`.
pub fn prompts_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("annie_RPM.txt"),
        "You are Annie, a remote patient monitoring nurse.",
    )
    .unwrap();
    dir
}

pub async fn recv_seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("fake agent observed nothing in time")
        .expect("fake agent channel closed")
}
