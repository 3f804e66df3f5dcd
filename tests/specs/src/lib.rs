// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `signalhub` binary as a subprocess against a mock media
//! server and exercises it over its browser-facing WebSocket and HTTP
//! surfaces.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Resolve the path to the compiled `signalhub` binary.
pub fn signalhub_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("signalhub")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A media server stand-in that answers every request with a synthesized
/// id or, for `processOffer`, a fixed SDP answer — the same shape the
/// coordinator's own unit tests drive it with, just reachable over a real
/// socket so the compiled binary can dial it at boot.
pub struct MockMediaServer {
    pub addr: std::net::SocketAddr,
}

impl MockMediaServer {
    /// Bind and start accepting the coordinator's single boot-time
    /// connection. Accepts connections for the lifetime of the returned
    /// handle's background task, so a reconnect mid-test is answered too.
    pub async fn spawn() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else { return };
                    let (mut tx, mut rx) = ws.split();
                    let mut counter: u64 = 0;
                    while let Some(Ok(Message::Text(text))) = rx.next().await {
                        let Ok(req) = serde_json::from_str::<Value>(&text) else { continue };
                        let value = match req["method"].as_str().unwrap_or_default() {
                            "create" => {
                                counter += 1;
                                json!(format!("obj-{counter}"))
                            }
                            "subscribe" => {
                                counter += 1;
                                json!(format!("sub-{counter}"))
                            }
                            "invoke" if req["params"]["operation"] == "processOffer" => {
                                json!("v=0 mock-sdp-answer")
                            }
                            _ => Value::Null,
                        };
                        let reply = json!({
                            "jsonrpc": "2.0",
                            "id": req["id"],
                            "result": { "value": value, "sessionId": "spec-session" },
                        });
                        if tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        Ok(Self { addr })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

/// A running `signalhub` process that is killed on drop.
pub struct CoordinatorProcess {
    child: Child,
    port: u16,
}

impl CoordinatorProcess {
    /// Spawn the coordinator bound to a free port and pointed at `media`.
    pub fn start(media: &MockMediaServer) -> anyhow::Result<Self> {
        let binary = signalhub_binary();
        anyhow::ensure!(binary.exists(), "signalhub binary not found at {}", binary.display());

        let port = free_port()?;
        let child = Command::new(&binary)
            .args([
                "--host",
                "127.0.0.1",
                "--port",
                &port.to_string(),
                "--media-server-url",
                &media.url(),
                "--log-format",
                "text",
                "--log-level",
                "warn",
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/signaling", self.port)
    }

    /// Poll `/healthz` until it reports readiness.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/healthz", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("signalhub did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub async fn wait_exit(&mut self, timeout: Duration) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("signalhub did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for CoordinatorProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub type BrowserSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connect a browser-side WebSocket to a running coordinator.
pub async fn connect_browser(coordinator: &CoordinatorProcess) -> anyhow::Result<BrowserSocket> {
    let (ws, _) = tokio_tungstenite::connect_async(coordinator.ws_url()).await?;
    Ok(ws)
}

/// Send a JSON command frame.
pub async fn send_cmd(ws: &mut BrowserSocket, value: Value) -> anyhow::Result<()> {
    ws.send(Message::Text(value.to_string().into())).await?;
    Ok(())
}

/// Receive and parse the next JSON frame within a bounded timeout.
pub async fn recv_json(ws: &mut BrowserSocket, timeout: Duration) -> anyhow::Result<Value> {
    loop {
        let msg = tokio::time::timeout(timeout, ws.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
        match msg {
            Message::Text(text) => return Ok(serde_json::from_str(&text)?),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => anyhow::bail!("expected a text frame, got: {other:?}"),
        }
    }
}
