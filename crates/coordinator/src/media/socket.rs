// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resilient duplex WebSocket to the media server: a caller-driven,
//! single-attempt reconnect, answers server pings, and surfaces connectivity
//! as a watched status so the RPC layer above can fail in-flight calls and
//! re-establish a session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoordinatorError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    Connected,
    Disconnected,
}

/// A duplex connection to the media server with *unary* reconnect: each
/// [`ResilientSocket::reconnect`] call is a single caller-driven dial
/// attempt, not a self-healing loop. Retry policy beyond that single
/// attempt, if any, lives in the caller.
///
/// Callers push outbound text frames with [`ResilientSocket::send`] and read
/// inbound ones off the channel returned by [`ResilientSocket::spawn`]; both
/// keep working across a reconnect. Session continuity across a reconnect
/// is the caller's concern (the media-RPC client re-issues `create` with the
/// last known session id).
pub struct ResilientSocket {
    url: String,
    outbound_tx: mpsc::UnboundedSender<Message>,
    status_tx: watch::Sender<SocketStatus>,
    reconnect_tx: mpsc::UnboundedSender<()>,
    cancel: CancellationToken,
    connected: AtomicBool,
}

impl ResilientSocket {
    /// Spawn the driver task and perform the initial dial attempt (the
    /// coordinator's one boot-time connect, per spec). Later reconnects are
    /// only ever initiated by an explicit call to [`Self::reconnect`].
    pub fn spawn(url: String) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (status_tx, _) = watch::channel(SocketStatus::Disconnected);
        let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let socket = Arc::new(Self {
            url,
            outbound_tx,
            status_tx,
            reconnect_tx,
            cancel,
            connected: AtomicBool::new(false),
        });

        let driver = Arc::clone(&socket);
        tokio::spawn(async move {
            driver.run(outbound_rx, inbound_tx, reconnect_rx).await;
        });

        socket.reconnect();
        (socket, inbound_rx)
    }

    pub fn send(&self, text: String) -> Result<(), CoordinatorError> {
        self.outbound_tx
            .send(Message::Text(text.into()))
            .map_err(|_| CoordinatorError::Disconnected)
    }

    pub fn status(&self) -> watch::Receiver<SocketStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Request a single dial attempt. A no-op if a connection is already up;
    /// otherwise the driver task tries exactly once and publishes the
    /// outcome on [`Self::status`].
    pub fn reconnect(&self) {
        let _ = self.reconnect_tx.send(());
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    async fn run(
        self: Arc<Self>,
        mut outbound_rx: mpsc::UnboundedReceiver<Message>,
        inbound_tx: mpsc::Sender<String>,
        mut reconnect_rx: mpsc::UnboundedReceiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                requested = reconnect_rx.recv() => {
                    if requested.is_none() {
                        return;
                    }
                }
            }

            if self.is_connected() {
                continue;
            }

            match tokio_tungstenite::connect_async(&self.url).await {
                Ok((ws, _)) => {
                    self.connected.store(true, Ordering::Relaxed);
                    let _ = self.status_tx.send(SocketStatus::Connected);
                    info!(url = %self.url, "media server connected");

                    let reason = self.drive(ws, &mut outbound_rx, &inbound_tx).await;

                    self.connected.store(false, Ordering::Relaxed);
                    let _ = self.status_tx.send(SocketStatus::Disconnected);
                    warn!(url = %self.url, reason = %reason, "media server disconnected, awaiting an explicit reconnect");
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "media server connect failed, awaiting an explicit reconnect");
                }
            }
        }
    }

    async fn drive(
        &self,
        ws: WsStream,
        outbound_rx: &mut mpsc::UnboundedReceiver<Message>,
        inbound_tx: &mpsc::Sender<String>,
    ) -> String {
        let (mut write, mut read) = ws.split();
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    match msg {
                        Some(m) => {
                            if let Err(e) = write.send(m).await {
                                return format!("write failed: {e}");
                            }
                        }
                        None => return "outbound channel closed".to_owned(),
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if inbound_tx.send(text.to_string()).await.is_err() {
                                return "inbound channel closed".to_owned();
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                return format!("pong failed: {e}");
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("media server heartbeat pong received");
                        }
                        Some(Ok(Message::Close(_))) | None => return "closed by peer".to_owned(),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return format!("read error: {e}"),
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                        return format!("ping failed: {e}");
                    }
                }
                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return "closed locally".to_owned();
                }
            }
        }
    }
}
