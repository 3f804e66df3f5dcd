// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-browser-socket session: read loop, ping/pong liveness, bounded-size
//! frames, and a serialized writer (spec §4.C).
//!
//! Writes are serialized by routing every outbound frame through a single
//! writer task reached via an unbounded channel, rather than a mutex around
//! the sink — this is the same "one owner, many senders" shape the media-RPC
//! client (`media::client`) uses for its socket, generalized to the
//! browser-facing side. Concurrent producers (the command loop, ICE-event
//! forwarders, and peer-triggered notifications reaching this user through
//! the registry) all hand frames to the same task, so bytes for a single
//! client socket are never interleaved.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::CoordinatorError;
use crate::media::MediaRpcClient;
use crate::registry::Registry;
use crate::session::orchestrator::Orchestrator;
use crate::session::protocol::{ClientMessage, ErrorEnvelope, ServerMessage};

/// Tuning for one client socket (spec §4.C / SPEC_FULL §4.F defaults).
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub max_frame_bytes: usize,
    pub pong_deadline: Duration,
    pub ping_interval: Duration,
    pub write_deadline: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_frame_bytes: 8192,
            pong_deadline: Duration::from_secs(40),
            ping_interval: Duration::from_secs(36),
            write_deadline: Duration::from_secs(10),
        }
    }
}

enum WriterCommand {
    Text(String, oneshot::Sender<Result<(), CoordinatorError>>),
    Ping(oneshot::Sender<Result<(), CoordinatorError>>),
}

/// A cheaply-cloneable handle onto one client socket's serialized writer.
#[derive(Clone)]
pub struct SessionWriter {
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl SessionWriter {
    fn spawn(sink: SplitSink<WebSocket, Message>, write_deadline: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_task(sink, rx, write_deadline));
        Self { tx }
    }

    async fn dispatch(&self, build: impl FnOnce(oneshot::Sender<Result<(), CoordinatorError>>) -> WriterCommand) -> Result<(), CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(build(reply_tx)).is_err() {
            return Err(CoordinatorError::Transport(Box::new(
                tokio_tungstenite::tungstenite::Error::ConnectionClosed,
            )));
        }
        reply_rx.await.unwrap_or(Err(CoordinatorError::Transport(Box::new(
            tokio_tungstenite::tungstenite::Error::ConnectionClosed,
        ))))
    }

    pub async fn send(&self, msg: &ServerMessage) -> Result<(), CoordinatorError> {
        let text = serde_json::to_string(msg)?;
        self.dispatch(|reply| WriterCommand::Text(text, reply)).await
    }

    pub async fn send_error(&self, request: &str, message: String) -> Result<(), CoordinatorError> {
        let envelope = ErrorEnvelope { request: request.to_owned(), error: message };
        let text = serde_json::to_string(&envelope)?;
        self.dispatch(|reply| WriterCommand::Text(text, reply)).await
    }

    async fn ping(&self) -> Result<(), CoordinatorError> {
        self.dispatch(WriterCommand::Ping).await
    }

    #[cfg(test)]
    pub fn test_null() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriterCommand>();
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                let reply = match cmd {
                    WriterCommand::Text(_, reply) => reply,
                    WriterCommand::Ping(reply) => reply,
                };
                let _ = reply.send(Ok(()));
            }
        });
        Self { tx }
    }

    /// Like [`Self::test_null`], but every outgoing text frame is also handed
    /// to the returned receiver, so tests can assert on what was sent.
    #[cfg(test)]
    pub fn test_capture() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriterCommand>();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                let reply = match cmd {
                    WriterCommand::Text(text, reply) => {
                        let _ = sent_tx.send(text);
                        reply
                    }
                    WriterCommand::Ping(reply) => reply,
                };
                let _ = reply.send(Ok(()));
            }
        });
        (Self { tx }, sent_rx)
    }
}

async fn writer_task(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    write_deadline: Duration,
) {
    while let Some(cmd) = rx.recv().await {
        let (frame, reply) = match cmd {
            WriterCommand::Text(text, reply) => (Message::Text(text.into()), reply),
            WriterCommand::Ping(reply) => (Message::Ping(Vec::new().into()), reply),
        };
        let result = tokio::time::timeout(write_deadline, sink.send(frame))
            .await
            .map_err(|_| CoordinatorError::Transport(Box::new(tokio_tungstenite::tungstenite::Error::Io(
                std::io::Error::new(std::io::ErrorKind::TimedOut, "write deadline exceeded"),
            ))))
            .and_then(|inner| inner.map_err(|e| CoordinatorError::from(axum_ws_err_to_tungstenite(e))));
        let failed = result.is_err();
        let _ = reply.send(result);
        if failed {
            break;
        }
    }
}

/// axum's `ws::Error` and `tokio_tungstenite`'s are distinct types; fold the
/// former into the latter so the whole crate has one transport error type.
fn axum_ws_err_to_tungstenite(e: axum::Error) -> tokio_tungstenite::tungstenite::Error {
    tokio_tungstenite::tungstenite::Error::Io(std::io::Error::other(e))
}

/// State shared by every client-socket session.
pub struct SessionDeps {
    pub registry: Arc<Registry>,
    pub media: Arc<MediaRpcClient>,
    pub limits: SessionLimits,
}

/// Drive one accepted browser WebSocket to completion: read loop, pinger,
/// and deferred teardown (spec §5's three-task-per-session layout, minus the
/// command loop which runs inline here since axum gives us one task per
/// connection and sequential `.await` already serializes command handling).
pub async fn serve(socket: WebSocket, deps: Arc<SessionDeps>) {
    let (sink, mut stream) = socket.split();
    let writer = SessionWriter::spawn(sink, deps.limits.write_deadline);
    let mut orchestrator =
        Orchestrator::new(Arc::clone(&deps.registry), Arc::clone(&deps.media), writer.clone());

    let mut ping_timer = tokio::time::interval(deps.limits.ping_interval);
    ping_timer.tick().await;

    loop {
        tokio::select! {
            _ = ping_timer.tick() => {
                if writer.ping().await.is_err() {
                    debug!("ping write failed, tearing down session");
                    break;
                }
            }
            next = tokio::time::timeout(deps.limits.pong_deadline, stream.next()) => {
                match next {
                    Err(_) => {
                        debug!("pong deadline exceeded, tearing down session");
                        break;
                    }
                    Ok(None) | Ok(Some(Err(_))) => break,
                    Ok(Some(Ok(Message::Close(_)))) => break,
                    Ok(Some(Ok(Message::Pong(_)))) | Ok(Some(Ok(Message::Ping(_)))) => {}
                    Ok(Some(Ok(Message::Text(text)))) => {
                        if !dispatch_text(&mut orchestrator, &writer, text.as_str()).await {
                            break;
                        }
                    }
                    Ok(Some(Ok(_))) => {}
                }
            }
        }
    }

    // Deferred teardown runs unconditionally, once, regardless of why the
    // loop above exited — this is the "fresh uncancelled context" spec §5
    // calls for, so `release` calls still reach the media server even after
    // the browser socket has already died.
    let _ = orchestrator.leave().await;
}

/// Decode and dispatch one text frame. Returns `false` if the session should
/// be torn down (malformed frame that can't even be acknowledged, or a write
/// failure while replying).
async fn dispatch_text(orchestrator: &mut Orchestrator, writer: &SessionWriter, text: &str) -> bool {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "malformed client frame");
            return writer.send_error("unknown", format!("malformed request: {e}")).await.is_ok();
        }
    };

    let cmd = msg.cmd_name();
    if let Err(e) = orchestrator.handle(msg).await {
        debug!(cmd, error = %e, "command handler error");
        return writer.send_error(cmd, e.to_string()).await.is_ok();
    }
    true
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
