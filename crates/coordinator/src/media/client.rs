// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response multiplexing and event fan-out over the single duplex
//! connection to the media server: one reader task classifies every inbound
//! frame as either a call response (routed by `id`) or an event notification
//! (routed by `<object>/<topic>`), matching the media server's own framing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CoordinatorError;
use crate::media::protocol::{
    ConstructorParams, CreateParams, EventValue, IncomingFrame, InvokeOperation, InvokeParams,
    MediaObjectKind, Request, ReleaseParams, RpcResult, SubscribeParams, SubscribeTopic,
    UnsubscribeParams,
};
use crate::media::socket::{ResilientSocket, SocketStatus};

/// Client for the media server's JSON-RPC 2.0 dialect. One instance per
/// process; every room and endpoint call goes through it.
pub struct MediaRpcClient {
    socket: Arc<ResilientSocket>,
    pending: Mutex<HashMap<String, oneshot::Sender<Result<RpcResult, CoordinatorError>>>>,
    events: Mutex<HashMap<String, mpsc::Sender<EventValue>>>,
    session_id: Mutex<Option<String>>,
}

impl MediaRpcClient {
    pub fn connect(url: String) -> Arc<Self> {
        let (socket, inbound_rx) = ResilientSocket::spawn(url);
        let client = Arc::new(Self {
            socket,
            pending: Mutex::new(HashMap::new()),
            events: Mutex::new(HashMap::new()),
            session_id: Mutex::new(None),
        });

        let reader = Arc::clone(&client);
        tokio::spawn(async move { reader.read_loop(inbound_rx).await });

        let watcher = Arc::clone(&client);
        let mut status_rx = watcher.socket.status();
        tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                if *status_rx.borrow() == SocketStatus::Disconnected {
                    watcher.fail_pending().await;
                }
            }
        });

        client
    }

    pub fn status(&self) -> watch::Receiver<SocketStatus> {
        self.socket.status()
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_connected()
    }

    pub fn close(&self) {
        self.socket.close();
    }

    async fn read_loop(self: Arc<Self>, mut inbound_rx: mpsc::Receiver<String>) {
        while let Some(text) = inbound_rx.recv().await {
            match serde_json::from_str::<IncomingFrame>(&text) {
                Ok(frame) => self.dispatch(frame).await,
                Err(e) => warn!(error = %e, "malformed media server frame"),
            }
        }
        self.fail_pending().await;
    }

    async fn dispatch(&self, frame: IncomingFrame) {
        let Some(queue_name) = frame.queue_name() else {
            debug!("frame carries neither a call id nor an event key, dropping");
            return;
        };

        if frame.is_event() {
            let Some(params) = frame.params else { return };
            let events = self.events.lock().await;
            if let Some(sender) = events.get(&queue_name) {
                let _ = sender.send(params.value).await;
            }
            return;
        }

        if let Some(session_id) = frame.result.as_ref().and_then(|r| r.session_id.clone()) {
            *self.session_id.lock().await = Some(session_id);
        }

        let sender = self.pending.lock().await.remove(&queue_name);
        let Some(sender) = sender else {
            warn!(id = %queue_name, "no listener for media server response");
            return;
        };

        let result = match frame.error {
            Some(e) => Err(CoordinatorError::MediaServerError { code: e.code, message: e.message, data: e.data }),
            None => frame
                .result
                .ok_or_else(|| CoordinatorError::Protocol("response carries neither result nor error".into())),
        };
        let _ = sender.send(result);
    }

    async fn fail_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(CoordinatorError::Disconnected));
        }
    }

    async fn call<P: Serialize>(&self, method: &'static str, params: P) -> Result<RpcResult, CoordinatorError> {
        if !self.socket.is_connected() {
            return Err(CoordinatorError::Disconnected);
        }

        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let request = Request::new(id.clone(), method, params);
        let text = match serde_json::to_string(&request) {
            Ok(text) => text,
            Err(e) => {
                self.pending.lock().await.remove(&id);
                return Err(e.into());
            }
        };

        if let Err(e) = self.socket.send(text) {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let mut status_rx = self.socket.status();
        tokio::select! {
            result = rx => result.unwrap_or(Err(CoordinatorError::Disconnected)),
            _ = async {
                if *status_rx.borrow() == SocketStatus::Disconnected {
                    return;
                }
                while status_rx.changed().await.is_ok() {
                    if *status_rx.borrow() == SocketStatus::Disconnected {
                        return;
                    }
                }
            } => {
                self.pending.lock().await.remove(&id);
                Err(CoordinatorError::Disconnected)
            }
        }
    }

    async fn session_id(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    /// Create a media pipeline (`parent: None`) or a media element scoped to
    /// one (`parent: Some(pipeline_id)`). Returns the new object's id.
    pub async fn create(&self, kind: MediaObjectKind, parent: Option<&str>) -> Result<String, CoordinatorError> {
        let session_id = self.session_id().await;
        let constructor_params = parent.map(|pipeline| ConstructorParams {
            media_pipeline: Some(pipeline.to_owned()),
            uri: None,
        });
        let result = self
            .call("create", CreateParams { kind, constructor_params, session_id })
            .await?;
        result
            .value
            .and_then(|v| v.as_str().map(str::to_owned))
            .ok_or_else(|| CoordinatorError::Protocol("create response missing value".into()))
    }

    /// Invoke an operation on an existing object. Returns the operation's
    /// result payload, if any (e.g. the SDP answer from `processOffer`).
    pub async fn invoke(
        &self,
        object: &str,
        operation: InvokeOperation,
        operation_params: Value,
    ) -> Result<Option<Value>, CoordinatorError> {
        let session_id = self.session_id().await;
        let result = self
            .call(
                "invoke",
                InvokeParams { object: object.to_owned(), operation, operation_params, session_id },
            )
            .await?;
        Ok(result.value)
    }

    /// Subscribe to a topic on an object. The returned stream unsubscribes
    /// itself, best-effort, when dropped.
    pub async fn subscribe(self: &Arc<Self>, object: &str, topic: SubscribeTopic) -> Result<EventStream, CoordinatorError> {
        let session_id = self.session_id().await;
        let result = self
            .call("subscribe", SubscribeParams { topic, object: object.to_owned(), session_id })
            .await?;
        let subscription_id = result
            .value
            .and_then(|v| v.as_str().map(str::to_owned))
            .ok_or_else(|| CoordinatorError::Protocol("subscribe response missing value".into()))?;

        let queue_name = format!("{object}/{}", topic.as_str());
        let (tx, rx) = mpsc::channel(64);
        self.events.lock().await.insert(queue_name.clone(), tx);

        Ok(EventStream {
            client: Arc::clone(self),
            queue_name,
            object: object.to_owned(),
            subscription_id,
            rx,
        })
    }

    /// Release an object and its resources. Logged and swallowed by
    /// callers that run this during best-effort teardown.
    pub async fn release(&self, object: &str) -> Result<(), CoordinatorError> {
        let session_id = self.session_id().await;
        self.call("release", ReleaseParams { object: object.to_owned(), session_id }).await?;
        Ok(())
    }

    async fn unsubscribe(&self, object: &str, subscription_id: &str) -> Result<(), CoordinatorError> {
        let session_id = self.session_id().await;
        self.call(
            "unsubscribe",
            UnsubscribeParams {
                subscription: subscription_id.to_owned(),
                object: object.to_owned(),
                session_id,
            },
        )
        .await?;
        Ok(())
    }
}

/// A live subscription. Dropping it unsubscribes on the media server.
pub struct EventStream {
    client: Arc<MediaRpcClient>,
    queue_name: String,
    object: String,
    subscription_id: String,
    rx: mpsc::Receiver<EventValue>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<EventValue> {
        self.rx.recv().await
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        let client = Arc::clone(&self.client);
        let queue_name = self.queue_name.clone();
        let object = self.object.clone();
        let subscription_id = self.subscription_id.clone();
        tokio::spawn(async move {
            client.events.lock().await.remove(&queue_name);
            if let Err(e) = client.unsubscribe(&object, &subscription_id).await {
                warn!(object = %object, error = %e, "unsubscribe on drop failed");
            }
        });
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
