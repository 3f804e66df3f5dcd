// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire shapes for the JSON-RPC 2.0 dialect spoken by the media server.
//!
//! Requests and the `result`/`error`/`params` halves of responses are kept
//! as separate types because the same connection carries two unrelated
//! streams: call responses keyed by `id`, and `onEvent` notifications keyed
//! by `object`/`type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Media object types the server knows how to `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaObjectKind {
    MediaPipeline,
    WebRtcEndpoint,
    RtpEndpoint,
    HttpPostEndpoint,
    PlayerEndpoint,
    RecorderEndpoint,
    FaceOverlayFilter,
    ZBarFilter,
    GStreamerFilter,
    Composite,
    Dispatcher,
    DispatcherOneToMany,
}

impl MediaObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MediaPipeline => "MediaPipeline",
            Self::WebRtcEndpoint => "WebRtcEndpoint",
            Self::RtpEndpoint => "RtpEndpoint",
            Self::HttpPostEndpoint => "HttpPostEndpoint",
            Self::PlayerEndpoint => "PlayerEndpoint",
            Self::RecorderEndpoint => "RecorderEndpoint",
            Self::FaceOverlayFilter => "FaceOverlayFilter",
            Self::ZBarFilter => "ZBarFilter",
            Self::GStreamerFilter => "GStreamerFilter",
            Self::Composite => "Composite",
            Self::Dispatcher => "Dispatcher",
            Self::DispatcherOneToMany => "DispatcherOneToMany",
        }
    }
}

impl Serialize for MediaObjectKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Operations passed to `invoke`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeOperation {
    Connect,
    Play,
    Record,
    SetOverlayedImage,
    ProcessOffer,
    GatherCandidates,
    AddIceCandidate,
}

impl InvokeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Play => "play",
            Self::Record => "record",
            Self::SetOverlayedImage => "setOverlayedImage",
            Self::ProcessOffer => "processOffer",
            Self::GatherCandidates => "gatherCandidates",
            Self::AddIceCandidate => "addIceCandidate",
        }
    }
}

impl Serialize for InvokeOperation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Topics a session can `subscribe` to on a media object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeTopic {
    Error,
    EndOfStream,
    IceCandidateFound,
    OnIceCandidate,
    OnIceComponentStateChanged,
    OnIceGatheringDone,
    ConnectionStateChanged,
    MediaStateChanged,
    MediaSessionStarted,
    MediaSessionTerminated,
    ElementConnected,
    ElementDisconnected,
    ObjectCreated,
    ObjectDestroyed,
    CodeFound,
}

impl SubscribeTopic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::EndOfStream => "EndOfStream",
            Self::IceCandidateFound => "IceCandidateFound",
            Self::OnIceCandidate => "OnIceCandidate",
            Self::OnIceComponentStateChanged => "OnIceComponentStateChanged",
            Self::OnIceGatheringDone => "OnIceGatheringDone",
            Self::ConnectionStateChanged => "ConnectionStateChanged",
            Self::MediaStateChanged => "MediaStateChanged",
            Self::MediaSessionStarted => "MediaSessionStarted",
            Self::MediaSessionTerminated => "MediaSessionTerminated",
            Self::ElementConnected => "ElementConnected",
            Self::ElementDisconnected => "ElementDisconnected",
            Self::ObjectCreated => "ObjectCreated",
            Self::ObjectDestroyed => "ObjectDestroyed",
            Self::CodeFound => "CodeFound",
        }
    }
}

impl Serialize for SubscribeTopic {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// An outgoing JSON-RPC 2.0 call.
#[derive(Debug, Serialize)]
pub struct Request<P> {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: &'static str,
    pub params: P,
}

impl<P> Request<P> {
    pub fn new(id: impl Into<String>, method: &'static str, params: P) -> Self {
        Self { jsonrpc: "2.0", id: id.into(), method, params }
    }
}

#[derive(Debug, Serialize)]
pub struct ConstructorParams {
    #[serde(rename = "mediaPipeline", skip_serializing_if = "Option::is_none")]
    pub media_pipeline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateParams {
    #[serde(rename = "type")]
    pub kind: MediaObjectKind,
    #[serde(rename = "constructorParams", skip_serializing_if = "Option::is_none")]
    pub constructor_params: Option<ConstructorParams>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvokeParams {
    pub object: String,
    pub operation: InvokeOperation,
    #[serde(rename = "operationParams")]
    pub operation_params: Value,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeParams {
    #[serde(rename = "type")]
    pub topic: SubscribeTopic,
    pub object: String,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeParams {
    pub subscription: String,
    pub object: String,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseParams {
    pub object: String,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Successful `result` half of a response. `value` is the object id for
/// `create`, the subscription id for `subscribe`, or an operation-defined
/// payload (e.g. an SDP answer string) for `invoke`.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResult {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    pub value: Option<Value>,
}

/// The `error` half of a response, mapped straight onto
/// [`crate::error::CoordinatorError::MediaServerError`].
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

/// The `params.value` object of an `onEvent` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct EventValue {
    pub data: Value,
    pub object: String,
    #[serde(rename = "type")]
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventParams {
    pub value: EventValue,
}

/// One line read off the socket, before it's known whether it's a call
/// response or an event notification.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingFrame {
    pub id: Option<String>,
    pub method: Option<String>,
    pub result: Option<RpcResult>,
    pub error: Option<RpcError>,
    pub params: Option<EventParams>,
}

impl IncomingFrame {
    pub fn is_event(&self) -> bool {
        self.method.as_deref() == Some("onEvent")
    }

    /// The key this frame should be routed by: the call id for responses,
    /// or `<object>/<topic>` for events.
    pub fn queue_name(&self) -> Option<String> {
        if self.is_event() {
            self.params
                .as_ref()
                .map(|p| format!("{}/{}", p.value.object, p.value.topic))
        } else {
            self.id.clone()
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
