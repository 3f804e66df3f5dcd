// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire shapes for the browser-facing command protocol (spec §4.E/§6).
//!
//! `candidate` and `sdpAnswer`-adjacent payloads are opaque JSON passed
//! through unchanged (spec §9), so `candidate` is kept as a raw `Value`
//! rather than parsed into a typed ICE-candidate struct.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One inbound frame from a browser client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd")]
pub enum ClientMessage {
    #[serde(rename = "joinRoom")]
    JoinRoom { room: String, user: String },

    #[serde(rename = "receiveVideoFrom")]
    ReceiveVideoFrom { sender: String, #[serde(rename = "sdpOffer")] sdp_offer: String },

    #[serde(rename = "onIceCandidate")]
    OnIceCandidate { sender: String, candidate: Value },

    #[serde(rename = "hangup")]
    Hangup { sender: String },

    #[serde(rename = "leave")]
    Leave {},
}

/// One outbound frame to a browser client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "id")]
pub enum ServerMessage {
    #[serde(rename = "existingParticipants")]
    ExistingParticipants { data: Vec<String> },

    #[serde(rename = "newParticipantArrived")]
    NewParticipantArrived { name: String },

    #[serde(rename = "participantLeaved")]
    ParticipantLeaved { name: String },

    #[serde(rename = "receiveVideoAnswer")]
    ReceiveVideoAnswer { name: String, #[serde(rename = "sdpAnswer")] sdp_answer: String },

    #[serde(rename = "iceCandidate")]
    IceCandidate { name: String, candidate: Value },
}

/// The error reply envelope (spec §4.E): `{request, error}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub request: String,
    pub error: String,
}

impl ClientMessage {
    /// The `cmd` name, for echoing back in error envelopes.
    pub fn cmd_name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "joinRoom",
            Self::ReceiveVideoFrom { .. } => "receiveVideoFrom",
            Self::OnIceCandidate { .. } => "onIceCandidate",
            Self::Hangup { .. } => "hangup",
            Self::Leave {} => "leave",
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
