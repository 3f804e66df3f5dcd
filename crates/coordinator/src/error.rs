// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crate-wide error taxonomy shared by the media-RPC client, the registry,
//! and the orchestrator.

use serde::{Deserialize, Serialize};

/// Machine-readable error codes sent to the browser in the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Protocol,
    Conflict,
    NotFound,
    MediaServerError,
    Transport,
    Resource,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protocol => "PROTOCOL",
            Self::Conflict => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::MediaServerError => "MEDIA_SERVER_ERROR",
            Self::Transport => "TRANSPORT",
            Self::Resource => "RESOURCE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy from spec §7. Kinds, not exhaustive messages: most
/// variants carry enough context to build the client-facing error envelope.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Malformed client frame or unknown command. Session continues.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Duplicate user name within a room. Session continues.
    #[error("user {user} already exist in room {room}")]
    Conflict { room: String, user: String },

    /// Reference to an unknown peer or missing outbound entry. Session continues.
    #[error("no such peer: {0}")]
    NotFound(String),

    /// Non-null `error` in a JSON-RPC response from the media server.
    #[error("media server error {code}: {message}")]
    MediaServerError { code: i64, message: String, data: Option<String> },

    /// The media-RPC client's connection is gone; every in-flight call fails.
    #[error("media server disconnected")]
    Disconnected,

    /// Client-socket read/write failure. Treated as a disconnect upstream.
    #[error("transport error: {0}")]
    Transport(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// `release` failure during teardown. Logged by the caller, never surfaced.
    #[error("resource error: {0}")]
    Resource(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for CoordinatorError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl CoordinatorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Protocol(_) => ErrorCode::Protocol,
            Self::Conflict { .. } => ErrorCode::Conflict,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::MediaServerError { .. } => ErrorCode::MediaServerError,
            Self::Disconnected => ErrorCode::MediaServerError,
            Self::Transport(_) => ErrorCode::Transport,
            Self::Resource(_) => ErrorCode::Resource,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
