// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

/// WebRTC room signaling coordinator.
#[derive(Debug, Parser)]
#[command(name = "signalhub", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "SIGNALHUB_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "SIGNALHUB_PORT")]
    pub port: u16,

    /// Path the browser-facing WebSocket is mounted at.
    #[arg(long, env = "SIGNALHUB_WS_PATH", default_value = "/signaling")]
    pub ws_path: String,

    /// WebSocket URL of the media server (e.g. ws://localhost:8888/kurento).
    #[arg(long, env = "SIGNALHUB_MEDIA_URL")]
    pub media_server_url: String,

    /// Use TLS in front of this service. TLS termination itself is an
    /// external concern; this process always serves plain HTTP/WS.
    #[arg(long, env = "SIGNALHUB_TLS", default_value = "false")]
    pub tls: bool,

    /// TLS certificate file (required when --tls is set).
    #[arg(long, env = "SIGNALHUB_TLS_CERT")]
    pub tls_cert: Option<String>,

    /// TLS key file (required when --tls is set).
    #[arg(long, env = "SIGNALHUB_TLS_KEY")]
    pub tls_key: Option<String>,

    /// Maximum inbound client-socket frame size, in bytes.
    #[arg(long, env = "SIGNALHUB_MAX_FRAME_BYTES", default_value = "8192")]
    pub max_frame_bytes: usize,

    /// Read deadline refreshed by pongs, in seconds.
    #[arg(long, env = "SIGNALHUB_PONG_DEADLINE_SECS", default_value = "40")]
    pub pong_deadline_secs: u64,

    /// Ping interval, in seconds (must stay below the pong deadline).
    #[arg(long, env = "SIGNALHUB_PING_INTERVAL_SECS", default_value = "36")]
    pub ping_interval_secs: u64,

    /// Write deadline for client-socket writes, in seconds.
    #[arg(long, env = "SIGNALHUB_WRITE_DEADLINE_SECS", default_value = "10")]
    pub write_deadline_secs: u64,

    /// Log format (json or text).
    #[arg(long, env = "SIGNALHUB_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SIGNALHUB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tls && (self.tls_cert.is_none() || self.tls_key.is_none()) {
            anyhow::bail!("--tls requires both --tls-cert and --tls-key");
        }

        if !self.media_server_url.starts_with("ws://")
            && !self.media_server_url.starts_with("wss://")
        {
            anyhow::bail!("--media-server-url must be a ws:// or wss:// URL");
        }

        if self.ping_interval_secs >= self.pong_deadline_secs {
            anyhow::bail!("--ping-interval-secs must be less than --pong-deadline-secs");
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
