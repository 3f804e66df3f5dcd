// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level process runner: tracing setup, the boot-time media-server
//! dial, the HTTP server, and graceful shutdown. Shared by `main` and
//! integration tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::media::{MediaRpcClient, SocketStatus};
use crate::registry::Registry;
use crate::session::SessionLimits;
use crate::transport::{build_router, AppState};

/// How long to wait for the initial media-server dial before giving up.
/// The socket's own reconnect is unary (spec'd as caller-driven), so this
/// boot sequence is the only retry policy it gets.
const MEDIA_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    // Priority: --log-level / SIGNALHUB_LOG_LEVEL > RUST_LOG > default ("info").
    let filter = if std::env::var("SIGNALHUB_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Dial the media server, serve the signaling HTTP surface, and block
/// until a shutdown signal arrives.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);

    let media = MediaRpcClient::connect(config.media_server_url.clone());
    wait_for_media_server(&media, &config.media_server_url).await?;

    let registry = Arc::new(Registry::new());
    let limits = SessionLimits {
        max_frame_bytes: config.max_frame_bytes,
        pong_deadline: Duration::from_secs(config.pong_deadline_secs),
        ping_interval: Duration::from_secs(config.ping_interval_secs),
        write_deadline: Duration::from_secs(config.write_deadline_secs),
    };
    let state = Arc::new(AppState { registry, media, limits });
    let router = build_router(&config.ws_path, state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP listening on {}", listener.local_addr()?);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Fail fast at boot rather than serve traffic with no media server behind
/// it: the socket's reconnect never retries on its own, so if the first
/// dial doesn't land in time there's nothing left that will make it.
async fn wait_for_media_server(media: &MediaRpcClient, url: &str) -> anyhow::Result<()> {
    let mut status = media.status();
    tokio::time::timeout(MEDIA_CONNECT_TIMEOUT, status.wait_for(|s| *s == SocketStatus::Connected))
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for the media server at {url} to connect"))?
        .map_err(|_| anyhow::anyhow!("media server status channel closed while connecting"))?;
    info!(url, "media server connected");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM again, forcing exit");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT again, forcing exit");
            }
        }
        std::process::exit(130);
    });
}
