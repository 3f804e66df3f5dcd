// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios driven against the real `signalhub` binary and a
//! mock media server, covering the room/publish/subscribe/leave lifecycle.

use std::time::Duration;

use serde_json::json;
use signalhub_specs::{connect_browser, recv_json, send_cmd, CoordinatorProcess, MockMediaServer};

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn two_users_publish_and_subscribe() -> anyhow::Result<()> {
    let media = MockMediaServer::spawn().await?;
    let coordinator = CoordinatorProcess::start(&media)?;
    coordinator.wait_healthy(TIMEOUT).await?;

    let mut alice = connect_browser(&coordinator).await?;
    send_cmd(&mut alice, json!({"cmd": "joinRoom", "room": "R", "user": "alice"})).await?;

    let mut bob = connect_browser(&coordinator).await?;
    send_cmd(&mut bob, json!({"cmd": "joinRoom", "room": "R", "user": "bob"})).await?;

    send_cmd(&mut alice, json!({"cmd": "receiveVideoFrom", "sender": "alice", "sdpOffer": "v=0 alice offer"})).await?;
    let answer = recv_json(&mut alice, TIMEOUT).await?;
    assert_eq!(answer["id"], "receiveVideoAnswer");
    assert_eq!(answer["name"], "alice");

    let bob_notice = recv_json(&mut bob, TIMEOUT).await?;
    assert_eq!(bob_notice["id"], "newParticipantArrived");
    assert_eq!(bob_notice["name"], "alice");

    let existing = recv_json(&mut alice, TIMEOUT).await?;
    assert_eq!(existing["id"], "existingParticipants");
    assert_eq!(existing["data"], json!([]));

    send_cmd(&mut bob, json!({"cmd": "receiveVideoFrom", "sender": "bob", "sdpOffer": "v=0 bob offer"})).await?;
    let bob_answer = recv_json(&mut bob, TIMEOUT).await?;
    assert_eq!(bob_answer["id"], "receiveVideoAnswer");
    assert_eq!(bob_answer["name"], "bob");

    let alice_notice = recv_json(&mut alice, TIMEOUT).await?;
    assert_eq!(alice_notice["id"], "newParticipantArrived");
    assert_eq!(alice_notice["name"], "bob");

    let bob_existing = recv_json(&mut bob, TIMEOUT).await?;
    assert_eq!(bob_existing["id"], "existingParticipants");
    assert_eq!(bob_existing["data"], json!(["alice"]));

    send_cmd(&mut alice, json!({"cmd": "receiveVideoFrom", "sender": "bob", "sdpOffer": "v=0 alice subscribes"})).await?;
    let subscribe_answer = recv_json(&mut alice, TIMEOUT).await?;
    assert_eq!(subscribe_answer["id"], "receiveVideoAnswer");
    assert_eq!(subscribe_answer["name"], "bob");

    let schema: serde_json::Value =
        reqwest::get(format!("{}/signaling/_schema", coordinator.base_url())).await?.json().await?;
    let room = &schema["R"];
    assert!(room["users"]["alice"].is_object());
    assert!(room["users"]["bob"].is_object());
    assert!(room["users"]["alice"]["out"]["bob"]["point"].is_string());
    assert_eq!(room["users"]["bob"]["out"], json!({}));

    Ok(())
}

#[tokio::test]
async fn duplicate_join_is_rejected() -> anyhow::Result<()> {
    let media = MockMediaServer::spawn().await?;
    let coordinator = CoordinatorProcess::start(&media)?;
    coordinator.wait_healthy(TIMEOUT).await?;

    let mut alice = connect_browser(&coordinator).await?;
    send_cmd(&mut alice, json!({"cmd": "joinRoom", "room": "R", "user": "alice"})).await?;

    let mut impostor = connect_browser(&coordinator).await?;
    send_cmd(&mut impostor, json!({"cmd": "joinRoom", "room": "R", "user": "alice"})).await?;
    let error = recv_json(&mut impostor, TIMEOUT).await?;
    assert_eq!(error["request"], "joinRoom");
    assert!(error["error"].as_str().unwrap_or_default().contains("alice"));

    Ok(())
}

#[tokio::test]
async fn ice_candidate_is_forwarded_to_the_owning_endpoint() -> anyhow::Result<()> {
    let media = MockMediaServer::spawn().await?;
    let coordinator = CoordinatorProcess::start(&media)?;
    coordinator.wait_healthy(TIMEOUT).await?;

    let mut alice = connect_browser(&coordinator).await?;
    send_cmd(&mut alice, json!({"cmd": "joinRoom", "room": "R", "user": "alice"})).await?;
    send_cmd(&mut alice, json!({"cmd": "receiveVideoFrom", "sender": "alice", "sdpOffer": "v=0 offer"})).await?;
    recv_json(&mut alice, TIMEOUT).await?; // receiveVideoAnswer
    recv_json(&mut alice, TIMEOUT).await?; // existingParticipants

    // No reply is expected for onIceCandidate; a subsequent command on the
    // same socket proves the handler didn't error the session out.
    send_cmd(&mut alice, json!({"cmd": "onIceCandidate", "sender": "alice", "candidate": {"candidate": "c", "sdpMid": "0", "sdpMLineIndex": 0}})).await?;
    send_cmd(&mut alice, json!({"cmd": "hangup", "sender": "nobody"})).await?;

    let schema: serde_json::Value =
        reqwest::get(format!("{}/signaling/_schema", coordinator.base_url())).await?.json().await?;
    assert!(schema["R"]["users"]["alice"].is_object());

    Ok(())
}

#[tokio::test]
async fn leave_notifies_the_remaining_peer_and_releases_the_empty_room() -> anyhow::Result<()> {
    let media = MockMediaServer::spawn().await?;
    let coordinator = CoordinatorProcess::start(&media)?;
    coordinator.wait_healthy(TIMEOUT).await?;

    let mut alice = connect_browser(&coordinator).await?;
    send_cmd(&mut alice, json!({"cmd": "joinRoom", "room": "R", "user": "alice"})).await?;
    send_cmd(&mut alice, json!({"cmd": "receiveVideoFrom", "sender": "alice", "sdpOffer": "v=0 offer"})).await?;
    recv_json(&mut alice, TIMEOUT).await?;
    recv_json(&mut alice, TIMEOUT).await?;

    let mut bob = connect_browser(&coordinator).await?;
    send_cmd(&mut bob, json!({"cmd": "joinRoom", "room": "R", "user": "bob"})).await?;

    drop(bob);
    let notice = recv_json(&mut alice, TIMEOUT).await?;
    assert_eq!(notice["id"], "participantLeaved");
    assert_eq!(notice["name"], "bob");

    let schema: serde_json::Value =
        reqwest::get(format!("{}/signaling/_schema", coordinator.base_url())).await?.json().await?;
    assert!(schema["R"]["users"]["bob"].is_null());

    drop(alice);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let schema: serde_json::Value =
        reqwest::get(format!("{}/signaling/_schema", coordinator.base_url())).await?.json().await?;
    assert!(schema.get("R").is_none());

    Ok(())
}

#[tokio::test]
async fn hangup_releases_the_connector_and_is_idempotent() -> anyhow::Result<()> {
    let media = MockMediaServer::spawn().await?;
    let coordinator = CoordinatorProcess::start(&media)?;
    coordinator.wait_healthy(TIMEOUT).await?;

    let mut alice = connect_browser(&coordinator).await?;
    send_cmd(&mut alice, json!({"cmd": "joinRoom", "room": "R", "user": "alice"})).await?;
    send_cmd(&mut alice, json!({"cmd": "receiveVideoFrom", "sender": "alice", "sdpOffer": "v=0 offer"})).await?;
    recv_json(&mut alice, TIMEOUT).await?;
    recv_json(&mut alice, TIMEOUT).await?;

    let mut bob = connect_browser(&coordinator).await?;
    send_cmd(&mut bob, json!({"cmd": "joinRoom", "room": "R", "user": "bob"})).await?;
    send_cmd(&mut bob, json!({"cmd": "receiveVideoFrom", "sender": "bob", "sdpOffer": "v=0 offer"})).await?;
    recv_json(&mut bob, TIMEOUT).await?;
    recv_json(&mut bob, TIMEOUT).await?;
    recv_json(&mut alice, TIMEOUT).await?; // newParticipantArrived for bob

    send_cmd(&mut alice, json!({"cmd": "receiveVideoFrom", "sender": "bob", "sdpOffer": "v=0 alice subscribes"})).await?;
    recv_json(&mut alice, TIMEOUT).await?;

    send_cmd(&mut alice, json!({"cmd": "hangup", "sender": "bob"})).await?;
    send_cmd(&mut alice, json!({"cmd": "hangup", "sender": "bob"})).await?;

    let schema: serde_json::Value =
        reqwest::get(format!("{}/signaling/_schema", coordinator.base_url())).await?.json().await?;
    assert_eq!(schema["R"]["users"]["alice"]["out"], json!({}));

    Ok(())
}

#[tokio::test]
async fn subscribing_to_an_unpublished_peer_returns_not_found() -> anyhow::Result<()> {
    let media = MockMediaServer::spawn().await?;
    let coordinator = CoordinatorProcess::start(&media)?;
    coordinator.wait_healthy(TIMEOUT).await?;

    let mut alice = connect_browser(&coordinator).await?;
    send_cmd(&mut alice, json!({"cmd": "joinRoom", "room": "R", "user": "alice"})).await?;
    send_cmd(&mut alice, json!({"cmd": "receiveVideoFrom", "sender": "ghost", "sdpOffer": "v=0 offer"})).await?;

    let error = recv_json(&mut alice, TIMEOUT).await?;
    assert_eq!(error["request"], "receiveVideoFrom");
    assert!(error["error"].as_str().unwrap_or_default().contains("ghost"));

    Ok(())
}

#[tokio::test]
async fn healthz_reports_unavailable_until_the_media_server_accepts() -> anyhow::Result<()> {
    // A port nothing listens on: the coordinator's single boot-time dial
    // fails, so it never becomes healthy.
    let media = MockMediaServer { addr: "127.0.0.1:1".parse()? };
    let binary = signalhub_specs::signalhub_binary();
    anyhow::ensure!(binary.exists(), "signalhub binary not found at {}", binary.display());
    let port = signalhub_specs::free_port()?;

    let mut child = std::process::Command::new(&binary)
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
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;

    let status = tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            if let Ok(Some(status)) = child.try_wait() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await?;

    assert!(!status.success());
    Ok(())
}
