// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-session state machine driving one browser client through
//! join → publish → subscribe-to-peers → ICE exchange → leave (spec §4.E).
//!
//! Command handlers execute sequentially — `handle` takes `&mut self` and is
//! only ever awaited to completion by the caller before the next command is
//! read off the socket, matching spec §5's "command loop does not dispatch
//! the next command until the current handler returns".

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::error::CoordinatorError;
use crate::media::{EventStream, MediaObjectKind, MediaRpcClient, SubscribeTopic};
use crate::media::protocol::InvokeOperation;
use crate::registry::{Connector, MediaObject, Registry, Room};
use crate::session::protocol::{ClientMessage, ServerMessage};
use crate::session::ws::SessionWriter;

enum SessionState {
    Unjoined,
    Joined { room: String, user: String },
    Gone,
}

pub struct Orchestrator {
    registry: Arc<Registry>,
    media: Arc<MediaRpcClient>,
    writer: SessionWriter,
    state: SessionState,
}

impl Orchestrator {
    pub fn new(registry: Arc<Registry>, media: Arc<MediaRpcClient>, writer: SessionWriter) -> Self {
        Self { registry, media, writer, state: SessionState::Unjoined }
    }

    pub async fn handle(&mut self, msg: ClientMessage) -> Result<(), CoordinatorError> {
        match msg {
            ClientMessage::JoinRoom { room, user } => self.join(room, user).await,
            ClientMessage::ReceiveVideoFrom { sender, sdp_offer } => {
                self.receive_video_from(sender, sdp_offer).await
            }
            ClientMessage::OnIceCandidate { sender, candidate } => {
                self.on_ice_candidate(sender, candidate).await
            }
            ClientMessage::Hangup { sender } => self.hangup(sender).await,
            ClientMessage::Leave {} => self.leave().await,
        }
    }

    fn joined(&self) -> Result<(&str, &str), CoordinatorError> {
        match &self.state {
            SessionState::Joined { room, user } => Ok((room.as_str(), user.as_str())),
            SessionState::Unjoined => Err(CoordinatorError::Protocol("not joined to a room".into())),
            SessionState::Gone => Err(CoordinatorError::Protocol("session already left".into())),
        }
    }

    /// **join(room, user)** — spec §4.E. Creates the room's pipeline on first
    /// insertion; rejects a duplicate user name in an existing room. Sends
    /// no reply; existence is announced later, at publish time.
    async fn join(&mut self, room: String, user: String) -> Result<(), CoordinatorError> {
        if !matches!(self.state, SessionState::Unjoined) {
            return Err(CoordinatorError::Protocol("already joined".into()));
        }

        let room_handle = match self.registry.room(&room).await {
            Some(handle) => handle,
            None => {
                let pipeline_id = self.media.create(MediaObjectKind::MediaPipeline, None).await?;
                let (handle, created) =
                    self.registry.get_or_insert(&room, MediaObject::with_id(pipeline_id.clone())).await;
                if !created {
                    // Lost a race with another session creating the same room
                    // concurrently: this pipeline isn't the one that got kept
                    // in the registry, so release it rather than leak it.
                    if let Err(e) = self.media.release(&pipeline_id).await {
                        warn!(room = %room, error = %e, "release of redundant pipeline failed");
                    }
                }
                handle
            }
        };

        room_handle.insert(user.clone(), self.writer.clone()).await.map_err(|_| {
            CoordinatorError::Conflict { room: room.clone(), user: user.clone() }
        })?;

        self.state = SessionState::Joined { room, user };
        Ok(())
    }

    /// **receiveVideoFrom(sender, sdpOffer)** — spec §4.E. Dispatches on
    /// whether `sender` names this session's own user (self-publish) or a
    /// peer already in the room (subscribe-to-peer).
    async fn receive_video_from(&mut self, sender: String, sdp_offer: String) -> Result<(), CoordinatorError> {
        let (room, user) = self.joined()?;
        let (room, user) = (room.to_owned(), user.to_owned());
        let room_handle = self
            .registry
            .room(&room)
            .await
            .ok_or_else(|| CoordinatorError::NotFound(room.clone()))?;

        if sender == user {
            self.self_publish(&room_handle, &room, &user, sdp_offer).await
        } else {
            self.subscribe_to_peer(&room_handle, &user, &sender, sdp_offer).await
        }
    }

    /// Ordering discipline (spec §4.E, binding): create endpoint → subscribe
    /// to ICE events → processOffer → send answer → gatherCandidates →
    /// broadcast arrival and existing-participants reply.
    async fn self_publish(
        &mut self,
        room: &Room,
        room_name: &str,
        user: &str,
        sdp_offer: String,
    ) -> Result<(), CoordinatorError> {
        let pipeline_id = room
            .pipeline
            .id
            .clone()
            .ok_or_else(|| CoordinatorError::Protocol("room pipeline not yet created".into()))?;

        let endpoint_id = self.media.create(MediaObjectKind::WebRtcEndpoint, Some(&pipeline_id)).await?;

        let events = self.media.subscribe(&endpoint_id, SubscribeTopic::IceCandidateFound).await?;
        spawn_ice_forwarder(events, user.to_owned(), self.writer.clone());

        let answer = self
            .media
            .invoke(&endpoint_id, InvokeOperation::ProcessOffer, json!({ "offer": sdp_offer }))
            .await?
            .and_then(|v| as_sdp(v))
            .ok_or_else(|| CoordinatorError::Protocol("processOffer returned no answer".into()))?;

        self.writer
            .send(&ServerMessage::ReceiveVideoAnswer { name: user.to_owned(), sdp_answer: answer })
            .await?;

        self.media.invoke(&endpoint_id, InvokeOperation::GatherCandidates, json!({})).await?;

        // Only now, with negotiation fully complete, commit the endpoint as
        // this user's inbound — a failure above must not leave the user
        // marked "published" with a non-functional endpoint. Release
        // whatever was there before (a prior publish attempt), if any.
        let previous = room
            .with_user_mut(user, |u| std::mem::replace(&mut u.inbound, MediaObject::with_id(endpoint_id.clone())))
            .await
            .and_then(|m| m.id);
        if let Some(previous_id) = previous {
            if let Err(e) = self.media.release(&previous_id).await {
                warn!(room = room_name, user, error = %e, "release of superseded inbound endpoint failed");
            }
        }

        let peers = room.snapshot().await;
        for peer in peers.iter().filter(|p| p.name != user) {
            if let Some(peer_writer) = room.writer(&peer.name).await {
                if let Err(e) =
                    peer_writer.send(&ServerMessage::NewParticipantArrived { name: user.to_owned() }).await
                {
                    warn!(room = room_name, peer = %peer.name, error = %e, "failed to notify peer of new participant");
                }
            }
        }

        let existing = room.published_names().await.into_iter().filter(|n| n != user).collect();
        self.writer.send(&ServerMessage::ExistingParticipants { data: existing }).await?;

        Ok(())
    }

    async fn subscribe_to_peer(
        &mut self,
        room: &Room,
        user: &str,
        peer_name: &str,
        sdp_offer: String,
    ) -> Result<(), CoordinatorError> {
        let peer = room
            .get(peer_name)
            .await
            .filter(|p| p.inbound.is_created())
            .ok_or_else(|| CoordinatorError::NotFound(peer_name.to_owned()))?;
        let peer_inbound_id = peer.inbound.id.clone().ok_or_else(|| CoordinatorError::NotFound(peer_name.to_owned()))?;

        let pipeline_id = room
            .pipeline
            .id
            .clone()
            .ok_or_else(|| CoordinatorError::Protocol("room pipeline not yet created".into()))?;
        let endpoint_id = self.media.create(MediaObjectKind::WebRtcEndpoint, Some(&pipeline_id)).await?;

        self.media
            .invoke(&peer_inbound_id, InvokeOperation::Connect, json!({ "sink": endpoint_id }))
            .await?;

        let events = self.media.subscribe(&endpoint_id, SubscribeTopic::IceCandidateFound).await?;
        spawn_ice_forwarder(events, peer_name.to_owned(), self.writer.clone());

        let answer = self
            .media
            .invoke(&endpoint_id, InvokeOperation::ProcessOffer, json!({ "offer": sdp_offer }))
            .await?
            .and_then(as_sdp)
            .ok_or_else(|| CoordinatorError::Protocol("processOffer returned no answer".into()))?;

        self.writer
            .send(&ServerMessage::ReceiveVideoAnswer { name: peer_name.to_owned(), sdp_answer: answer })
            .await?;

        self.media.invoke(&endpoint_id, InvokeOperation::GatherCandidates, json!({})).await?;

        // Only now, with negotiation fully complete, record the Connector.
        // A failure above must not leave a half-wired subscription visible
        // to `onIceCandidate`/`hangup`. Release whatever connector this
        // replaces (a prior subscribe attempt to the same peer), if any.
        let previous = room
            .with_user_mut(user, |u| {
                u.outbound.insert(
                    peer_name.to_owned(),
                    Connector { point: MediaObject::with_id(endpoint_id.clone()), source: peer.inbound.clone() },
                )
            })
            .await
            .flatten();
        if let Some(previous_id) = previous.and_then(|c| c.point.id) {
            if let Err(e) = self.media.release(&previous_id).await {
                warn!(room = %room.name, user, peer = peer_name, error = %e, "release of superseded connector failed");
            }
        }

        Ok(())
    }

    /// **onIceCandidate(sender, candidate)** — spec §4.E.
    async fn on_ice_candidate(&mut self, sender: String, candidate: Value) -> Result<(), CoordinatorError> {
        let (room, user) = self.joined()?;
        let (room, user) = (room.to_owned(), user.to_owned());
        let room_handle =
            self.registry.room(&room).await.ok_or_else(|| CoordinatorError::NotFound(room.clone()))?;

        let target = if sender == user {
            room_handle.get(&user).await.and_then(|u| u.inbound.id)
        } else {
            room_handle.get(&user).await.and_then(|u| u.outbound.get(&sender).map(|c| c.point.id.clone())).flatten()
        };

        let Some(target) = target else {
            return Err(CoordinatorError::NotFound(sender));
        };

        self.media
            .invoke(&target, InvokeOperation::AddIceCandidate, json!({ "candidate": candidate }))
            .await?;
        Ok(())
    }

    /// **hangup(sender)** — spec §4.E. Idempotent when no Connector exists.
    async fn hangup(&mut self, sender: String) -> Result<(), CoordinatorError> {
        let (room, user) = self.joined()?;
        let (room, user) = (room.to_owned(), user.to_owned());
        let room_handle =
            self.registry.room(&room).await.ok_or_else(|| CoordinatorError::NotFound(room.clone()))?;

        let removed =
            room_handle.with_user_mut(&user, |u| u.outbound.remove(&sender)).await.flatten();

        if let Some(connector) = removed {
            if let Some(id) = connector.point.id {
                if let Err(e) = self.media.release(&id).await {
                    warn!(room = %room, user = %user, peer = %sender, error = %e, "release failed during hangup");
                }
            }
        }
        Ok(())
    }

    /// **leave / disconnect** — spec §4.E. Idempotent; safe to call more than
    /// once (the deferred teardown in `session::ws::serve` always calls this
    /// after the read loop ends, even if the client already sent `leave`).
    pub async fn leave(&mut self) -> Result<(), CoordinatorError> {
        let (room_name, user) = match std::mem::replace(&mut self.state, SessionState::Gone) {
            SessionState::Joined { room, user } => (room, user),
            _ => return Ok(()),
        };

        let Some(room) = self.registry.room(&room_name).await else { return Ok(()) };

        let departing = room.get(&user).await;
        room.remove(&user).await;

        if let Some(departing) = departing {
            if let Some(id) = departing.inbound.id {
                if let Err(e) = self.media.release(&id).await {
                    warn!(room = %room_name, user = %user, error = %e, "release of inbound endpoint failed");
                }
            }
            for (peer_name, connector) in departing.outbound {
                if let Some(id) = connector.point.id {
                    if let Err(e) = self.media.release(&id).await {
                        warn!(room = %room_name, user = %user, peer = %peer_name, error = %e, "release of outbound point failed");
                    }
                }
            }
        }

        for peer in room.snapshot().await {
            if let Some(connector) = room.with_user_mut(&peer.name, |u| u.outbound.remove(&user)).await.flatten() {
                if let Some(id) = connector.point.id {
                    if let Err(e) = self.media.release(&id).await {
                        warn!(room = %room_name, peer = %peer.name, error = %e, "release of peer's point to departing user failed");
                    }
                }
            }
            if let Some(peer_writer) = room.writer(&peer.name).await {
                if let Err(e) = peer_writer.send(&ServerMessage::ParticipantLeaved { name: user.clone() }).await {
                    warn!(room = %room_name, peer = %peer.name, error = %e, "failed to notify peer of departure");
                }
            }
        }

        if self.registry.remove_if_empty(&room_name).await {
            if let Some(id) = room.pipeline.id.clone() {
                if let Err(e) = self.media.release(&id).await {
                    warn!(room = %room_name, error = %e, "release of room pipeline failed");
                }
            }
        }

        Ok(())
    }
}

fn spawn_ice_forwarder(mut events: EventStream, name: String, writer: SessionWriter) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let msg = ServerMessage::IceCandidate { name: name.clone(), candidate: event.data };
            if writer.send(&msg).await.is_err() {
                break;
            }
        }
    });
}

fn as_sdp(value: Value) -> Option<String> {
    value.as_str().map(str::to_owned)
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
