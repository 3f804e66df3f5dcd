// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide room/user registry (spec §4.D).
//!
//! Protected by a reader/writer lock at the registry level and a second
//! lock inside each room for its user map, mirroring the two-level
//! room → user table spec §3 describes. The registry never performs media
//! calls itself: callers clone the `Arc<Room>` out from under the registry
//! lock, then call room methods (which hold only that room's lock) around
//! whatever suspending media-RPC work they need to do.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

/// An opaque handle to a node in the media pipeline (spec §3 `MediaObject`).
#[derive(Debug, Clone, Default)]
pub struct MediaObject {
    pub id: Option<String>,
}

impl MediaObject {
    pub fn new() -> Self {
        Self { id: None }
    }

    pub fn with_id(id: String) -> Self {
        Self { id: Some(id) }
    }

    pub fn is_created(&self) -> bool {
        self.id.is_some()
    }
}

/// An ordered pair recording that `source.connect(point)` has been issued on
/// the media server (spec §3 `Connector`).
#[derive(Debug, Clone)]
pub struct Connector {
    /// The per-peer receiving endpoint inside the pipeline, owned by this user.
    pub point: MediaObject,
    /// The peer's inbound endpoint; owned by the peer, never released here.
    pub source: MediaObject,
}

/// One participant's session state within a room.
#[derive(Debug, Clone, Default)]
pub struct User {
    pub name: String,
    /// This user's publishing endpoint, created lazily on self-publish.
    pub inbound: MediaObject,
    /// One entry per peer this user has subscribed to, keyed by peer name.
    pub outbound: HashMap<String, Connector>,
}

impl User {
    pub fn new(name: String) -> Self {
        Self { name, inbound: MediaObject::new(), outbound: HashMap::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("user already exists in room")]
    AlreadyPresent,
}

/// A room: its media pipeline and the users currently inside it.
pub struct Room {
    pub name: String,
    pub pipeline: MediaObject,
    users: RwLock<HashMap<String, User>>,
    /// Handles back to each user's client socket, kept separate from `User`
    /// so registry-only tests never need to construct a real socket.
    writers: RwLock<HashMap<String, crate::session::ws::SessionWriter>>,
}

impl Room {
    fn new(name: String, pipeline: MediaObject) -> Self {
        Self {
            name,
            pipeline,
            users: RwLock::new(HashMap::new()),
            writers: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new user, failing if one of that name already exists.
    pub async fn insert(&self, name: String, writer: crate::session::ws::SessionWriter) -> Result<(), RegistryError> {
        let mut users = self.users.write().await;
        if users.contains_key(&name) {
            return Err(RegistryError::AlreadyPresent);
        }
        users.insert(name.clone(), User::new(name.clone()));
        self.writers.write().await.insert(name, writer);
        Ok(())
    }

    /// Remove a user by name. Idempotent; returns whether the room is now empty.
    pub async fn remove(&self, name: &str) -> bool {
        let mut users = self.users.write().await;
        users.remove(name);
        self.writers.write().await.remove(name);
        users.is_empty()
    }

    pub async fn writer(&self, name: &str) -> Option<crate::session::ws::SessionWriter> {
        self.writers.read().await.get(name).cloned()
    }

    pub async fn get(&self, name: &str) -> Option<User> {
        self.users.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.users.read().await.contains_key(name)
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Mutate one user's entry in place.
    pub async fn with_user_mut<R>(&self, name: &str, f: impl FnOnce(&mut User) -> R) -> Option<R> {
        let mut users = self.users.write().await;
        users.get_mut(name).map(f)
    }

    /// Snapshot of every user currently in the room, for fan-out that must
    /// happen outside the room lock (e.g. notifying peers over their sockets).
    pub async fn snapshot(&self) -> Vec<User> {
        self.users.read().await.values().cloned().collect()
    }

    /// Names of users whose inbound endpoint has already been created.
    pub async fn published_names(&self) -> Vec<String> {
        self.users
            .read()
            .await
            .values()
            .filter(|u| u.inbound.is_created())
            .map(|u| u.name.clone())
            .collect()
    }
}

/// Process-wide mapping of room name → room.
#[derive(Default)]
pub struct Registry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { rooms: RwLock::new(HashMap::new()) }
    }

    /// Clone out the room handle, if one exists by that name.
    pub async fn room(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(name).cloned()
    }

    /// Get the existing room, or create one with the given pipeline handle
    /// and insert it. The pipeline `create` media-RPC call must already have
    /// happened by the time this is invoked (it must not hold this lock
    /// across a suspending call). Returns the room and whether it is new.
    pub async fn get_or_insert(&self, name: &str, pipeline: MediaObject) -> (Arc<Room>, bool) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(name) {
            return (Arc::clone(room), false);
        }
        let room = Arc::new(Room::new(name.to_owned(), pipeline));
        rooms.insert(name.to_owned(), Arc::clone(&room));
        (room, true)
    }

    /// Remove a room by name if it is empty. Idempotent.
    pub async fn remove_if_empty(&self, name: &str) -> bool {
        let room = { self.rooms.read().await.get(name).cloned() };
        let Some(room) = room else { return false };
        if !room.is_empty().await {
            return false;
        }
        let mut rooms = self.rooms.write().await;
        // Re-check under the write lock: another session may have joined
        // between the read above and acquiring this lock.
        if rooms.get(name).is_some_and(|r| Arc::ptr_eq(r, &room)) {
            if room.is_empty().await {
                rooms.remove(name);
                return true;
            }
        }
        false
    }

    /// Debug/introspection dump for the `_schema` route (spec §6).
    pub async fn schema(&self) -> RegistrySchema {
        let rooms = self.rooms.read().await;
        let mut out = HashMap::new();
        for (room_name, room) in rooms.iter() {
            let users = room.snapshot().await;
            let mut user_map = HashMap::new();
            for user in users {
                let out_map = user
                    .outbound
                    .iter()
                    .map(|(peer, c)| {
                        (
                            peer.clone(),
                            ConnectorSchema {
                                point: c.point.id.clone(),
                                source: c.source.id.clone(),
                            },
                        )
                    })
                    .collect();
                user_map
                    .insert(user.name.clone(), UserSchema { r#in: user.inbound.id.clone(), out: out_map });
            }
            out.insert(
                room_name.clone(),
                RoomSchema {
                    media_pipeline: PipelineSchema {
                        id: room.pipeline.id.clone(),
                        r#type: "MediaPipeline".to_owned(),
                    },
                    users: user_map,
                },
            );
        }
        RegistrySchema { rooms: out }
    }
}

#[derive(Debug, Serialize)]
pub struct RegistrySchema {
    #[serde(flatten)]
    pub rooms: HashMap<String, RoomSchema>,
}

#[derive(Debug, Serialize)]
pub struct RoomSchema {
    pub media_pipeline: PipelineSchema,
    pub users: HashMap<String, UserSchema>,
}

#[derive(Debug, Serialize)]
pub struct PipelineSchema {
    pub id: Option<String>,
    pub r#type: String,
}

#[derive(Debug, Serialize)]
pub struct UserSchema {
    pub r#in: Option<String>,
    pub out: HashMap<String, ConnectorSchema>,
}

#[derive(Debug, Serialize)]
pub struct ConnectorSchema {
    pub point: Option<String>,
    pub source: Option<String>,
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
