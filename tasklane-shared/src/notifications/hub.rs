//! In-process fan-out of live events to WebSocket subscribers
//!
//! Each room is a `broadcast` channel created on first subscribe. Rooms are
//! dropped once their last receiver is gone and [`NotificationHub::release`]
//! is called. Publishing to a room nobody listens to is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::models::notification::Notification;

/// Messages buffered per room before slow receivers start lagging
const ROOM_CAPACITY: usize = 256;

pub fn user_room(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

pub fn organization_room(organization_id: Uuid) -> String {
    format!("org:{}", organization_id)
}

/// Frames sent to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubMessage {
    Notification { data: Notification },
    Event { event: String, data: serde_json::Value },
    Pong,
}

impl HubMessage {
    pub fn to_json(&self) -> String {
        // Serialization of these variants cannot fail; fall back to an empty object anyway
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Clone, Default)]
pub struct NotificationHub {
    rooms: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, room: &str) -> broadcast::Receiver<String> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Sends a frame to a room and returns how many receivers got it
    pub async fn publish(&self, room: &str, message: &HubMessage) -> usize {
        let rooms = self.rooms.read().await;
        match rooms.get(room) {
            Some(tx) => tx.send(message.to_json()).unwrap_or(0),
            None => 0,
        }
    }

    /// Drops the room if it has no receivers left
    pub async fn release(&self, room: &str) {
        let mut rooms = self.rooms.write().await;
        if rooms.get(room).is_some_and(|tx| tx.receiver_count() == 0) {
            rooms.remove(room);
            tracing::debug!(room, "dropped empty room");
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn subscriber_count(&self, room: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}
