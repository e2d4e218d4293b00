//! Per-session rooms: every socket connected with the same session id
//! receives that session's events.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use super::protocol::ServerEvent;

struct Member {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
pub struct ChatRooms {
    rooms: DashMap<String, Vec<Member>>,
    next_id: AtomicU64,
}

impl ChatRooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a room; the receiver yields serialized events for this connection
    pub fn join(&self, room: &str) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.rooms
            .entry(room.to_string())
            .or_default()
            .push(Member { id, tx });
        (id, rx)
    }

    pub fn leave(&self, room: &str, member_id: u64) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.retain(|m| m.id != member_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    /// Send an event to every member; returns how many received it
    pub fn broadcast(&self, room: &str, event: &ServerEvent) -> usize {
        let Some(mut members) = self.rooms.get_mut(room) else {
            return 0;
        };

        let payload = event.to_json();
        members.retain(|m| m.tx.send(payload.clone()).is_ok());
        members.len()
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }
}
