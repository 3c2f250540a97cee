//! Process-wide registry of rooms: creation, lookup, and reclamation.
//!
//! The registry also owns the disconnect grace windows. Each is an explicit
//! scheduled task keyed by (room code, session code): a repeat disconnect
//! replaces the pending task, a reconnect cancels it, and a late firing is
//! idempotent.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::room::state::{DropOutcome, Room};
use crate::util::id::new_room_code;

pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    pending_drops: DashMap<(String, String), JoinHandle<()>>,
    grace: Duration,
}

impl RoomRegistry {
    pub fn new(grace: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            pending_drops: DashMap::new(),
            grace,
        }
    }

    /// Create an empty room under a fresh code, retrying on collision.
    pub fn create_room(&self) -> (String, Arc<Room>) {
        loop {
            let code = new_room_code();
            match self.rooms.entry(code.clone()) {
                Entry::Occupied(_) => {
                    debug!(room = %code, "room code collision, retrying");
                }
                Entry::Vacant(slot) => {
                    let room = Arc::new(Room::new(code.clone()));
                    slot.insert(Arc::clone(&room));
                    info!(room = %code, "room created");
                    return (code, room);
                }
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<Arc<Room>> {
        self.rooms.get(code).map(|room| Arc::clone(&room))
    }

    pub fn destroy(&self, code: &str) {
        if self.rooms.remove(code).is_some() {
            info!(room = %code, "room destroyed");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Start the grace window for a disconnected player. Any window already
    /// pending for the same seat is replaced.
    pub fn schedule_disconnect_drop(registry: &Arc<Self>, room_code: &str, session_code: &str) {
        let key = (room_code.to_string(), session_code.to_string());
        let task_registry = Arc::clone(registry);
        let (room, session) = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(task_registry.grace).await;
            task_registry.expire_disconnect(&room, &session);
        });
        if let Some(stale) = registry.pending_drops.insert(key, handle) {
            stale.abort();
        }
    }

    /// Cancel a pending drop after a reconnect. A no-op if none is pending.
    pub fn cancel_disconnect_drop(&self, room_code: &str, session_code: &str) {
        let key = (room_code.to_string(), session_code.to_string());
        if let Some((_, handle)) = self.pending_drops.remove(&key) {
            handle.abort();
            debug!(room = room_code, session = session_code, "disconnect drop cancelled");
        }
    }

    /// Expiry half of the grace window. Safe to call at any time: players
    /// who reconnected (or were already removed) are left alone.
    pub fn expire_disconnect(&self, room_code: &str, session_code: &str) {
        self.pending_drops
            .remove(&(room_code.to_string(), session_code.to_string()));
        let Some(room) = self.get(room_code) else {
            return;
        };
        match room.drop_if_still_disconnected(session_code) {
            DropOutcome::Dropped { room_empty } => {
                info!(room = room_code, session = session_code, "disconnected player dropped");
                if room_empty {
                    self.destroy(room_code);
                }
            }
            DropOutcome::Kept => {}
        }
    }

    /// Reclaim rooms that nobody occupies and nobody ever joined.
    pub fn sweep_idle(&self, max_age: Duration) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, room| !room.sweepable(max_age));
        before - self.rooms.len()
    }

    /// Abort all pending grace windows. Part of service stop.
    pub fn shutdown(&self) {
        for entry in self.pending_drops.iter() {
            entry.value().abort();
        }
        self.pending_drops.clear();
    }
}
