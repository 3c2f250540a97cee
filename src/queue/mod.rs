//! Matchmaking queue: a capacity-bounded FIFO of players waiting for a
//! random opponent.
//!
//! The queue is a single shared structure; every operation takes the one
//! lock, so enqueue, leave, and pairing never interleave. Position
//! notifications go out to every remaining entry after each change.

use std::collections::VecDeque;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::proto::ServerMessage;

/// One waiting player. `conn` identifies the caller's connection; session
/// codes are only minted at pairing time.
#[derive(Debug)]
pub struct QueueEntry {
    pub conn: Uuid,
    pub name: String,
    pub tx: UnboundedSender<ServerMessage>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("matchmaking queue is at capacity")]
    Full,
    #[error("caller already has a queue entry")]
    AlreadyQueued,
}

#[derive(Debug)]
pub enum EnqueueOutcome {
    Queued { position: usize },
    /// The two oldest entries, in arrival order: the first becomes X.
    Paired(QueueEntry, QueueEntry),
}

pub struct MatchmakingQueue {
    capacity: usize,
    entries: Mutex<VecDeque<QueueEntry>>,
}

impl MatchmakingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Add a waiting player, pairing the two oldest entries as soon as the
    /// queue holds two.
    pub fn enqueue(
        &self,
        conn: Uuid,
        name: &str,
        tx: &UnboundedSender<ServerMessage>,
    ) -> Result<EnqueueOutcome, QueueError> {
        let mut entries = self.entries.lock();
        if entries.iter().any(|entry| entry.conn == conn) {
            return Err(QueueError::AlreadyQueued);
        }
        if entries.len() >= self.capacity {
            return Err(QueueError::Full);
        }

        entries.push_back(QueueEntry {
            conn,
            name: name.to_string(),
            tx: tx.clone(),
        });
        let position = entries.len();
        let _ = tx.send(ServerMessage::JoinedQueue { position });

        if entries.len() >= 2 {
            if let (Some(first), Some(second)) = (entries.pop_front(), entries.pop_front()) {
                Self::notify_positions(&entries);
                return Ok(EnqueueOutcome::Paired(first, second));
            }
        }
        Self::notify_positions(&entries);
        Ok(EnqueueOutcome::Queued { position })
    }

    /// Remove the caller's entry if present. Returns whether anything was
    /// removed; remaining entries are renumbered.
    pub fn leave(&self, conn: Uuid) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.conn != conn);
        let removed = entries.len() != before;
        if removed {
            Self::notify_positions(&entries);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify_positions(entries: &VecDeque<QueueEntry>) {
        for (idx, entry) in entries.iter().enumerate() {
            let _ = entry.tx.send(ServerMessage::QueueUpdate { position: idx + 1 });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::ServerMessage as Sm;
    use crate::room::registry::RoomRegistry;
    use crate::util::id::new_session_code;
    use std::time::Duration;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn single_entry_waits_at_position_one() {
        let queue = MatchmakingQueue::new(100);
        let (tx, mut rx) = unbounded_channel();
        let outcome = queue.enqueue(Uuid::new_v4(), "Ada", &tx).unwrap();

        assert!(matches!(outcome, EnqueueOutcome::Queued { position: 1 }));
        assert_eq!(queue.len(), 1);
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, Sm::JoinedQueue { position: 1 })));
    }

    #[test]
    fn second_entry_pairs_in_arrival_order() {
        let queue = MatchmakingQueue::new(100);
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        let (tx_a, _rx_a) = unbounded_channel();
        let (tx_b, _rx_b) = unbounded_channel();

        queue.enqueue(conn_a, "Ada", &tx_a).unwrap();
        let outcome = queue.enqueue(conn_b, "Bix", &tx_b).unwrap();

        match outcome {
            EnqueueOutcome::Paired(first, second) => {
                assert_eq!(first.conn, conn_a);
                assert_eq!(second.conn, conn_b);
            }
            EnqueueOutcome::Queued { .. } => panic!("expected a pairing"),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn duplicate_connection_is_rejected() {
        let queue = MatchmakingQueue::new(100);
        let conn = Uuid::new_v4();
        let (tx, _rx) = unbounded_channel();
        queue.enqueue(conn, "Ada", &tx).unwrap();
        assert_eq!(
            queue.enqueue(conn, "Ada", &tx).unwrap_err(),
            QueueError::AlreadyQueued
        );
    }

    #[test]
    fn full_queue_rejects_newcomers() {
        let queue = MatchmakingQueue::new(1);
        let (tx, _rx) = unbounded_channel();
        queue.enqueue(Uuid::new_v4(), "Ada", &tx).unwrap();
        assert_eq!(
            queue.enqueue(Uuid::new_v4(), "Bix", &tx).unwrap_err(),
            QueueError::Full
        );
    }

    #[test]
    fn leaving_renumbers_the_remaining_entries() {
        // Capacity 1 keeps entries from pairing so ordering is observable.
        let queue = MatchmakingQueue::new(1);
        let conn_a = Uuid::new_v4();
        let (tx_a, _rx_a) = unbounded_channel();
        queue.enqueue(conn_a, "Ada", &tx_a).unwrap();

        assert!(queue.leave(conn_a));
        assert!(!queue.leave(conn_a));
        assert!(queue.is_empty());

        let (tx_b, mut rx_b) = unbounded_channel();
        queue.enqueue(Uuid::new_v4(), "Bix", &tx_b).unwrap();
        assert!(drain(&mut rx_b)
            .iter()
            .any(|m| matches!(m, Sm::QueueUpdate { position: 1 })));
    }

    /// Pairing two queue entries seats them as players 1 and 2 of a fresh
    /// room, earlier arrival first (and therefore X with the opening turn).
    #[test]
    fn paired_entries_seat_a_room_in_fifo_order() {
        let queue = MatchmakingQueue::new(100);
        let registry = RoomRegistry::new(Duration::from_secs(60));
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, _rx_b) = unbounded_channel();

        queue.enqueue(Uuid::new_v4(), "Ada", &tx_a).unwrap();
        let outcome = queue.enqueue(Uuid::new_v4(), "Bix", &tx_b).unwrap();
        let EnqueueOutcome::Paired(first, second) = outcome else {
            panic!("expected a pairing");
        };

        let (_code, room) = registry.create_room();
        for entry in [&first, &second] {
            let session_code = new_session_code();
            room.seat_matched_player(entry.conn, &entry.tx, &entry.name, &session_code);
        }
        room.begin_matched_game();

        let snap = room.snapshot();
        assert_eq!(snap.players[0].name, "Ada");
        assert_eq!(snap.players[1].name, "Bix");
        assert_eq!(snap.status, crate::proto::RoomStatus::Playing);
        assert_eq!(
            snap.turn.as_deref(),
            Some(snap.players[0].session_code.as_str())
        );
        assert!(drain(&mut rx_a)
            .iter()
            .any(|m| matches!(m, Sm::GameStart(_))));
    }
}
