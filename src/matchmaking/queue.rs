//! PvP wait queue
//!
//! Plain FIFO over sessions waiting for an opponent. The queue itself holds
//! no locks; `MatchmakingService` serializes access.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::game::room::Seat;
use crate::util::time::unix_millis;

/// One session waiting to be paired
#[derive(Debug, Clone)]
pub struct WaitingSession {
    pub seat: Seat,
    pub queued_at: u64,
}

/// FIFO queue of sessions waiting for a PvP opponent
#[derive(Default)]
pub struct PvpQueue {
    waiting: VecDeque<WaitingSession>,
}

impl PvpQueue {
    /// Append a session and return its 1-based queue position
    pub fn push(&mut self, seat: Seat) -> usize {
        self.waiting.push_back(WaitingSession {
            seat,
            queued_at: unix_millis(),
        });
        self.waiting.len()
    }

    /// Take the longest-waiting session
    pub fn pop(&mut self) -> Option<WaitingSession> {
        self.waiting.pop_front()
    }

    /// Put a popped session back at the head after a failed pairing
    pub fn requeue_front(&mut self, waiting: WaitingSession) {
        self.waiting.push_front(waiting);
    }

    /// Drop a session from the queue (disconnect or explicit leave)
    pub fn remove(&mut self, session_id: Uuid) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|w| w.seat.session_id != session_id);
        self.waiting.len() != before
    }

    pub fn contains(&self, session_id: Uuid) -> bool {
        self.waiting.iter().any(|w| w.seat.session_id == session_id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    fn seat() -> Seat {
        let (tx, _rx) = broadcast::channel(8);
        Seat {
            session_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            bot_name: "tester".into(),
            viewer: false,
            tx,
        }
    }

    #[test]
    fn queue_is_fifo() {
        let mut queue = PvpQueue::default();
        let a = seat();
        let b = seat();
        assert_eq!(queue.push(a.clone()), 1);
        assert_eq!(queue.push(b), 2);

        let first = queue.pop().unwrap();
        assert_eq!(first.seat.session_id, a.session_id);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_drops_only_the_named_session() {
        let mut queue = PvpQueue::default();
        let a = seat();
        let b = seat();
        queue.push(a.clone());
        queue.push(b.clone());

        assert!(queue.remove(a.session_id));
        assert!(!queue.remove(a.session_id));
        assert!(queue.contains(b.session_id));
        assert_eq!(queue.len(), 1);
    }
}
