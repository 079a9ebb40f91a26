//! Hand-off buffer between the datagram reader and the simulation tick.
//!
//! The queue has its own lock so the reader never contends on the session
//! lock while queueing, and the tick never holds the session lock while
//! draining.

use shared::{Action, PlayerId};
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::Mutex;

/// A player's paddle command, stamped on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionEvent {
    pub player_id: PlayerId,
    pub action: Action,
    pub timestamp: Instant,
}

impl ActionEvent {
    pub fn new(player_id: PlayerId, action: Action) -> Self {
        Self {
            player_id,
            action,
            timestamp: Instant::now(),
        }
    }
}

/// FIFO across all senders, in insertion order.
#[derive(Debug, Default)]
pub struct ActionQueue {
    events: Mutex<VecDeque<ActionEvent>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, event: ActionEvent) {
        self.events.lock().await.push_back(event);
    }

    /// Takes every queued event, oldest first.
    pub async fn drain(&self) -> Vec<ActionEvent> {
        self.events.lock().await.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}
