//! Refresh event system.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late-joining listeners can catch up.

use chrono::{DateTime, Utc};
use curator_common::{ItemId, ItemUpdateFlag, RefreshPriority};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefreshEvent {
    RefreshQueued {
        item_id: ItemId,
        priority: RefreshPriority,
    },
    RefreshStarted {
        item_id: ItemId,
        name: String,
    },
    RefreshProgress {
        item_id: ItemId,
        progress: f64,
    },
    RefreshCompleted {
        item_id: ItemId,
    },
    ItemUpdated {
        item_id: ItemId,
        changes: Vec<ItemUpdateFlag>,
    },
}

impl RefreshEvent {
    /// The item the event concerns.
    pub fn item_id(&self) -> ItemId {
        match self {
            RefreshEvent::RefreshQueued { item_id, .. }
            | RefreshEvent::RefreshStarted { item_id, .. }
            | RefreshEvent::RefreshProgress { item_id, .. }
            | RefreshEvent::RefreshCompleted { item_id }
            | RefreshEvent::ItemUpdated { item_id, .. } => *item_id,
        }
    }
}

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: RefreshEvent,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: RefreshEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: RefreshEvent) {
        let event = Event::new(payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let item_id = ItemId::new();
        bus.broadcast(RefreshEvent::RefreshCompleted { item_id });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.payload, RefreshEvent::RefreshCompleted { item_id });
        assert_eq!(event.payload.item_id(), item_id);
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(256);
        let item_id = ItemId::new();

        for i in 0..150 {
            bus.broadcast(RefreshEvent::RefreshProgress {
                item_id,
                progress: i as f64,
            });
        }

        let recent = bus.recent_events(200);
        assert_eq!(recent.len(), MAX_RECENT_EVENTS);
        // Newest first.
        assert_eq!(
            recent[0].payload,
            RefreshEvent::RefreshProgress {
                item_id,
                progress: 149.0
            }
        );
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.broadcast(RefreshEvent::RefreshStarted {
            item_id: ItemId::new(),
            name: "Heat".into(),
        });
        assert_eq!(bus.recent_events(10).len(), 1);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::new(RefreshEvent::RefreshQueued {
            item_id: ItemId::new(),
            priority: RefreshPriority::High,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["type"], "refresh_queued");
        assert_eq!(json["payload"]["priority"], "high");
    }
}
