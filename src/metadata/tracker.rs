//! Per-item refresh progress.
//!
//! An item is refreshing exactly while it has an entry here. The map is a
//! [`DashMap`], so status readers never wait on the drain task for longer
//! than a single shard operation.

use std::sync::Arc;

use curator_common::{BaseItem, Error, ItemId, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::events::{EventBus, RefreshEvent};

/// Progress of one running refresh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveRefreshEntry {
    pub item_id: ItemId,
    /// Percent complete, 0.0 to 100.0.
    pub progress: f64,
}

pub struct ActiveRefreshTracker {
    active: DashMap<ItemId, f64>,
    events: Arc<EventBus>,
}

impl ActiveRefreshTracker {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            active: DashMap::new(),
            events,
        }
    }

    /// Mark `item` as refreshing with zero progress.
    pub fn on_refresh_start(&self, item: &BaseItem) {
        tracing::debug!(item_id = %item.id, item = %item.name, "Refresh started");
        self.active.insert(item.id, 0.0);
        self.events.broadcast(RefreshEvent::RefreshStarted {
            item_id: item.id,
            name: item.name.clone(),
        });
    }

    /// Record progress for a running refresh. Values are clamped to `0..=100`
    /// and non-finite values are stored as 0.
    ///
    /// Fails with [`Error::RefreshNotRunning`] if `item` was never started.
    pub fn on_refresh_progress(&self, item: &BaseItem, progress: f64) -> Result<()> {
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 100.0)
        } else {
            0.0
        };
        match self.active.get_mut(&item.id) {
            Some(mut entry) => *entry = progress,
            None => {
                return Err(Error::RefreshNotRunning {
                    item_id: item.id,
                    name: item.name.clone(),
                })
            }
        }

        self.events.broadcast(RefreshEvent::RefreshProgress {
            item_id: item.id,
            progress,
        });
        Ok(())
    }

    /// Forget `item`'s refresh. Harmless if it was not running.
    pub fn on_refresh_complete(&self, item: &BaseItem) {
        tracing::debug!(item_id = %item.id, item = %item.name, "Refresh completed");
        self.active.remove(&item.id);
        self.events
            .broadcast(RefreshEvent::RefreshCompleted { item_id: item.id });
    }

    /// Progress of `item_id`, or `None` if it is not refreshing.
    pub fn progress(&self, item_id: ItemId) -> Option<f64> {
        self.active.get(&item_id).map(|p| *p)
    }

    pub fn is_refreshing(&self, item_id: ItemId) -> bool {
        self.active.contains_key(&item_id)
    }

    /// Every running refresh.
    pub fn active(&self) -> Vec<ActiveRefreshEntry> {
        self.active
            .iter()
            .map(|entry| ActiveRefreshEntry {
                item_id: *entry.key(),
                progress: *entry.value(),
            })
            .collect()
    }
}
