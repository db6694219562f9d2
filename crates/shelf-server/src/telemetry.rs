//! Usage telemetry bus.
//!
//! Content views are published on a broadcast channel for live consumers
//! and mirrored into a bounded ring buffer for the recent-usage endpoint.
//! Recording never blocks delivery: a bus with no subscribers simply drops
//! the broadcast.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use shelf_core::{BitstreamId, UserId};

/// Maximum number of events kept for the recent-usage endpoint.
const MAX_RECENT_EVENTS: usize = 100;

/// What the client did with the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageAction {
    /// The content was retrieved in full (no range negotiation involved).
    View,
}

/// One recorded usage of a bitstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: UsageAction,
    pub bitstream: BitstreamId,
    /// Authenticated user, when known.
    pub user: Option<UserId>,
}

impl UsageEvent {
    pub fn view(bitstream: BitstreamId, user: Option<UserId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: UsageAction::View,
            bitstream,
            user,
        }
    }
}

/// Fan-out point for usage events.
pub struct UsageBus {
    sender: broadcast::Sender<UsageEvent>,
    recent: RwLock<VecDeque<UsageEvent>>,
}

impl UsageBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the live event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<UsageEvent> {
        self.sender.subscribe()
    }

    /// Record an event.
    ///
    /// A send error just means nobody is listening right now; the ring
    /// buffer still keeps the event.
    pub fn record(&self, event: UsageEvent) {
        tracing::debug!(
            bitstream = %event.bitstream,
            action = ?event.action,
            "usage event recorded"
        );

        {
            let mut recent = self.recent.write();
            if recent.len() == MAX_RECENT_EVENTS {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        let _ = self.sender.send(event);
    }

    /// The most recent events, newest first, at most `limit`.
    pub fn recent_events(&self, limit: usize) -> Vec<UsageEvent> {
        self.recent
            .read()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for UsageBus {
    fn default() -> Self {
        Self::new(256)
    }
}
