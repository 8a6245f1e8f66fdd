//! Query event feed for dashboards and log consumers.
//!
//! Every completed query produces one [`QueryEvent`]. Events are kept in a
//! bounded history and fanned out to subscribers through bounded queues;
//! a subscriber that falls behind loses events instead of slowing the
//! proxy down.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::transport::Protocol;

/// Outcome of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Blocked,
    Cached,
    Allowed,
    Error,
}

impl Category {
    pub fn tag(self) -> &'static str {
        match self {
            Category::Blocked => "BLOCKED",
            Category::Cached => "CACHED",
            Category::Allowed => "ALLOW",
            Category::Error => "ERROR",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone)]
pub struct QueryEvent {
    pub category: Category,
    pub domain: Arc<str>,
    pub protocol: Protocol,
    pub at: DateTime<Local>,
    pub elapsed: Duration,
}

impl QueryEvent {
    pub fn new(
        category: Category,
        domain: impl Into<Arc<str>>,
        protocol: Protocol,
        elapsed: Duration,
    ) -> Self {
        Self {
            category,
            domain: domain.into(),
            protocol,
            at: Local::now(),
            elapsed,
        }
    }

    /// Log line as shown to consumers: `HH:MM:SS [TAG] domain`.
    pub fn line(&self) -> String {
        let time = self.at.format("%H:%M:%S");
        format!("{time} [{}] {}", self.category, self.domain)
    }
}

/// Fan-out of query events to subscribers with a bounded history.
pub struct EventLog {
    subscribers: Mutex<Vec<mpsc::Sender<QueryEvent>>>,
    recent: Mutex<VecDeque<QueryEvent>>,
    history: usize,
    capacity: usize,
}

impl EventLog {
    /// `history` events are kept for [`EventLog::recent`], each subscriber
    /// queue holds up to `capacity` undelivered events.
    pub fn new(history: usize, capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            recent: Mutex::new(VecDeque::with_capacity(history)),
            history,
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::Receiver<QueryEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Deliver an event without waiting. Full queues drop it, closed
    /// queues are removed.
    pub fn publish(&self, event: QueryEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            });
        }

        if self.history == 0 {
            return;
        }
        if let Ok(mut recent) = self.recent.lock() {
            if recent.len() == self.history {
                recent.pop_front();
            }
            recent.push_back(event);
        }
    }

    /// Most recent events, oldest first.
    pub fn recent(&self) -> Vec<QueryEvent> {
        self.recent
            .lock()
            .map(|recent| recent.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(100, 10)
    }
}
