//! Connection audit log
//!
//! Append-only record of client connects and disconnects, capped at a fixed
//! number of events (oldest dropped first).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionEventKind {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEvent {
    pub client_id: String,
    pub created: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: ConnectionEventKind,
}

pub struct AuditLog {
    capacity: usize,
    events: Mutex<VecDeque<ConnectionEvent>>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, client_id: &str, kind: ConnectionEventKind) {
        if self.capacity == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(ConnectionEvent {
            client_id: client_id.to_string(),
            created: Utc::now(),
            kind,
        });
    }

    /// Copy of the retained events, oldest first
    pub fn events(&self) -> Vec<ConnectionEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
