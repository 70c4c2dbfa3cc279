//! In-memory bounded log of room lifecycle events

use chrono::{DateTime, Utc};
use couchpad_protocol::Role;
use serde::Serialize;
use std::collections::VecDeque;

pub const EVENT_LOG_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Joined {
        role: Role,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
    },
    Left {
        role: Role,
    },
    Reaped,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomEvent {
    pub at: DateTime<Utc>,
    pub room: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Ring buffer; the oldest entry is evicted once full
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<RoomEvent>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, room: &str, kind: EventKind) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(RoomEvent {
            at: Utc::now(),
            room: room.to_string(),
            kind,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoomEvent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded() {
        let mut log = EventLog::with_capacity(3);
        for i in 0..5 {
            log.record(&format!("ROOM{}", i), EventKind::Created);
        }
        assert_eq!(log.len(), 3);
        let rooms: Vec<&str> = log.iter().map(|e| e.room.as_str()).collect();
        assert_eq!(rooms, vec!["ROOM2", "ROOM3", "ROOM4"]);
    }

    #[test]
    fn test_event_serialization() {
        let mut log = EventLog::default();
        log.record(
            "ABC234",
            EventKind::Joined {
                role: Role::Display,
                subtype: Some("tv".to_string()),
            },
        );
        let value = serde_json::to_value(log.iter().next().unwrap()).unwrap();
        assert_eq!(value["event"], "joined");
        assert_eq!(value["role"], "display");
        assert_eq!(value["subtype"], "tv");
        assert_eq!(value["room"], "ABC234");
    }
}
