use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use waypoint_core::time::{format_timestamp, parse_timestamp};
use waypoint_core::{Event, SessionId};

/// A bounded run of events. The current session is the only mutable one;
/// archived sessions are frozen snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Fresh, empty session with a new id.
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            events: Vec::new(),
            started_at: None,
            last_activity_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Time since the last appended event.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_activity_at.map(|at| now - at)
    }

    /// Time since the first appended event.
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.started_at.map(|at| now - at)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Current-session metadata record as persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: SessionId,
    pub started_at: Option<String>,
    pub last_activity_at: Option<String>,
}

impl SessionMetadata {
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            started_at: session.started_at.map(format_timestamp),
            last_activity_at: session.last_activity_at.map(format_timestamp),
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at.as_deref().and_then(parse_timestamp)
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_activity_at.as_deref().and_then(parse_timestamp)
    }
}
