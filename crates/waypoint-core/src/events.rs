use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::SessionId;
use crate::location::LocationKind;
use crate::time;

/// Recorded event type discriminator.
///
/// Serialized as its snake_case wire name. Names this build does not know
/// deserialize into [`EventType::Unknown`] so they survive a load/persist
/// cycle; the dispatcher drops them with a warning.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    LocationDetected,
    LocationSearched,
    ChatSent,
    ChatReceived,
    ChatLiked,
    ChatDisliked,
    ChatBookmarked,
    Unknown(String),
}

/// Routing family of an event type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventFamily {
    /// Sent to the chat endpoint.
    Chat,
    /// Sent to the orchestration endpoint.
    Location,
    /// Stored locally, never sent.
    RecordOnly,
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::LocationDetected => "location_detected",
            Self::LocationSearched => "location_searched",
            Self::ChatSent => "chat_sent",
            Self::ChatReceived => "chat_received",
            Self::ChatLiked => "chat_liked",
            Self::ChatDisliked => "chat_disliked",
            Self::ChatBookmarked => "chat_bookmarked",
            Self::Unknown(name) => name,
        }
    }

    pub fn family(&self) -> EventFamily {
        match self {
            Self::ChatSent | Self::ChatLiked | Self::ChatDisliked | Self::ChatBookmarked => {
                EventFamily::Chat
            }
            Self::LocationDetected | Self::LocationSearched => EventFamily::Location,
            Self::ChatReceived => EventFamily::RecordOnly,
            Self::Unknown(_) => EventFamily::Unknown,
        }
    }

    /// Location kind for location-family events.
    pub fn location_kind(&self) -> Option<LocationKind> {
        match self {
            Self::LocationDetected => Some(LocationKind::Device),
            Self::LocationSearched => Some(LocationKind::Search),
            _ => None,
        }
    }

    pub fn is_location(&self) -> bool {
        self.location_kind().is_some()
    }

    /// Chat reactions whose response stream is drained, not surfaced.
    pub fn is_chat_reaction(&self) -> bool {
        matches!(self, Self::ChatLiked | Self::ChatDisliked | Self::ChatBookmarked)
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "location_detected" => Self::LocationDetected,
            "location_searched" => Self::LocationSearched,
            "chat_sent" => Self::ChatSent,
            "chat_received" => Self::ChatReceived,
            "chat_liked" => Self::ChatLiked,
            "chat_disliked" => Self::ChatDisliked,
            "chat_bookmarked" => Self::ChatBookmarked,
            _ => Self::Unknown(name),
        }
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        match t {
            EventType::Unknown(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded user or system action. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// ISO 8601 UTC timestamp; the ordering key.
    pub utc_timestamp: String,
    /// Local time zone of the device when the event was created.
    pub timezone: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Arbitrary payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Assigned by the event store on append when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl Event {
    /// New event stamped with the current time and local time zone.
    pub fn new(event_type: EventType, data: Map<String, Value>) -> Self {
        Self {
            utc_timestamp: time::now_timestamp(),
            timezone: time::local_timezone(),
            event_type,
            data,
            session_id: None,
        }
    }

    /// New event with an explicit timestamp (replay, tests).
    pub fn at(utc_timestamp: impl Into<String>, event_type: EventType, data: Map<String, Value>) -> Self {
        Self {
            utc_timestamp: utc_timestamp.into(),
            timezone: "UTC".to_string(),
            event_type,
            data,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Parsed `utc_timestamp`, if well formed.
    pub fn timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        time::parse_timestamp(&self.utc_timestamp)
    }
}
