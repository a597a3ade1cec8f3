use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TransportError;

/// Logical backend endpoints events are routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Chat,
    Orchestration,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Orchestration => "orchestration",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One server-sent chunk. A stream ends at `Done` or when exhausted.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerChunk {
    Message { data: Value },
    Done,
}

impl ServerChunk {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Lazy, caller-driven sequence of server chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ServerChunk, TransportError>> + Send>>;

/// Outbound transport collaborator (HTTP/SSE lives behind this).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        endpoint: Endpoint,
        event_type: &str,
        payload: Value,
    ) -> Result<ChunkStream, TransportError>;
}
