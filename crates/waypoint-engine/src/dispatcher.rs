//! Routes recorded events to their backend endpoint.

use std::fmt;
use std::sync::Arc;

use tokio_stream::StreamExt;
use tracing::instrument;
use waypoint_core::{ChunkStream, Endpoint, Event, EventFamily, EventType, Transport, TransportError};

/// What happened to a dispatched event.
pub enum DispatchOutcome {
    /// `chat_sent`: the caller consumes the response stream.
    Streaming(ChunkStream),
    /// Sent, and the response was read to the end and discarded.
    Drained { chunks: usize },
    /// Stored locally only.
    Recorded,
    /// Unknown event type.
    Dropped,
}

impl fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streaming(_) => f.write_str("Streaming(..)"),
            Self::Drained { chunks } => f.debug_struct("Drained").field("chunks", chunks).finish(),
            Self::Recorded => f.write_str("Recorded"),
            Self::Dropped => f.write_str("Dropped"),
        }
    }
}

pub struct EventDispatcher {
    transport: Arc<dyn Transport>,
}

impl EventDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Endpoint an event type goes to, if any.
    pub fn route(event_type: &EventType) -> Option<Endpoint> {
        match event_type.family() {
            EventFamily::Chat => Some(Endpoint::Chat),
            EventFamily::Location => Some(Endpoint::Orchestration),
            EventFamily::RecordOnly | EventFamily::Unknown => None,
        }
    }

    /// Send the event to its endpoint.
    ///
    /// Location events are always sent; deduplication happens before the
    /// event is created. Transport failures, including an error chunk while
    /// draining, are returned as-is.
    #[instrument(skip_all, fields(event_type = %event.event_type))]
    pub async fn dispatch(&self, event: &Event) -> Result<DispatchOutcome, TransportError> {
        let Some(endpoint) = Self::route(&event.event_type) else {
            return Ok(match event.event_type {
                EventType::Unknown(_) => {
                    tracing::warn!(event_type = %event.event_type, "unknown event type, dropping");
                    DispatchOutcome::Dropped
                }
                _ => DispatchOutcome::Recorded,
            });
        };

        let payload = serde_json::to_value(event)
            .map_err(|e| TransportError::InvalidRequest(format!("unserializable event: {e}")))?;
        let stream = self
            .transport
            .send(endpoint, event.event_type.as_str(), payload)
            .await
            .inspect_err(|e| log_transport_failure(endpoint, "send", e))?;

        if event.event_type == EventType::ChatSent {
            return Ok(DispatchOutcome::Streaming(stream));
        }

        let chunks = drain(stream)
            .await
            .inspect_err(|e| log_transport_failure(endpoint, "drain", e))?;
        tracing::debug!(%endpoint, chunks, "response drained");
        Ok(DispatchOutcome::Drained { chunks })
    }
}

/// Retry policy belongs to the transport; this only classifies the failure.
fn log_transport_failure(endpoint: Endpoint, stage: &str, error: &TransportError) {
    tracing::warn!(
        %endpoint,
        stage,
        error_kind = error.error_kind(),
        retryable = error.is_retryable(),
        error = %error,
        "dispatch failed"
    );
}

/// Read a stream up to its terminal chunk, counting chunks.
pub async fn drain(mut stream: ChunkStream) -> Result<usize, TransportError> {
    let mut chunks = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        chunks += 1;
        if chunk.is_terminal() {
            break;
        }
    }
    Ok(chunks)
}
