use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;

use waypoint_core::{ChunkStream, Endpoint, ServerChunk, Transport, TransportError};

/// Pre-programmed responses for deterministic testing without a backend.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Yield these items, then end.
    Chunks(Vec<Result<ServerChunk, TransportError>>),
    /// Yield the same message forever.
    Endless(Value),
    /// Fail the `send` call itself.
    Error(TransportError),
    /// Wait, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// One message followed by `Done`.
    pub fn message(data: Value) -> Self {
        Self::Chunks(vec![Ok(ServerChunk::Message { data }), Ok(ServerChunk::Done)])
    }

    /// A message, then a mid-stream error.
    pub fn stream_error(error: TransportError) -> Self {
        Self::Chunks(vec![
            Ok(ServerChunk::Message { data: Value::Null }),
            Err(error),
        ])
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// A recorded `send` call.
#[derive(Clone, Debug, PartialEq)]
pub struct SentRequest {
    pub endpoint: Endpoint,
    pub event_type: String,
    pub payload: Value,
}

/// Transport that replays queued responses in order and records every call.
/// Once the queue is empty each call answers with a lone `Done`.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<MockResponse>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl MockTransport {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        endpoint: Endpoint,
        event_type: &str,
        payload: Value,
    ) -> Result<ChunkStream, TransportError> {
        self.sent.lock().push(SentRequest {
            endpoint,
            event_type: event_type.to_string(),
            payload,
        });
        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or(MockResponse::Chunks(vec![Ok(ServerChunk::Done)]));

        resolve_response(response).await
    }
}

/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve_response(response: MockResponse) -> Result<ChunkStream, TransportError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Chunks(chunks) => return Ok(stream::iter(chunks).boxed()),
            MockResponse::Endless(data) => {
                return Ok(stream::repeat(Ok(ServerChunk::Message { data })).boxed())
            }
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
        }
    }
}
