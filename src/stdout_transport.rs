use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use waypoint_core::{ChunkStream, Endpoint, ServerChunk, Transport, TransportError};

/// Transport that prints each request as a JSON line and answers `Done`.
pub struct StdoutTransport;

#[async_trait]
impl Transport for StdoutTransport {
    async fn send(
        &self,
        endpoint: Endpoint,
        event_type: &str,
        payload: Value,
    ) -> Result<ChunkStream, TransportError> {
        let line = json!({
            "endpoint": endpoint,
            "event_type": event_type,
            "payload": payload,
        });
        println!("{line}");
        Ok(stream::iter(vec![Ok(ServerChunk::Done)]).boxed())
    }
}
