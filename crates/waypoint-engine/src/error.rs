use waypoint_core::TransportError;
use waypoint_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("persist failed for keys: {}", failed_keys.join(", "))]
    Persist { failed_keys: Vec<String> },

    #[error("tracker actor closed")]
    ActorClosed,
}
