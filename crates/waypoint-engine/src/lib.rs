//! Session tracking engine: event store, location derivation, the location
//! send-gate, session rollover and event dispatch.

pub mod actor;
pub mod deriver;
pub mod dispatcher;
pub mod error;
pub mod event_store;
pub mod gate;
pub mod lifecycle;
pub mod mock;
pub mod persistence;
pub mod session;
pub mod tracker;

pub use actor::TrackerHandle;
pub use dispatcher::{DispatchOutcome, EventDispatcher};
pub use error::EngineError;
pub use event_store::EventStore;
pub use gate::{GateThresholds, SendDecision};
pub use lifecycle::{ExpiryReason, SessionPolicy, SessionStatus};
pub use mock::{MockResponse, MockTransport};
pub use session::{Session, SessionMetadata};
pub use tracker::{RecordOutcome, SessionTracker, TrackerConfig};
