pub mod errors;
pub mod events;
pub mod geo;
pub mod ids;
pub mod location;
pub mod time;
pub mod transport;

pub use errors::TransportError;
pub use events::{Event, EventFamily, EventType};
pub use ids::SessionId;
pub use location::{Coordinate, DerivedLocationState, Location, LocationKind};
pub use transport::{ChunkStream, Endpoint, ServerChunk, Transport};
