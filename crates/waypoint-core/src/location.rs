//! Location payloads and the derived "latest location" view.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::events::EventType;

/// Latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Bit-level equality of both components.
    pub fn bit_eq(&self, other: &Coordinate) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lng.to_bits() == other.lng.to_bits()
    }
}

/// Where a location came from. Each kind has its own derived state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Device,
    Search,
}

impl LocationKind {
    pub fn event_type(self) -> EventType {
        match self {
            Self::Device => EventType::LocationDetected,
            Self::Search => EventType::LocationSearched,
        }
    }
}

impl std::str::FromStr for LocationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device" => Ok(Self::Device),
            "search" => Ok(Self::Search),
            other => Err(format!("unknown location kind: {other}")),
        }
    }
}

/// A location payload: a JSON map holding at least
/// `coordinate: {lat, lng}`. Every other field is carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(Map<String, Value>);

impl Location {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Minimal location holding only a coordinate.
    pub fn from_coordinate(coordinate: Coordinate) -> Self {
        let mut map = Map::new();
        map.insert(
            "coordinate".into(),
            json!({ "lat": coordinate.lat, "lng": coordinate.lng }),
        );
        Self(map)
    }

    /// Builder-style extra field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Extract the coordinate. `None` when missing or not numeric.
    pub fn coordinate(&self) -> Option<Coordinate> {
        let coordinate = self.0.get("coordinate")?.as_object()?;
        let lat = coordinate.get("lat")?.as_f64()?;
        let lng = coordinate.get("lng")?.as_f64()?;
        Some(Coordinate { lat, lng })
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Materialized "latest known location" view over the event history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedLocationState {
    pub latest_device_location: Option<Location>,
    pub latest_search_location: Option<Location>,
}

impl DerivedLocationState {
    /// Prior location of the given kind.
    pub fn latest(&self, kind: LocationKind) -> Option<&Location> {
        match kind {
            LocationKind::Device => self.latest_device_location.as_ref(),
            LocationKind::Search => self.latest_search_location.as_ref(),
        }
    }
}
