//! Derived location state, recomputed from the full event history.

use chrono::{DateTime, Utc};
use waypoint_core::{DerivedLocationState, Event, EventType, Location};

/// Scan events from most recently appended to least and take the first
/// device and search location found.
///
/// With no search event in history the search location falls back to the
/// device location.
pub fn derive<'a, I>(events: I) -> DerivedLocationState
where
    I: IntoIterator<Item = &'a Event>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut device: Option<Location> = None;
    let mut search: Option<Location> = None;

    for event in events.into_iter().rev() {
        match event.event_type {
            EventType::LocationDetected if device.is_none() => {
                device = Some(Location::from_map(event.data.clone()));
            }
            EventType::LocationSearched if search.is_none() => {
                search = Some(Location::from_map(event.data.clone()));
            }
            _ => {}
        }
        if device.is_some() && search.is_some() {
            break;
        }
    }

    if search.is_none() {
        search = device.clone();
    }

    DerivedLocationState {
        latest_device_location: device,
        latest_search_location: search,
    }
}

/// Time of the latest device location send.
///
/// Picks the `location_detected` event with the greatest `utc_timestamp`
/// (string order, not append order). `None` when there is none or its
/// timestamp does not parse.
pub fn last_device_send_time<'a, I>(events: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a Event>,
{
    let latest = events
        .into_iter()
        .filter(|e| e.event_type == EventType::LocationDetected)
        .max_by(|a, b| a.utc_timestamp.cmp(&b.utc_timestamp))?;

    let parsed = latest.timestamp();
    if parsed.is_none() {
        tracing::debug!(timestamp = %latest.utc_timestamp, "unparsable device send timestamp");
    }
    parsed
}
