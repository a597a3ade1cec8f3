//! Persisted layout of the event store in a key-value store.
//!
//! Every key is written and read on its own. A bad write does not stop the
//! others, and a missing or corrupt value falls back to its default without
//! affecting the rest of the load.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use tracing::instrument;
use waypoint_core::time::parse_timestamp;
use waypoint_core::{DerivedLocationState, Event, Location, LocationKind, SessionId};
use waypoint_store::KeyValueStore;

use crate::error::EngineError;
use crate::event_store::EventStore;
use crate::session::{Session, SessionMetadata};

pub const CURRENT_SESSION_EVENTS_KEY: &str = "waypoint.current_session_events";
pub const ARCHIVED_SESSIONS_KEY: &str = "waypoint.archived_sessions";
pub const SESSION_METADATA_KEY: &str = "waypoint.session_metadata";
pub const LATEST_DEVICE_LOCATION_KEY: &str = "waypoint.latest_device_location";
pub const LATEST_SEARCH_LOCATION_KEY: &str = "waypoint.latest_search_location";

/// Write the event store and location caches.
///
/// All keys are attempted; failures are collected into
/// [`EngineError::Persist`].
#[instrument(skip_all, fields(session_id = %events.current_session().id))]
pub fn persist(
    store: &dyn KeyValueStore,
    events: &EventStore,
    derived: &DerivedLocationState,
) -> Result<(), EngineError> {
    let current = events.current_session();
    let mut entries = vec![
        (CURRENT_SESSION_EVENTS_KEY, serde_json::to_string(&current.events)),
        (ARCHIVED_SESSIONS_KEY, serde_json::to_string(events.archived_sessions())),
        (
            SESSION_METADATA_KEY,
            serde_json::to_string(&SessionMetadata::from_session(current)),
        ),
    ];
    if let Some(device) = &derived.latest_device_location {
        entries.push((LATEST_DEVICE_LOCATION_KEY, serde_json::to_string(device)));
    }
    if let Some(search) = &derived.latest_search_location {
        entries.push((LATEST_SEARCH_LOCATION_KEY, serde_json::to_string(search)));
    }

    let mut failed_keys = Vec::new();
    for (key, encoded) in entries {
        let result = encoded
            .map_err(EngineError::from)
            .and_then(|value| store.save(key, &value).map_err(EngineError::from));
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "failed to persist key");
            failed_keys.push(key.to_string());
        }
    }

    if failed_keys.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Persist { failed_keys })
    }
}

/// Rebuild the event store. Never fails; see module docs.
///
/// The three blobs may come from different persists when one write failed,
/// so loaded current-session events are checked against the archive:
/// events of an already archived session are stale and dropped, and a block
/// stamped with some other unarchived session is archived under its own id.
#[instrument(skip_all)]
pub fn load(store: &dyn KeyValueStore) -> EventStore {
    let events: Vec<Event> = read_key(store, CURRENT_SESSION_EVENTS_KEY).unwrap_or_default();
    let mut archived: BTreeMap<SessionId, Session> =
        read_key(store, ARCHIVED_SESSIONS_KEY).unwrap_or_default();
    let metadata: Option<SessionMetadata> =
        read_key::<SessionMetadata>(store, SESSION_METADATA_KEY).filter(|m| {
            let stale = archived.contains_key(&m.session_id);
            if stale {
                tracing::warn!(
                    session_id = %m.session_id,
                    "metadata names an archived session, ignoring it"
                );
            }
            !stale
        });

    let id = metadata
        .as_ref()
        .map(|m| m.session_id.clone())
        .or_else(|| {
            events
                .iter()
                .filter_map(|e| e.session_id.as_ref())
                .find(|sid| !archived.contains_key(*sid))
                .cloned()
        })
        .unwrap_or_default();

    let mut own = Vec::new();
    let mut orphans: BTreeMap<SessionId, Vec<Event>> = BTreeMap::new();
    let mut stale = 0usize;
    for mut event in events {
        match event.session_id.clone() {
            Some(sid) if sid == id => own.push(event),
            Some(sid) if archived.contains_key(&sid) => stale += 1,
            Some(sid) => orphans.entry(sid).or_default().push(event),
            None => {
                event.session_id = Some(id.clone());
                own.push(event);
            }
        }
    }
    if stale > 0 {
        tracing::warn!(events = stale, "dropped current-session events that were already archived");
    }
    for (sid, block) in orphans {
        tracing::warn!(session_id = %sid, events = block.len(), "archiving orphaned event block");
        let session = session_from_events(sid.clone(), block, None);
        archived.insert(sid, session);
    }

    let current = session_from_events(id, own, metadata.as_ref());
    tracing::debug!(
        session_id = %current.id,
        current_events = current.len(),
        archived_sessions = archived.len(),
        "loaded event store"
    );
    EventStore::from_parts(current, archived)
}

/// Session over loaded events. Timestamps come from the metadata when given,
/// else from the first and last event; an empty session has none.
fn session_from_events(
    id: SessionId,
    events: Vec<Event>,
    metadata: Option<&SessionMetadata>,
) -> Session {
    if events.is_empty() {
        return Session::with_id(id);
    }
    let started_at = metadata
        .and_then(SessionMetadata::started_at)
        .or_else(|| events.first().and_then(|e| parse_timestamp(&e.utc_timestamp)));
    let last_activity_at = metadata
        .and_then(SessionMetadata::last_activity_at)
        .or_else(|| events.last().and_then(|e| parse_timestamp(&e.utc_timestamp)));
    Session {
        id,
        events,
        started_at,
        last_activity_at,
    }
}

/// Cached latest location of one kind, as written by [`persist`].
pub fn cached_location(store: &dyn KeyValueStore, kind: LocationKind) -> Option<Location> {
    let key = match kind {
        LocationKind::Device => LATEST_DEVICE_LOCATION_KEY,
        LocationKind::Search => LATEST_SEARCH_LOCATION_KEY,
    };
    read_key(store, key)
}

fn read_key<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read key, using default");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "corrupt value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use parking_lot::Mutex;
    use serde_json::{json, Map};
    use waypoint_core::{Coordinate, EventType};
    use waypoint_store::{MemoryKvStore, StoreError};

    use crate::deriver::derive;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 9, 0, 0).unwrap()
    }

    fn located(lat: f64) -> Event {
        let data = json!({"coordinate": {"lat": lat, "lng": 2.0}, "label": "here"});
        Event::at("2026-02-14T09:00:00.000Z", EventType::LocationDetected, data.as_object().unwrap().clone())
    }

    fn populated() -> EventStore {
        let mut events = EventStore::new();
        events.append(located(1.0), t0());
        events.append(Event::at("2026-02-14T09:01:00.000Z", EventType::ChatSent, Map::new()), t0() + Duration::minutes(1));
        events.archive_current_session();
        events.append(located(3.0), t0() + Duration::hours(1));
        events
    }

    /// Store whose writes fail for selected keys.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryKvStore,
        broken: Mutex<Vec<&'static str>>,
    }

    impl FlakyStore {
        fn break_key(&self, key: &'static str) {
            self.broken.lock().push(key);
        }
    }

    impl KeyValueStore for FlakyStore {
        fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.broken.lock().contains(&key) {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.save(key, value)
        }
        fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.load(key)
        }
        fn exists(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.exists(key)
        }
        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn round_trip_reproduces_state() {
        let store = MemoryKvStore::new();
        let events = populated();
        let derived = derive(events.consolidate());
        persist(&store, &events, &derived).unwrap();

        let loaded = load(&store);
        assert_eq!(loaded, events);
        assert_eq!(derive(loaded.consolidate()), derived);
    }

    #[test]
    fn location_caches_written_only_when_present() {
        let store = MemoryKvStore::new();
        persist(&store, &EventStore::new(), &DerivedLocationState::default()).unwrap();
        assert!(!store.exists(LATEST_DEVICE_LOCATION_KEY).unwrap());
        assert!(!store.exists(LATEST_SEARCH_LOCATION_KEY).unwrap());

        let derived = DerivedLocationState {
            latest_device_location: Some(Location::from_coordinate(Coordinate::new(4.0, 5.0))),
            latest_search_location: None,
        };
        persist(&store, &EventStore::new(), &derived).unwrap();
        assert_eq!(
            cached_location(&store, LocationKind::Device).and_then(|l| l.coordinate()),
            Some(Coordinate::new(4.0, 5.0))
        );
        assert!(cached_location(&store, LocationKind::Search).is_none());
    }

    #[test]
    fn empty_store_loads_fresh_session() {
        let loaded = load(&MemoryKvStore::new());
        assert!(loaded.current_session().is_empty());
        assert!(loaded.archived_sessions().is_empty());
        assert!(loaded.current_session().started_at.is_none());
    }

    #[test]
    fn corrupt_keys_fall_back_independently() {
        let store = MemoryKvStore::new();
        let events = populated();
        persist(&store, &events, &derive(events.consolidate())).unwrap();
        store.save(ARCHIVED_SESSIONS_KEY, "{not json").unwrap();

        let loaded = load(&store);
        assert!(loaded.archived_sessions().is_empty());
        assert_eq!(loaded.current_session(), events.current_session());
    }

    #[test]
    fn missing_metadata_recovers_from_events() {
        let store = MemoryKvStore::new();
        let events = populated();
        persist(&store, &events, &DerivedLocationState::default()).unwrap();
        store.remove(SESSION_METADATA_KEY).unwrap();

        let loaded = load(&store);
        let current = loaded.current_session();
        assert_eq!(current.id, events.current_session().id);
        assert_eq!(current.len(), 1);
        assert_eq!(current.started_at, parse_timestamp("2026-02-14T09:00:00.000Z"));
    }

    #[test]
    fn failed_writes_do_not_stop_the_rest() {
        let store = FlakyStore::default();
        store.break_key(CURRENT_SESSION_EVENTS_KEY);
        let events = populated();
        let err = persist(&store, &events, &derive(events.consolidate())).unwrap_err();

        match err {
            EngineError::Persist { failed_keys } => {
                assert_eq!(failed_keys, vec![CURRENT_SESSION_EVENTS_KEY.to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.exists(ARCHIVED_SESSIONS_KEY).unwrap());
        assert!(store.exists(SESSION_METADATA_KEY).unwrap());
        assert!(store.exists(LATEST_DEVICE_LOCATION_KEY).unwrap());
    }

    #[test]
    fn stale_events_after_failed_archive_write_are_not_duplicated() {
        let store = FlakyStore::default();
        let mut events = EventStore::new();
        events.append(Event::at("2026-02-14T09:00:00.000Z", EventType::ChatSent, Map::new()), t0());
        persist(&store, &events, &DerivedLocationState::default()).unwrap();

        let archived = events.archive_current_session().unwrap();
        store.break_key(CURRENT_SESSION_EVENTS_KEY);
        assert!(persist(&store, &events, &DerivedLocationState::default()).is_err());

        let loaded = load(&store);
        assert_eq!(loaded.consolidate().len(), 1);
        assert!(loaded.current_session().is_empty());
        assert_eq!(loaded.current_session().id, events.current_session().id);
        assert_eq!(loaded.archived_session(&archived).unwrap().len(), 1);

        // Persisting the repaired state keeps it repaired
        let healthy = MemoryKvStore::new();
        persist(&healthy, &loaded, &DerivedLocationState::default()).unwrap();
        assert_eq!(load(&healthy).consolidate().len(), 1);
    }

    #[test]
    fn stale_metadata_after_archive_keeps_new_events_current() {
        let store = FlakyStore::default();
        let mut events = EventStore::new();
        events.append(located(1.0), t0());
        persist(&store, &events, &DerivedLocationState::default()).unwrap();

        let archived = events.archive_current_session().unwrap();
        events.append(located(2.0), t0() + Duration::hours(1));
        store.break_key(SESSION_METADATA_KEY);
        assert!(persist(&store, &events, &DerivedLocationState::default()).is_err());

        let loaded = load(&store);
        assert_ne!(loaded.current_session().id, archived);
        assert_eq!(loaded.current_session().id, events.current_session().id);
        assert_eq!(loaded.current_session().len(), 1);
        assert_eq!(loaded.consolidate().len(), 2);
    }

    #[test]
    fn foreign_block_is_archived_under_its_own_id() {
        let store = MemoryKvStore::new();
        let orphan = SessionId::from_raw("s-orphan");
        let current = SessionId::from_raw("s-current");
        let block = vec![
            located(1.0).with_session(orphan.clone()),
            located(2.0).with_session(orphan.clone()),
        ];
        store
            .save(CURRENT_SESSION_EVENTS_KEY, &serde_json::to_string(&block).unwrap())
            .unwrap();
        let meta = SessionMetadata {
            session_id: current.clone(),
            started_at: None,
            last_activity_at: None,
        };
        store
            .save(SESSION_METADATA_KEY, &serde_json::to_string(&meta).unwrap())
            .unwrap();

        let loaded = load(&store);
        assert_eq!(loaded.current_session().id, current);
        assert!(loaded.current_session().is_empty());
        let archived = loaded.archived_session(&orphan).unwrap();
        assert_eq!(archived.len(), 2);
        assert_eq!(archived.started_at, parse_timestamp("2026-02-14T09:00:00.000Z"));
        assert_eq!(loaded.consolidate().len(), 2);
    }
}
