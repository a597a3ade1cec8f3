use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Map};
use waypoint_core::time::format_timestamp;
use waypoint_core::{Coordinate, Event, EventType, Location, LocationKind};
use waypoint_engine::{
    DispatchOutcome, EventDispatcher, MockResponse, MockTransport, SendDecision, SessionTracker,
    TrackerConfig, TrackerHandle,
};
use waypoint_store::{Database, SqliteKvStore};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 14, 9, 0, 0).unwrap()
}

fn open_tracker(path: &std::path::Path, transport: Arc<MockTransport>) -> SessionTracker {
    let store = SqliteKvStore::new(Database::open(path).unwrap());
    SessionTracker::load(
        Arc::new(store),
        EventDispatcher::new(transport),
        TrackerConfig::default(),
    )
}

fn location(event_type: EventType, lat: f64, lng: f64, at: DateTime<Utc>) -> Event {
    let data = json!({"coordinate": {"lat": lat, "lng": lng}, "name": "somewhere"});
    Event::at(format_timestamp(at), event_type, data.as_object().unwrap().clone())
}

#[tokio::test]
async fn state_survives_restart_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("waypoint.db");
    let transport = Arc::new(MockTransport::default());

    let session_id = {
        let mut tracker = open_tracker(&db_path, transport.clone());
        tracker
            .record(location(EventType::LocationDetected, 10.0, 10.0, t0()), t0())
            .await
            .unwrap();
        tracker
            .record(location(EventType::LocationSearched, 48.85, 2.35, t0()), t0())
            .await
            .unwrap();
        tracker.event_store().current_session().id.clone()
    };

    let tracker = open_tracker(&db_path, transport.clone());
    assert_eq!(tracker.event_store().current_session().id, session_id);
    assert_eq!(tracker.event_store().current_session().len(), 2);

    let derived = tracker.derived();
    let device = derived.latest_device_location.as_ref().unwrap();
    assert_eq!(device.coordinate(), Some(Coordinate::new(10.0, 10.0)));
    assert_eq!(device.as_map()["name"], "somewhere");
    let search = derived.latest_search_location.as_ref().unwrap();
    assert_eq!(search.coordinate(), Some(Coordinate::new(48.85, 2.35)));

    assert_eq!(tracker.last_device_send_time(), Some(t0()));
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn idle_session_rolls_over_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("waypoint.db");
    let transport = Arc::new(MockTransport::default());

    let first = {
        let mut tracker = open_tracker(&db_path, transport.clone());
        tracker
            .record(Event::at(format_timestamp(t0()), EventType::ChatReceived, Map::new()), t0())
            .await
            .unwrap();
        tracker.event_store().current_session().id.clone()
    };

    let mut tracker = open_tracker(&db_path, transport);
    let later = t0() + Duration::minutes(31);
    let outcome = tracker
        .record(Event::at(format_timestamp(later), EventType::ChatReceived, Map::new()), later)
        .await
        .unwrap();

    assert_eq!(outcome.archived, Some(first.clone()));
    assert_matches!(outcome.dispatch, DispatchOutcome::Recorded);
    let store = tracker.event_store();
    assert_eq!(store.archived_session(&first).unwrap().len(), 1);
    assert_eq!(store.current_session().len(), 1);
    assert_eq!(store.consolidate().len(), 2);
}

#[tokio::test]
async fn caller_flow_gate_then_record() {
    let transport = Arc::new(MockTransport::new(vec![
        MockResponse::message(json!({"status": "ok"})),
        MockResponse::message(json!({"reply": "hello"})),
    ]));
    let tracker = SessionTracker::load(
        Arc::new(waypoint_store::MemoryKvStore::new()),
        EventDispatcher::new(transport.clone()),
        TrackerConfig::default(),
    );
    let handle = TrackerHandle::spawn(tracker);

    // First observation always goes out
    let here = Location::from_coordinate(Coordinate::new(10.0, 10.0));
    let decision = handle
        .decide_location(here.clone(), LocationKind::Device, t0())
        .await
        .unwrap();
    assert_eq!(decision, SendDecision::SendNew);
    handle
        .record(
            Event::at(format_timestamp(t0()), EventType::LocationDetected, here.into_map()),
            t0(),
        )
        .await
        .unwrap();

    // Eleven meters away an hour later is suppressed
    let nearby = Location::from_coordinate(Coordinate::new(10.0, 10.0001));
    let decision = handle
        .decide_location(nearby, LocationKind::Device, t0() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(decision, SendDecision::Skip);

    let outcome = handle
        .record(
            Event::at(format_timestamp(t0()), EventType::ChatSent, Map::new()),
            t0() + Duration::minutes(5),
        )
        .await
        .unwrap();
    let stream = assert_matches!(outcome.dispatch, DispatchOutcome::Streaming(s) => s);
    let chunks = waypoint_engine::dispatcher::drain(stream).await.unwrap();
    assert_eq!(chunks, 2);

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].payload["data"]["coordinate"]["lat"], 10.0);
}
