//! The composed session tracker: lifecycle check, append, derive, dispatch,
//! persist.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;
use waypoint_core::{DerivedLocationState, Event, Location, LocationKind, SessionId};
use waypoint_settings::WaypointSettings;
use waypoint_store::KeyValueStore;

use crate::deriver;
use crate::dispatcher::{DispatchOutcome, EventDispatcher};
use crate::error::EngineError;
use crate::event_store::EventStore;
use crate::gate::{self, GateThresholds, SendDecision};
use crate::lifecycle::{SessionPolicy, SessionStatus};
use crate::persistence;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackerConfig {
    pub policy: SessionPolicy,
    pub thresholds: GateThresholds,
}

impl From<&WaypointSettings> for TrackerConfig {
    fn from(settings: &WaypointSettings) -> Self {
        use std::time::Duration;
        Self {
            policy: SessionPolicy {
                inactivity_timeout: Duration::from_secs(settings.session.inactivity_timeout_secs),
                max_session_age: Duration::from_secs(settings.session.max_session_age_secs),
            },
            thresholds: GateThresholds {
                distance_m: settings.gate.distance_threshold_m,
                resend_interval: Duration::from_secs(settings.gate.resend_interval_secs),
            },
        }
    }
}

#[derive(Debug)]
pub struct RecordOutcome {
    /// The event as stored, with its session id.
    pub event: Event,
    pub dispatch: DispatchOutcome,
    /// Session archived by the lifecycle check before this event landed.
    pub archived: Option<SessionId>,
}

/// Owns all session state. Mutations take `&mut self`; share it through
/// [`crate::TrackerHandle`].
pub struct SessionTracker {
    store: Arc<dyn KeyValueStore>,
    dispatcher: EventDispatcher,
    config: TrackerConfig,
    events: EventStore,
    derived: DerivedLocationState,
}

impl SessionTracker {
    /// Load persisted state and derive locations from it.
    pub fn load(
        store: Arc<dyn KeyValueStore>,
        dispatcher: EventDispatcher,
        config: TrackerConfig,
    ) -> Self {
        let events = persistence::load(store.as_ref());
        let derived = deriver::derive(events.consolidate());
        tracing::info!(
            session_id = %events.current_session().id,
            events = events.event_count(),
            "session tracker loaded"
        );
        Self {
            store,
            dispatcher,
            config,
            events,
            derived,
        }
    }

    /// Record one event.
    ///
    /// An expired session is archived first. The event is appended,
    /// dispatched and persisted; a dispatch failure is returned only after
    /// the event has been persisted, and a persist failure is logged.
    #[instrument(
        skip_all,
        fields(event_type = %event.event_type, session_id = tracing::field::Empty)
    )]
    pub async fn record(
        &mut self,
        event: Event,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome, EngineError> {
        let archived = self.roll_over_if_expired(now);
        tracing::Span::current().record(
            "session_id",
            tracing::field::display(&self.events.current_session().id),
        );

        let stored = self.events.append(event, now);
        if stored.event_type.is_location() {
            self.derived = deriver::derive(self.events.consolidate());
        }

        let dispatch = self.dispatcher.dispatch(&stored).await;
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "persist after record failed");
        }

        Ok(RecordOutcome {
            event: stored,
            dispatch: dispatch?,
            archived,
        })
    }

    /// Send-gate decision for a candidate location.
    pub fn decide_location(
        &self,
        candidate: &Location,
        kind: LocationKind,
        now: DateTime<Utc>,
    ) -> SendDecision {
        gate::decide(
            candidate,
            kind,
            &self.derived,
            self.last_device_send_time(),
            now,
            &self.config.thresholds,
        )
    }

    /// Stored prior device location, for the resend-with-new-time path.
    pub fn resend_location(&self) -> Option<Location> {
        self.derived.latest_device_location.clone()
    }

    pub fn derived(&self) -> &DerivedLocationState {
        &self.derived
    }

    pub fn last_device_send_time(&self) -> Option<DateTime<Utc>> {
        deriver::last_device_send_time(self.events.consolidate())
    }

    pub fn status(&self, now: DateTime<Utc>) -> SessionStatus {
        self.config.policy.status(self.events.current_session(), now)
    }

    /// Archive the current session regardless of the lifecycle policy.
    pub fn archive_now(&mut self) -> Option<SessionId> {
        let archived = self.events.archive_current_session();
        if archived.is_some() {
            if let Err(e) = self.persist() {
                tracing::warn!(error = %e, "persist after archive failed");
            }
        }
        archived
    }

    pub fn event_store(&self) -> &EventStore {
        &self.events
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Write the current state to the store.
    pub fn persist(&self) -> Result<(), EngineError> {
        persistence::persist(self.store.as_ref(), &self.events, &self.derived)
    }

    fn roll_over_if_expired(&mut self, now: DateTime<Utc>) -> Option<SessionId> {
        match self.status(now) {
            SessionStatus::Expired(reason) => {
                let archived = self.events.archive_current_session();
                if let Some(id) = &archived {
                    tracing::info!(session_id = %id, ?reason, "session expired");
                }
                archived
            }
            SessionStatus::Active => None,
        }
    }
}
