//! In-memory event store: one mutable current session plus immutable
//! archived sessions keyed by id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use waypoint_core::{Event, SessionId};

use crate::session::Session;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventStore {
    current: Session,
    archived: BTreeMap<SessionId, Session>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from loaded parts.
    pub fn from_parts(current: Session, archived: BTreeMap<SessionId, Session>) -> Self {
        Self { current, archived }
    }

    /// Append an event to the current session and return the stored copy.
    ///
    /// Events without a session id get the current one. An event stamped
    /// with a different id is re-stamped so the current session only ever
    /// holds its own events.
    pub fn append(&mut self, mut event: Event, now: DateTime<Utc>) -> Event {
        match &event.session_id {
            None => event.session_id = Some(self.current.id.clone()),
            Some(id) if *id != self.current.id => {
                tracing::warn!(
                    session_id = %self.current.id,
                    foreign_session_id = %id,
                    event_type = %event.event_type,
                    "event carried a foreign session id, re-stamping"
                );
                event.session_id = Some(self.current.id.clone());
            }
            Some(_) => {}
        }

        if self.current.events.is_empty() || self.current.started_at.is_none() {
            self.current.started_at = Some(now);
        }
        self.current.last_activity_at = Some(now);
        self.current.events.push(event.clone());
        event
    }

    /// Move the current session into the archive and start a new one.
    ///
    /// Returns the archived id, or `None` when the current session is empty
    /// (nothing is archived in that case).
    pub fn archive_current_session(&mut self) -> Option<SessionId> {
        if self.current.is_empty() {
            return None;
        }
        let archived = std::mem::take(&mut self.current);
        let id = archived.id.clone();
        tracing::info!(session_id = %id, events = archived.len(), "archived session");
        self.archived.insert(id.clone(), archived);
        Some(id)
    }

    /// Every event across archived and current sessions.
    ///
    /// Archives come first, oldest `started_at` first (ties by id), then the
    /// current session. Each session keeps its append order, so iterating in
    /// reverse visits the most recently appended events first.
    pub fn consolidate(&self) -> Vec<&Event> {
        let mut archives: Vec<&Session> = self.archived.values().collect();
        archives.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        archives
            .into_iter()
            .chain(std::iter::once(&self.current))
            .flat_map(|session| session.events.iter())
            .collect()
    }

    pub fn current_session(&self) -> &Session {
        &self.current
    }

    pub fn archived_sessions(&self) -> &BTreeMap<SessionId, Session> {
        &self.archived
    }

    pub fn archived_session(&self, id: &SessionId) -> Option<&Session> {
        self.archived.get(id)
    }

    /// Total number of events across all sessions.
    pub fn event_count(&self) -> usize {
        self.current.len() + self.archived.values().map(Session::len).sum::<usize>()
    }
}
