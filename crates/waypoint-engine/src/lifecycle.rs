//! Session rollover policy. Checked when an event arrives; nothing runs in
//! the background, so an idle session stays current until the next event.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::Session;

pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_SESSION_AGE: Duration = Duration::from_secs(240 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    Inactivity,
    MaxAge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum SessionStatus {
    Active,
    Expired(ExpiryReason),
}

impl SessionStatus {
    pub fn is_expired(self) -> bool {
        matches!(self, Self::Expired(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionPolicy {
    pub inactivity_timeout: Duration,
    pub max_session_age: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            max_session_age: DEFAULT_MAX_SESSION_AGE,
        }
    }
}

impl SessionPolicy {
    /// Expired once idle longer than the inactivity timeout or older than
    /// the maximum age. Sessions without timestamps are active.
    pub fn status(&self, session: &Session, now: DateTime<Utc>) -> SessionStatus {
        if exceeds(session.idle_for(now), self.inactivity_timeout) {
            return SessionStatus::Expired(ExpiryReason::Inactivity);
        }
        if exceeds(session.age(now), self.max_session_age) {
            return SessionStatus::Expired(ExpiryReason::MaxAge);
        }
        SessionStatus::Active
    }
}

fn exceeds(elapsed: Option<chrono::Duration>, limit: Duration) -> bool {
    elapsed
        .and_then(|e| e.to_std().ok())
        .is_some_and(|e| e > limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 9, 0, 0).unwrap()
    }

    fn session(started: DateTime<Utc>, last: DateTime<Utc>) -> Session {
        let mut s = Session::new();
        s.started_at = Some(started);
        s.last_activity_at = Some(last);
        s
    }

    #[test]
    fn fresh_session_is_active() {
        let policy = SessionPolicy::default();
        assert_eq!(policy.status(&Session::new(), t0()), SessionStatus::Active);
    }

    #[test]
    fn inactivity_expires_after_thirty_minutes() {
        let policy = SessionPolicy::default();
        let s = session(t0(), t0());
        assert_eq!(
            policy.status(&s, t0() + chrono::Duration::minutes(30)),
            SessionStatus::Active
        );
        assert_eq!(
            policy.status(&s, t0() + chrono::Duration::minutes(31)),
            SessionStatus::Expired(ExpiryReason::Inactivity)
        );
    }

    #[test]
    fn max_age_expires_busy_session() {
        let policy = SessionPolicy::default();
        let now = t0() + chrono::Duration::minutes(241);
        let s = session(t0(), now - chrono::Duration::minutes(1));
        assert_eq!(policy.status(&s, now), SessionStatus::Expired(ExpiryReason::MaxAge));
        assert!(policy.status(&s, now).is_expired());
    }

    #[test]
    fn clock_going_backwards_keeps_session_active() {
        let policy = SessionPolicy::default();
        let s = session(t0(), t0());
        assert_eq!(
            policy.status(&s, t0() - chrono::Duration::hours(5)),
            SessionStatus::Active
        );
    }
}
