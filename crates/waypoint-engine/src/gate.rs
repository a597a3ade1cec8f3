//! Location send-gate: decides whether a location observation needs to go
//! out, given what was derived from history.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use waypoint_core::geo::haversine_distance_m;
use waypoint_core::{DerivedLocationState, Location, LocationKind};

pub const DEFAULT_DISTANCE_THRESHOLD_M: f64 = 200.0;
pub const DEFAULT_RESEND_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendDecision {
    /// Same place, sent recently.
    Skip,
    /// Same place, but the last send is stale: resend the stored prior
    /// location with a fresh timestamp.
    ResendSameLocationNewTime,
    SendNew,
}

impl SendDecision {
    pub fn should_send(self) -> bool {
        !matches!(self, Self::Skip)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GateThresholds {
    pub distance_m: f64,
    pub resend_interval: Duration,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            distance_m: DEFAULT_DISTANCE_THRESHOLD_M,
            resend_interval: DEFAULT_RESEND_INTERVAL,
        }
    }
}

/// Classify a candidate location against the prior one of the same kind.
///
/// Missing priors and unreadable coordinates always yield `SendNew`.
pub fn decide(
    candidate: &Location,
    kind: LocationKind,
    derived: &DerivedLocationState,
    last_device_send_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    thresholds: &GateThresholds,
) -> SendDecision {
    let Some(prior) = derived.latest(kind) else {
        return SendDecision::SendNew;
    };
    let (Some(from), Some(to)) = (prior.coordinate(), candidate.coordinate()) else {
        tracing::debug!(?kind, "coordinate missing or malformed, sending");
        return SendDecision::SendNew;
    };

    let distance = haversine_distance_m(from, to);
    let near = distance <= thresholds.distance_m;

    let decision = match kind {
        LocationKind::Device => match last_device_send_time {
            None => SendDecision::SendNew,
            Some(_) if !near => SendDecision::SendNew,
            Some(sent_at) if sent_recently(sent_at, now, thresholds.resend_interval) => {
                SendDecision::Skip
            }
            Some(_) => SendDecision::ResendSameLocationNewTime,
        },
        LocationKind::Search => {
            if near && from.bit_eq(&to) {
                SendDecision::Skip
            } else {
                SendDecision::SendNew
            }
        }
    };

    tracing::debug!(?kind, distance_m = distance, ?decision, "send-gate decision");
    decision
}

/// A send time in the future counts as recent.
fn sent_recently(sent_at: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> bool {
    match (now - sent_at).to_std() {
        Ok(elapsed) => elapsed < interval,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use waypoint_core::Coordinate;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 12, 0, 0).unwrap()
    }

    fn at(lat: f64, lng: f64) -> Location {
        Location::from_coordinate(Coordinate::new(lat, lng))
    }

    fn device_prior(lat: f64, lng: f64) -> DerivedLocationState {
        DerivedLocationState {
            latest_device_location: Some(at(lat, lng)),
            latest_search_location: Some(at(lat, lng)),
        }
    }

    fn search_prior(lat: f64, lng: f64) -> DerivedLocationState {
        DerivedLocationState {
            latest_device_location: None,
            latest_search_location: Some(at(lat, lng)),
        }
    }

    fn device(derived: &DerivedLocationState, candidate: Location, sent_ago: Option<Duration>) -> SendDecision {
        decide(
            &candidate,
            LocationKind::Device,
            derived,
            sent_ago.map(|ago| now() - ago),
            now(),
            &GateThresholds::default(),
        )
    }

    fn search(derived: &DerivedLocationState, candidate: Location) -> SendDecision {
        decide(
            &candidate,
            LocationKind::Search,
            derived,
            None,
            now(),
            &GateThresholds::default(),
        )
    }

    #[test]
    fn device_nearby_recent_is_skipped() {
        let derived = device_prior(10.0, 10.0);
        assert_eq!(
            device(&derived, at(10.0, 10.0001), Some(Duration::hours(1))),
            SendDecision::Skip
        );
    }

    #[test]
    fn device_nearby_stale_is_resent() {
        let derived = device_prior(10.0, 10.0);
        assert_eq!(
            device(&derived, at(10.0, 10.0001), Some(Duration::hours(13))),
            SendDecision::ResendSameLocationNewTime
        );
    }

    #[test]
    fn device_resend_boundary_is_inclusive() {
        let derived = device_prior(10.0, 10.0);
        assert_eq!(
            device(&derived, at(10.0, 10.0), Some(Duration::hours(12))),
            SendDecision::ResendSameLocationNewTime
        );
    }

    #[test]
    fn device_far_is_sent() {
        let derived = device_prior(10.0, 10.0);
        assert_eq!(
            device(&derived, at(10.01, 10.0), Some(Duration::hours(1))),
            SendDecision::SendNew
        );
    }

    #[test]
    fn device_without_prior_is_sent() {
        let derived = DerivedLocationState::default();
        assert_eq!(
            device(&derived, at(10.0, 10.0), Some(Duration::hours(1))),
            SendDecision::SendNew
        );
        assert_eq!(device(&derived, Location::default(), None), SendDecision::SendNew);
    }

    #[test]
    fn device_without_send_time_is_sent() {
        let derived = device_prior(10.0, 10.0);
        assert_eq!(device(&derived, at(10.0, 10.0), None), SendDecision::SendNew);
    }

    #[test]
    fn search_exact_match_is_skipped() {
        let derived = search_prior(10.0, 10.0);
        assert_eq!(search(&derived, at(10.0, 10.0)), SendDecision::Skip);
    }

    #[test]
    fn search_nearby_but_not_equal_is_sent() {
        let derived = search_prior(10.0, 10.0);
        assert_eq!(search(&derived, at(10.00001, 10.0)), SendDecision::SendNew);
    }

    #[test]
    fn search_falls_back_to_device_prior() {
        let derived = device_prior(10.0, 10.0);
        assert_eq!(search(&derived, at(10.0, 10.0)), SendDecision::Skip);
    }

    #[test]
    fn malformed_coordinates_fail_open() {
        let derived = device_prior(10.0, 10.0);
        let bad = Location::from_map(json!({"coordinate": {"lat": "ten"}}).as_object().unwrap().clone());
        assert_eq!(device(&derived, bad.clone(), Some(Duration::hours(1))), SendDecision::SendNew);

        let broken_prior = DerivedLocationState {
            latest_device_location: Some(Location::default()),
            latest_search_location: Some(bad),
        };
        assert_eq!(
            device(&broken_prior, at(10.0, 10.0), Some(Duration::hours(1))),
            SendDecision::SendNew
        );
        assert_eq!(search(&broken_prior, at(10.0, 10.0)), SendDecision::SendNew);
    }

    #[test]
    fn custom_thresholds() {
        let derived = device_prior(10.0, 10.0);
        let tight = GateThresholds {
            distance_m: 5.0,
            resend_interval: std::time::Duration::from_secs(30 * 60),
        };
        let decision = decide(
            &at(10.0, 10.0001),
            LocationKind::Device,
            &derived,
            Some(now() - Duration::minutes(10)),
            now(),
            &tight,
        );
        assert_eq!(decision, SendDecision::SendNew);
    }

    #[test]
    fn only_skip_suppresses_send() {
        assert!(!SendDecision::Skip.should_send());
        assert!(SendDecision::ResendSameLocationNewTime.should_send());
        assert!(SendDecision::SendNew.should_send());
    }
}
