//! Single-writer actor around [`SessionTracker`].
//!
//! Every mutation and every gate read is serialized through one consumer
//! task, so no caller can observe a half-applied record.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use waypoint_core::{DerivedLocationState, Event, Location, LocationKind, SessionId};

use crate::error::EngineError;
use crate::event_store::EventStore;
use crate::gate::SendDecision;
use crate::tracker::{RecordOutcome, SessionTracker};

enum Command {
    Record {
        event: Event,
        now: DateTime<Utc>,
        reply: oneshot::Sender<Result<RecordOutcome, EngineError>>,
    },
    DecideLocation {
        candidate: Location,
        kind: LocationKind,
        now: DateTime<Utc>,
        reply: oneshot::Sender<SendDecision>,
    },
    ResendLocation {
        reply: oneshot::Sender<Option<Location>>,
    },
    Derived {
        reply: oneshot::Sender<DerivedLocationState>,
    },
    LastDeviceSendTime {
        reply: oneshot::Sender<Option<DateTime<Utc>>>,
    },
    ArchiveNow {
        reply: oneshot::Sender<Option<SessionId>>,
    },
    Snapshot {
        reply: oneshot::Sender<EventStore>,
    },
}

/// Cloneable handle to a tracker running on its own task. The task exits
/// once every handle is dropped.
#[derive(Clone)]
pub struct TrackerHandle {
    tx: mpsc::Sender<Command>,
}

impl TrackerHandle {
    /// Move the tracker onto a background task.
    pub fn spawn(tracker: SessionTracker) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(tracker_worker(rx, tracker));
        Self { tx }
    }

    /// Record an event. A `chat_sent` response stream comes back inside the
    /// outcome and is drained by the caller; the tracker is free again as
    /// soon as this returns.
    pub async fn record(
        &self,
        event: Event,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome, EngineError> {
        self.request(|reply| Command::Record { event, now, reply })
            .await?
    }

    pub async fn decide_location(
        &self,
        candidate: Location,
        kind: LocationKind,
        now: DateTime<Utc>,
    ) -> Result<SendDecision, EngineError> {
        self.request(|reply| Command::DecideLocation {
            candidate,
            kind,
            now,
            reply,
        })
        .await
    }

    pub async fn resend_location(&self) -> Result<Option<Location>, EngineError> {
        self.request(|reply| Command::ResendLocation { reply }).await
    }

    pub async fn derived(&self) -> Result<DerivedLocationState, EngineError> {
        self.request(|reply| Command::Derived { reply }).await
    }

    pub async fn last_device_send_time(&self) -> Result<Option<DateTime<Utc>>, EngineError> {
        self.request(|reply| Command::LastDeviceSendTime { reply })
            .await
    }

    pub async fn archive_now(&self) -> Result<Option<SessionId>, EngineError> {
        self.request(|reply| Command::ArchiveNow { reply }).await
    }

    /// Copy of the event store as of now.
    pub async fn snapshot(&self) -> Result<EventStore, EngineError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| EngineError::ActorClosed)?;
        reply_rx.await.map_err(|_| EngineError::ActorClosed)
    }
}

/// Processes commands one at a time.
async fn tracker_worker(mut rx: mpsc::Receiver<Command>, mut tracker: SessionTracker) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Record { event, now, reply } => {
                let _ = reply.send(tracker.record(event, now).await);
            }
            Command::DecideLocation {
                candidate,
                kind,
                now,
                reply,
            } => {
                let _ = reply.send(tracker.decide_location(&candidate, kind, now));
            }
            Command::ResendLocation { reply } => {
                let _ = reply.send(tracker.resend_location());
            }
            Command::Derived { reply } => {
                let _ = reply.send(tracker.derived().clone());
            }
            Command::LastDeviceSendTime { reply } => {
                let _ = reply.send(tracker.last_device_send_time());
            }
            Command::ArchiveNow { reply } => {
                let _ = reply.send(tracker.archive_now());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(tracker.event_store().clone());
            }
        }
    }
    tracing::debug!("tracker worker stopped");
}
