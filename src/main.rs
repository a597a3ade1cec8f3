//! # waypoint
//!
//! Command-line front end for the session tracker: records events, asks the
//! location send-gate, and inspects persisted sessions.

#![deny(unsafe_code)]

mod stdout_transport;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use waypoint_core::{Coordinate, Event, EventType, Location, LocationKind};
use waypoint_engine::{DispatchOutcome, EventDispatcher, SessionTracker, TrackerConfig, TrackerHandle};
use waypoint_settings::WaypointSettings;
use waypoint_store::{Database, SqliteKvStore};
use waypoint_telemetry::{LogQuery, TelemetryConfig, TelemetryGuard};

use crate::stdout_transport::StdoutTransport;

/// Waypoint session tracker.
#[derive(Parser, Debug)]
#[command(name = "waypoint", about = "Event, session and location tracker")]
struct Cli {
    /// Path to the SQLite state database (overrides settings).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record an event and dispatch it.
    Record {
        /// Event type, e.g. `chat_sent` or `location_detected`.
        #[arg(long = "type")]
        event_type: String,
        /// JSON object payload.
        #[arg(long)]
        data: Option<String>,
    },
    /// Ask the send-gate about a candidate location.
    Gate {
        #[arg(long)]
        kind: LocationKind,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    /// Show derived locations and the current session.
    State,
    /// Archive the current session now.
    Archive,
    /// List archived sessions.
    Sessions,
    /// Show persisted warn+ logs (requires `logging.logToSqlite`).
    Logs {
        #[arg(long)]
        level: Option<String>,
        /// Only rows logged inside this session.
        #[arg(long)]
        session: Option<String>,
        /// Only rows about this event type, e.g. `chat_sent`.
        #[arg(long)]
        event_type: Option<String>,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = waypoint_settings::load_settings().context("Failed to load settings")?;
    let telemetry = init_logging(&settings);

    let db_path = cli
        .db_path
        .clone()
        .unwrap_or_else(|| waypoint_settings::resolve_path(&settings.storage.database_path));
    ensure_parent_dir(&db_path)?;
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    tracing::debug!(path = %db_path.display(), "database opened");

    let tracker = SessionTracker::load(
        Arc::new(SqliteKvStore::new(db)),
        EventDispatcher::new(Arc::new(StdoutTransport)),
        TrackerConfig::from(&settings),
    );
    let handle = TrackerHandle::spawn(tracker);

    match cli.command {
        Command::Record { event_type, data } => record(&handle, &event_type, data.as_deref()).await,
        Command::Gate { kind, lat, lng } => gate(&handle, kind, lat, lng).await,
        Command::State => state(&handle).await,
        Command::Archive => {
            match handle.archive_now().await? {
                Some(id) => println!("archived session {id}"),
                None => println!("current session is empty, nothing archived"),
            }
            Ok(())
        }
        Command::Sessions => sessions(&handle).await,
        Command::Logs {
            level,
            session,
            event_type,
            limit,
        } => logs(
            &telemetry,
            LogQuery {
                level,
                session_id: session,
                event_type,
                since: None,
                limit: Some(limit),
            },
        ),
    }
}

fn init_logging(settings: &WaypointSettings) -> TelemetryGuard {
    waypoint_telemetry::init_telemetry(TelemetryConfig {
        log_level: TelemetryConfig::parse_level(&settings.logging.level),
        module_levels: Vec::new(),
        json: settings.logging.json,
        log_to_sqlite: settings.logging.log_to_sqlite,
        log_db_path: waypoint_settings::resolve_path(&settings.logging.log_database_path),
    })
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

async fn record(handle: &TrackerHandle, event_type: &str, data: Option<&str>) -> Result<()> {
    let data: Map<String, Value> = match data {
        Some(raw) => serde_json::from_str(raw).context("--data must be a JSON object")?,
        None => Map::new(),
    };
    let outcome = handle
        .record(Event::new(EventType::from(event_type), data), Utc::now())
        .await?;

    if let Some(id) = &outcome.archived {
        println!("previous session {id} expired and was archived");
    }
    let summary = match outcome.dispatch {
        DispatchOutcome::Streaming(mut stream) => {
            let mut chunks = 0usize;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                chunks += 1;
                if chunk.is_terminal() {
                    break;
                }
            }
            json!({"dispatch": "streamed", "chunks": chunks})
        }
        DispatchOutcome::Drained { chunks } => json!({"dispatch": "drained", "chunks": chunks}),
        DispatchOutcome::Recorded => json!({"dispatch": "recorded"}),
        DispatchOutcome::Dropped => json!({"dispatch": "dropped"}),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({"event": outcome.event, "outcome": summary}))?
    );
    Ok(())
}

async fn gate(handle: &TrackerHandle, kind: LocationKind, lat: f64, lng: f64) -> Result<()> {
    let candidate = Location::from_coordinate(Coordinate::new(lat, lng));
    let decision = handle.decide_location(candidate, kind, Utc::now()).await?;
    let mut out = json!({"kind": kind, "decision": decision, "should_send": decision.should_send()});
    if decision == waypoint_engine::SendDecision::ResendSameLocationNewTime {
        out["resend_location"] = serde_json::to_value(handle.resend_location().await?)?;
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn state(handle: &TrackerHandle) -> Result<()> {
    let derived = handle.derived().await?;
    let last_send = handle.last_device_send_time().await?;
    let snapshot = handle.snapshot().await?;
    let current = snapshot.current_session();
    let out = json!({
        "derived": derived,
        "last_device_send_time": last_send,
        "current_session": waypoint_engine::SessionMetadata::from_session(current),
        "current_events": current.len(),
        "archived_sessions": snapshot.archived_sessions().len(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn sessions(handle: &TrackerHandle) -> Result<()> {
    let snapshot = handle.snapshot().await?;
    if snapshot.archived_sessions().is_empty() {
        println!("no archived sessions");
        return Ok(());
    }
    for (id, session) in snapshot.archived_sessions() {
        let started = session
            .started_at
            .map(waypoint_core::time::format_timestamp)
            .unwrap_or_else(|| "-".to_string());
        println!("{id}  started {started}  {} events", session.len());
    }
    Ok(())
}

fn logs(telemetry: &TelemetryGuard, query: LogQuery) -> Result<()> {
    let Some(sink) = telemetry.logs() else {
        println!("SQLite logging is disabled (set logging.logToSqlite or WAYPOINT_LOG_TO_SQLITE)");
        return Ok(());
    };
    for r in sink.query(&query)? {
        let context = [
            ("session", &r.session_id),
            ("type", &r.event_type),
            ("endpoint", &r.endpoint),
            ("key", &r.store_key),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!(" {label}={v}")))
        .collect::<String>();
        println!(
            "{} {:5} {}{}{}",
            r.logged_at,
            r.level,
            r.message,
            context,
            r.extra.map(|f| format!(" {f}")).unwrap_or_default()
        );
    }
    Ok(())
}
