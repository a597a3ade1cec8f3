//! SQLite sink for warn+ log events.
//!
//! Rows carry the tracker context as columns: the session the event happened
//! in, the event type being recorded, the endpoint of a failed dispatch and
//! the store key of a failed persist. Missing context is filled in from the
//! enclosing spans, innermost first.

use std::path::Path;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const DEFAULT_LIMIT: u32 = 100;

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    CREATE TABLE IF NOT EXISTS tracker_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        logged_at TEXT NOT NULL,
        level TEXT NOT NULL,
        target TEXT NOT NULL,
        message TEXT NOT NULL,
        session_id TEXT,
        event_type TEXT,
        endpoint TEXT,
        store_key TEXT,
        extra TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_tracker_logs_session ON tracker_logs(session_id, id);
    CREATE INDEX IF NOT EXISTS idx_tracker_logs_event_type ON tracker_logs(event_type, id);
";

/// One persisted warn+ log line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub logged_at: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub session_id: Option<String>,
    pub event_type: Option<String>,
    pub endpoint: Option<String>,
    pub store_key: Option<String>,
    /// Remaining fields as a JSON object.
    pub extra: Option<String>,
}

/// Filters for [`SqliteLogSink::query`]. Newest rows come first.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    pub session_id: Option<String>,
    pub event_type: Option<String>,
    /// RFC 3339 lower bound on `logged_at`.
    pub since: Option<String>,
    pub limit: Option<u32>,
}

/// Tracker context lifted out of event and span fields.
#[derive(Clone, Debug, Default, PartialEq)]
struct TrackerContext {
    session_id: Option<String>,
    event_type: Option<String>,
    endpoint: Option<String>,
    store_key: Option<String>,
}

impl TrackerContext {
    /// Keep `value` if `name` is a context field, else hand it back.
    fn absorb(&mut self, name: &str, value: String) -> Option<String> {
        let slot = match name {
            "session_id" => &mut self.session_id,
            "event_type" => &mut self.event_type,
            "endpoint" => &mut self.endpoint,
            "key" => &mut self.store_key,
            _ => return Some(value),
        };
        *slot = Some(value);
        None
    }

    /// Fill unset fields from an enclosing context.
    fn inherit(&mut self, outer: &TrackerContext) {
        for (mine, theirs) in [
            (&mut self.session_id, &outer.session_id),
            (&mut self.event_type, &outer.event_type),
            (&mut self.endpoint, &outer.endpoint),
            (&mut self.store_key, &outer.store_key),
        ] {
            if mine.is_none() {
                mine.clone_from(theirs);
            }
        }
    }
}

pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn write(
        &self,
        level: &str,
        target: &str,
        message: &str,
        context: &TrackerContext,
        extra: Option<String>,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO tracker_logs
                 (logged_at, level, target, message, session_id, event_type, endpoint, store_key, extra)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        stmt.execute(params![
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level,
            target,
            message,
            context.session_id,
            context.event_type,
            context.endpoint,
            context.store_key,
            extra,
        ])?;
        Ok(())
    }

    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRecord>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, logged_at, level, target, message, session_id, event_type, endpoint, store_key, extra
             FROM tracker_logs
             WHERE (?1 IS NULL OR level = ?1)
               AND (?2 IS NULL OR session_id = ?2)
               AND (?3 IS NULL OR event_type = ?3)
               AND (?4 IS NULL OR logged_at >= ?4)
             ORDER BY id DESC
             LIMIT ?5",
        )?;
        let level = q.level.as_deref().map(str::to_uppercase);
        let rows = stmt.query_map(
            params![
                level,
                q.session_id,
                q.event_type,
                q.since,
                q.limit.unwrap_or(DEFAULT_LIMIT),
            ],
            |row| {
                Ok(LogRecord {
                    id: row.get(0)?,
                    logged_at: row.get(1)?,
                    level: row.get(2)?,
                    target: row.get(3)?,
                    message: row.get(4)?,
                    session_id: row.get(5)?,
                    event_type: row.get(6)?,
                    endpoint: row.get(7)?,
                    store_key: row.get(8)?,
                    extra: row.get(9)?,
                })
            },
        )?;
        rows.collect()
    }
}

/// Splits recorded fields into message, tracker context and the rest.
#[derive(Default)]
struct FieldSplitter {
    message: Option<String>,
    context: TrackerContext,
    extra: Map<String, Value>,
}

impl FieldSplitter {
    fn text(&mut self, name: &str, value: String) {
        if name == "message" {
            self.message = Some(value);
        } else if let Some(value) = self.context.absorb(name, value) {
            self.extra.insert(name.to_string(), Value::String(value));
        }
    }

    fn extra_json(&self) -> Option<String> {
        if self.extra.is_empty() {
            None
        } else {
            serde_json::to_string(&self.extra).ok()
        }
    }
}

impl Visit for FieldSplitter {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.text(field.name(), value.to_string());
    }

    // `%display` and `?debug` fields land here
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.text(field.name(), format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.extra.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.extra.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.extra.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.extra.insert(field.name().to_string(), value.into());
    }
}

/// Layer that writes warn+ events to a [`SqliteLogSink`].
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut fields = FieldSplitter::default();
        attrs.record(&mut fields);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(fields.context);
        }
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut fields = FieldSplitter::default();
        values.record(&mut fields);
        let mut extensions = span.extensions_mut();
        if let Some(existing) = extensions.get_mut::<TrackerContext>() {
            let mut updated = fields.context;
            updated.inherit(existing);
            *existing = updated;
            return;
        }
        extensions.insert(fields.context);
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut fields = FieldSplitter::default();
        event.record(&mut fields);
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(outer) = span.extensions().get::<TrackerContext>() {
                    fields.context.inherit(outer);
                }
            }
        }

        let extra = fields.extra_json();
        let result = self.sink.write(
            level.as_str(),
            event.metadata().target(),
            fields.message.as_deref().unwrap_or_default(),
            &fields.context,
            extra,
        );
        if let Err(e) = result {
            // Logging through tracing here would recurse into this layer
            eprintln!("waypoint-telemetry: failed to write log row: {e}");
        }
    }
}
