//! Event sink implementations.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{DomainEvent, EventKind, EventSink, SinkError};
use crate::db;

/// Appends every event to the `audit_log` table.
///
/// Holds its own connection so writes happen outside the (already
/// committed) store transaction.
#[derive(Debug)]
pub struct AuditLogSink {
    conn: Mutex<Connection>,
}

impl AuditLogSink {
    /// Open the audit log of the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path, busy_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self::new(db::open_database(path, busy_timeout)?))
    }

    /// Wrap a migrated connection.
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl EventSink for AuditLogSink {
    fn emit(&self, event: &DomainEvent) -> Result<(), SinkError> {
        let detail = serde_json::to_string(&event.detail)?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| SinkError::Unavailable("audit connection poisoned".into()))?;
        conn.execute(
            "INSERT INTO audit_log (kind, entity_id, detail_json, at_us) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.kind.as_str(),
                event.entity_id,
                detail,
                db::to_micros(event.timestamp),
            ],
        )?;
        Ok(())
    }
}

/// One stored audit row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub entry_id: i64,
    pub kind: EventKind,
    pub entity_id: String,
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Most recent audit entries first, optionally for a single entity.
///
/// # Errors
///
/// Returns an error if the query fails or a stored row cannot be decoded.
pub fn list_audit(
    conn: &Connection,
    entity_id: Option<&str>,
    limit: usize,
) -> Result<Vec<AuditEntry>, SinkError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(
        "SELECT entry_id, kind, entity_id, detail_json, at_us
         FROM audit_log
         WHERE (?1 IS NULL OR entity_id = ?1)
         ORDER BY entry_id DESC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![entity_id, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(entry_id, kind, entity_id, detail, at_us)| {
            Ok(AuditEntry {
                entry_id,
                kind: kind
                    .parse()
                    .map_err(|err| SinkError::Unavailable(format!("audit row {entry_id}: {err}")))?,
                entity_id,
                detail: serde_json::from_str(&detail)?,
                at: db::from_micros("audit_log.at_us", at_us)
                    .map_err(|err| SinkError::Unavailable(err.to_string()))?,
            })
        })
        .collect()
}

/// Writes each event as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &DomainEvent) -> Result<(), SinkError> {
        tracing::info!(
            target: "clinic::events",
            kind = %event.kind,
            entity_id = %event.entity_id,
            at = %event.timestamp,
            detail = %event.detail,
            "domain event"
        );
        Ok(())
    }
}

/// Keeps events in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    #[must_use]
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|event| event.kind).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &DomainEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Delivers each event to several sinks.
///
/// Every sink is tried even if an earlier one fails; the first failure is
/// returned.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &DomainEvent) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(error) = sink.emit(event) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
