//! Domain events emitted after a core mutation commits.
//!
//! Events are fire-and-forget from the core's point of view: a sink that
//! fails is logged and ignored, and the already-committed transaction stays
//! committed. Each successful mutation emits exactly one event; no-op
//! requests emit none.

pub mod sinks;

pub use sinks::{AuditEntry, AuditLogSink, FanoutSink, RecordingSink, TracingSink, list_audit};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

use crate::model::case::{Case, CaseState};
use crate::model::group::Group;
use crate::model::ids::{CaseId, GroupId, UserId};

/// The kinds of event the core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A reconciliation changed at least one roster row.
    RosterChanged,
    /// A case moved to a different state.
    CaseStateChanged,
    GroupCreated,
    GroupDeactivated,
    CaseOpened,
    CaseDeleted,
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind {
    pub raw: String,
}

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event kind '{}': expected one of roster-changed, case-state-changed, \
             group-created, group-deactivated, case-opened, case-deleted",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventKind {}

impl EventKind {
    pub const ALL: [Self; 6] = [
        Self::RosterChanged,
        Self::CaseStateChanged,
        Self::GroupCreated,
        Self::GroupDeactivated,
        Self::CaseOpened,
        Self::CaseDeleted,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RosterChanged => "roster-changed",
            Self::CaseStateChanged => "case-state-changed",
            Self::GroupCreated => "group-created",
            Self::GroupDeactivated => "group-deactivated",
            Self::CaseOpened => "case-opened",
            Self::CaseDeleted => "case-deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind { raw: s.to_string() })
    }
}

// Serialize as the dashed string.
impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// One notification for the audit log and downstream notifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub kind: EventKind,
    /// `grp-<n>` or `case-<n>`.
    pub entity_id: String,
    pub timestamp: DateTime<Utc>,
    /// Kind-specific payload; always includes the acting user.
    pub detail: serde_json::Value,
}

impl DomainEvent {
    pub(crate) fn roster_changed(
        group_id: GroupId,
        version: u64,
        changes: &serde_json::Value,
        actor: &UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EventKind::RosterChanged,
            entity_id: group_id.to_string(),
            timestamp: at,
            detail: json!({
                "actor": actor,
                "roster_version": version,
                "changes": changes,
            }),
        }
    }

    pub(crate) fn case_state_changed(
        case_id: CaseId,
        from: CaseState,
        to: CaseState,
        reason: Option<&str>,
        actor: &UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EventKind::CaseStateChanged,
            entity_id: case_id.to_string(),
            timestamp: at,
            detail: json!({
                "actor": actor,
                "from": from,
                "to": to,
                "reason": reason,
            }),
        }
    }

    pub(crate) fn group_created(group: &Group, responsible: &UserId, actor: &UserId) -> Self {
        Self {
            kind: EventKind::GroupCreated,
            entity_id: group.group_id.to_string(),
            timestamp: group.created_at,
            detail: json!({
                "actor": actor,
                "name": group.name,
                "responsible": responsible,
            }),
        }
    }

    pub(crate) fn group_deactivated(group_id: GroupId, actor: &UserId, at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::GroupDeactivated,
            entity_id: group_id.to_string(),
            timestamp: at,
            detail: json!({ "actor": actor }),
        }
    }

    pub(crate) fn case_opened(case: &Case, actor: &UserId) -> Self {
        Self {
            kind: EventKind::CaseOpened,
            entity_id: case.case_id.to_string(),
            timestamp: case.opened_at,
            detail: json!({
                "actor": actor,
                "group_id": case.group_id,
                "folder_number": case.folder_number,
                "state": case.state,
            }),
        }
    }

    pub(crate) fn case_deleted(case: &Case, actor: &UserId, at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::CaseDeleted,
            entity_id: case.case_id.to_string(),
            timestamp: at,
            detail: json!({
                "actor": actor,
                "group_id": case.group_id,
                "folder_number": case.folder_number,
                "last_state": case.state,
            }),
        }
    }
}

/// Failure reported by an [`EventSink`].
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("audit log write failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("event payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("event sink unavailable: {0}")]
    Unavailable(String),
}

/// Receiver of committed domain events.
pub trait EventSink {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails. The core logs it and moves on.
    fn emit(&self, event: &DomainEvent) -> Result<(), SinkError>;
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &DomainEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Emit `event`, logging a delivery failure instead of returning it.
pub(crate) fn dispatch(sink: &dyn EventSink, event: &DomainEvent) {
    if let Err(error) = sink.emit(event) {
        tracing::warn!(
            kind = %event.kind,
            entity_id = %event.entity_id,
            %error,
            "event sink failed; mutation stays committed"
        );
    }
}
