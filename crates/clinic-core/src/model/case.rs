use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ids::{CaseId, ConsultantId, GroupId, UserId};
use super::{ParseEnumError, normalize};

/// The four lifecycle states of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseState {
    Pending,
    Active,
    Closed,
    Withdrawn,
}

impl CaseState {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Active, Self::Closed, Self::Withdrawn];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Withdrawn => "withdrawn",
        }
    }

    /// Validate whether a transition from self to `target` is allowed.
    ///
    /// Valid transitions:
    /// - `pending -> active`, `pending -> withdrawn`
    /// - `active -> closed`, `active -> pending`, `active -> withdrawn`
    /// - `closed -> active` (reopen), `closed -> withdrawn`
    /// - `withdrawn -> active` (reopen)
    ///
    /// A same-state request is not part of the table; callers treat it as an
    /// idempotent no-op before asking.
    pub fn can_transition_to(self, target: Self) -> Result<(), IllegalTransition> {
        let allowed = matches!(
            (self, target),
            (Self::Pending, Self::Active | Self::Withdrawn)
                | (Self::Active, Self::Closed | Self::Pending | Self::Withdrawn)
                | (Self::Closed, Self::Active | Self::Withdrawn)
                | (Self::Withdrawn, Self::Active)
        );

        if allowed {
            Ok(())
        } else {
            Err(IllegalTransition {
                from: self,
                to: target,
            })
        }
    }

    /// Targets reachable from this state, in table order.
    #[must_use]
    pub fn allowed_targets(self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|target| self.can_transition_to(*target).is_ok())
            .collect()
    }

    /// Whether moving from `from` into this state needs justification text.
    #[must_use]
    pub const fn requires_reason_from(self, from: Self) -> bool {
        matches!(
            (from, self),
            (_, Self::Withdrawn) | (Self::Active, Self::Pending)
        )
    }

    /// Closed and withdrawn cases carry a closure timestamp.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Withdrawn)
    }

    /// Pending and active cases keep their group's roster under obligation.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses canonical names only. Legacy stored spellings are folded in by the
/// store adapter and never reach this parser.
impl FromStr for CaseState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            "withdrawn" => Ok(Self::Withdrawn),
            _ => Err(ParseEnumError {
                expected: "case state",
                got: s.to_string(),
            }),
        }
    }
}

/// Error returned when a state transition is not in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: CaseState,
    pub to: CaseState,
}

/// How a case entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseOrigin {
    /// Promoted from an approved intake record; starts pending.
    Intake,
    /// Opened directly by an administrator; starts active.
    Direct,
}

impl CaseOrigin {
    #[must_use]
    pub const fn initial_state(self) -> CaseState {
        match self {
            Self::Intake => CaseState::Pending,
            Self::Direct => CaseState::Active,
        }
    }
}

impl FromStr for CaseOrigin {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "intake" => Ok(Self::Intake),
            "direct" => Ok(Self::Direct),
            _ => Err(ParseEnumError {
                expected: "case origin",
                got: s.to_string(),
            }),
        }
    }
}

/// A case (tramite) as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: CaseId,
    pub group_id: GroupId,
    pub consultant_id: ConsultantId,
    pub folder_number: String,
    pub state: CaseState,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub observations: String,
    /// Justification attached to the current state: the pending reason,
    /// the closure reason or the withdrawal reason.
    pub state_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Input for opening a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCase {
    pub group_id: GroupId,
    pub consultant_id: ConsultantId,
    pub folder_number: String,
    #[serde(default)]
    pub observations: String,
    pub origin: CaseOrigin,
}

/// One row of a case's state history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseTransition {
    pub case_id: CaseId,
    pub from: CaseState,
    pub to: CaseState,
    pub reason: Option<String>,
    pub actor_id: UserId,
    pub at: DateTime<Utc>,
}

/// A person the clinic advises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consultant {
    pub consultant_id: ConsultantId,
    pub full_name: String,
    pub document: Option<String>,
}
