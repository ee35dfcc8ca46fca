use std::fmt;

use crate::model::case::{CaseState, IllegalTransition};
use crate::model::ids::{CaseId, ConsultantId, GroupId, UserId};

/// Machine-readable error codes for UI and CLI decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidRoster,
    StudentAlreadyAssigned,
    MemberNotFound,
    ConcurrentModification,
    IllegalTransition,
    ReasonRequired,
    Forbidden,
    GroupNotFound,
    GroupNameTaken,
    InvalidGroup,
    GroupHasOpenCases,
    CaseNotFound,
    InvalidCase,
    FolderNumberTaken,
    ConsultantNotFound,
    StorageUnavailable,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidRoster => "E1001",
            Self::StudentAlreadyAssigned => "E1002",
            Self::MemberNotFound => "E1003",
            Self::ConcurrentModification => "E1004",
            Self::IllegalTransition => "E2001",
            Self::ReasonRequired => "E2002",
            Self::Forbidden => "E2003",
            Self::GroupNotFound => "E3001",
            Self::GroupNameTaken => "E3002",
            Self::InvalidGroup => "E3003",
            Self::GroupHasOpenCases => "E3004",
            Self::CaseNotFound => "E3101",
            Self::InvalidCase => "E3102",
            Self::FolderNumberTaken => "E3103",
            Self::ConsultantNotFound => "E3104",
            Self::StorageUnavailable => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidRoster => "Invalid roster",
            Self::StudentAlreadyAssigned => "Student already assigned to another group",
            Self::MemberNotFound => "Member not found",
            Self::ConcurrentModification => "Concurrent modification",
            Self::IllegalTransition => "Illegal case state transition",
            Self::ReasonRequired => "Reason required",
            Self::Forbidden => "Forbidden",
            Self::GroupNotFound => "Group not found",
            Self::GroupNameTaken => "Group name already in use",
            Self::InvalidGroup => "Invalid group",
            Self::GroupHasOpenCases => "Group has open cases",
            Self::CaseNotFound => "Case not found",
            Self::InvalidCase => "Invalid case",
            Self::FolderNumberTaken => "Folder number already assigned",
            Self::ConsultantNotFound => "Consultant not found",
            Self::StorageUnavailable => "Storage unavailable",
        }
    }

    /// Optional remediation hint that can be surfaced to the UI layer.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidRoster => Some(
                "Name exactly one responsible member and list each other member under one role.",
            ),
            Self::StudentAlreadyAssigned => {
                Some("Remove the student from their current group first.")
            }
            Self::MemberNotFound => Some("Register the user before adding them to a group."),
            Self::ConcurrentModification => {
                Some("Reload the group and submit the roster again.")
            }
            Self::IllegalTransition => Some(
                "Follow valid transitions: pending -> active -> closed; withdrawn and closed reopen to active.",
            ),
            Self::ReasonRequired => Some("Provide a reason for this state change."),
            Self::Forbidden
            | Self::GroupNotFound
            | Self::CaseNotFound
            | Self::ConsultantNotFound
            | Self::InvalidGroup
            | Self::InvalidCase => None,
            Self::GroupNameTaken => Some("Choose a different group name."),
            Self::GroupHasOpenCases => {
                Some("Close, withdraw or delete the group's open cases first.")
            }
            Self::FolderNumberTaken => Some("Folder numbers are unique; use the next free number."),
            Self::StorageUnavailable => Some("Retry once. If persistent, check the database file."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Every failure a core operation can report.
///
/// Validation variants are local and non-retryable; the caller must correct
/// the input. `ConcurrentModification` and `StorageUnavailable` may succeed
/// on a later attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClinicError {
    #[error("invalid roster: {reason}")]
    InvalidRoster { reason: String },

    #[error("student {user_id} already belongs to group {group_id}")]
    StudentAlreadyAssigned { user_id: UserId, group_id: GroupId },

    #[error("no user with id '{user_id}'")]
    MemberNotFound { user_id: UserId },

    #[error("{entity} was modified concurrently: {detail}")]
    ConcurrentModification { entity: String, detail: String },

    #[error("cannot move a case from {from} to {to}")]
    IllegalTransition { from: CaseState, to: CaseState },

    #[error("a reason is required to move a case from {from} to {to}")]
    ReasonRequired { from: CaseState, to: CaseState },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("group {group_id} not found")]
    GroupNotFound { group_id: GroupId },

    #[error("group name '{name}' is already in use")]
    GroupNameTaken { name: String },

    #[error("invalid group: {reason}")]
    InvalidGroup { reason: String },

    #[error("group {group_id} still has {open} open case(s)")]
    GroupHasOpenCases { group_id: GroupId, open: u64 },

    #[error("case {case_id} not found")]
    CaseNotFound { case_id: CaseId },

    #[error("invalid case: {reason}")]
    InvalidCase { reason: String },

    #[error("folder number '{folder_number}' is already assigned")]
    FolderNumberTaken { folder_number: String },

    #[error("consultant {consultant_id} not found")]
    ConsultantNotFound { consultant_id: ConsultantId },

    #[error("storage unavailable: {detail}")]
    StorageUnavailable { detail: String },
}

impl ClinicError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRoster { .. } => ErrorCode::InvalidRoster,
            Self::StudentAlreadyAssigned { .. } => ErrorCode::StudentAlreadyAssigned,
            Self::MemberNotFound { .. } => ErrorCode::MemberNotFound,
            Self::ConcurrentModification { .. } => ErrorCode::ConcurrentModification,
            Self::IllegalTransition { .. } => ErrorCode::IllegalTransition,
            Self::ReasonRequired { .. } => ErrorCode::ReasonRequired,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::GroupNotFound { .. } => ErrorCode::GroupNotFound,
            Self::GroupNameTaken { .. } => ErrorCode::GroupNameTaken,
            Self::InvalidGroup { .. } => ErrorCode::InvalidGroup,
            Self::GroupHasOpenCases { .. } => ErrorCode::GroupHasOpenCases,
            Self::CaseNotFound { .. } => ErrorCode::CaseNotFound,
            Self::InvalidCase { .. } => ErrorCode::InvalidCase,
            Self::FolderNumberTaken { .. } => ErrorCode::FolderNumberTaken,
            Self::ConsultantNotFound { .. } => ErrorCode::ConsultantNotFound,
            Self::StorageUnavailable { .. } => ErrorCode::StorageUnavailable,
        }
    }

    /// Optional remediation hint for the UI layer.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Whether the caller may reasonably resubmit the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification { .. } | Self::StorageUnavailable { .. }
        )
    }

    pub(crate) fn invalid_roster(reason: impl Into<String>) -> Self {
        Self::InvalidRoster {
            reason: reason.into(),
        }
    }

    pub(crate) fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }
}

impl From<IllegalTransition> for ClinicError {
    fn from(err: IllegalTransition) -> Self {
        Self::IllegalTransition {
            from: err.from,
            to: err.to,
        }
    }
}

pub type ClinicResult<T> = Result<T, ClinicError>;
