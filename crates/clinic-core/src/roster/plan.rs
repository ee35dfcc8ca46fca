//! Pure roster diffing: validate a desired roster and compute the ordered row
//! changes that turn the current roster into it.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ClinicError, ClinicResult};
use crate::model::group::{DesiredRoster, GroupRole, Roster};
use crate::model::ids::UserId;

/// A desired roster after validation, with the responsible id removed from
/// both member sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRoster {
    pub responsible: UserId,
    pub assistants: BTreeSet<UserId>,
    pub students: BTreeSet<UserId>,
}

impl TargetRoster {
    /// Validate and normalize `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`ClinicError::InvalidRoster`] for a blank responsible, a blank
    /// member id, or an id listed as both assistant and student.
    pub fn from_desired(desired: &DesiredRoster) -> ClinicResult<Self> {
        let responsible = UserId::new(desired.responsible.as_str());
        if responsible.is_blank() {
            return Err(ClinicError::invalid_roster("a responsible member is required"));
        }

        let mut assistants = clean_set(&desired.assistants, "assistant")?;
        let mut students = clean_set(&desired.students, "student")?;
        assistants.remove(&responsible);
        students.remove(&responsible);

        if let Some(both) = assistants.intersection(&students).next() {
            return Err(ClinicError::invalid_roster(format!(
                "'{both}' is listed as both assistant and student"
            )));
        }

        Ok(Self {
            responsible,
            assistants,
            students,
        })
    }

    /// Desired role of `user`, if they should be on the roster.
    #[must_use]
    pub fn role_of(&self, user: &UserId) -> Option<GroupRole> {
        if *user == self.responsible {
            Some(GroupRole::Responsible)
        } else if self.assistants.contains(user) {
            Some(GroupRole::Assistant)
        } else if self.students.contains(user) {
            Some(GroupRole::Student)
        } else {
            None
        }
    }

    /// Every id the roster references, responsible first.
    #[must_use]
    pub fn referenced(&self) -> Vec<&UserId> {
        std::iter::once(&self.responsible)
            .chain(&self.assistants)
            .chain(&self.students)
            .collect()
    }
}

fn clean_set(ids: &BTreeSet<UserId>, role: &str) -> ClinicResult<BTreeSet<UserId>> {
    ids.iter()
        .map(|id| {
            let id = UserId::new(id.as_str());
            if id.is_blank() {
                Err(ClinicError::invalid_roster(format!("blank {role} id")))
            } else {
                Ok(id)
            }
        })
        .collect()
}

/// One row-level change of a roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RosterChange {
    Remove {
        user_id: UserId,
        role: GroupRole,
    },
    /// Role change applied as an in-place update of the member row.
    Retag {
        user_id: UserId,
        from: GroupRole,
        to: GroupRole,
    },
    Insert {
        user_id: UserId,
        role: GroupRole,
    },
}

impl RosterChange {
    /// Position in the apply order: removals, demotions from responsible,
    /// other re-tags, promotion to responsible, inserts. Only this order
    /// keeps the one-responsible and one-student-group indexes satisfied
    /// after every statement.
    const fn apply_rank(&self) -> u8 {
        match self {
            Self::Remove { .. } => 0,
            Self::Retag {
                from: GroupRole::Responsible,
                ..
            } => 1,
            Self::Retag {
                to: GroupRole::Responsible,
                ..
            } => 3,
            Self::Retag { .. } => 2,
            Self::Insert { .. } => 4,
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        match self {
            Self::Remove { user_id, .. }
            | Self::Retag { user_id, .. }
            | Self::Insert { user_id, .. } => user_id,
        }
    }
}

/// Ordered changes for one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RosterPlan {
    pub changes: Vec<RosterChange>,
}

impl RosterPlan {
    /// Diff `current` against `target`.
    ///
    /// Each user ends up with exactly one change at most: a user on both
    /// sides with different roles is re-tagged, never removed and inserted.
    #[must_use]
    pub fn diff(current: &Roster, target: &TargetRoster) -> Self {
        let mut roles: BTreeMap<&UserId, (Option<GroupRole>, Option<GroupRole>)> =
            BTreeMap::new();

        for user in current
            .responsible
            .iter()
            .chain(&current.assistants)
            .chain(&current.students)
        {
            roles.entry(user).or_default().0 = current.role_of(user);
        }
        for user in target.referenced() {
            roles.entry(user).or_default().1 = target.role_of(user);
        }

        let mut changes: Vec<RosterChange> = roles
            .into_iter()
            .filter_map(|(user, roles)| {
                let user_id = user.clone();
                match roles {
                    (Some(role), None) => Some(RosterChange::Remove { user_id, role }),
                    (None, Some(role)) => Some(RosterChange::Insert { user_id, role }),
                    (Some(from), Some(to)) if from != to => {
                        Some(RosterChange::Retag { user_id, from, to })
                    }
                    _ => None,
                }
            })
            .collect();

        changes.sort_by_key(RosterChange::apply_rank);
        Self { changes }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Users who will hold a student row in this group but do not today.
    pub fn incoming_students(&self) -> impl Iterator<Item = &UserId> {
        self.changes.iter().filter_map(|change| match change {
            RosterChange::Insert {
                user_id,
                role: GroupRole::Student,
            }
            | RosterChange::Retag {
                user_id,
                to: GroupRole::Student,
                ..
            } => Some(user_id),
            _ => None,
        })
    }
}
