use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

use super::ids::{GroupId, UserId};
use super::{ParseEnumError, normalize};

/// The role a member holds inside one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Responsible,
    Assistant,
    Student,
}

impl GroupRole {
    pub const ALL: [Self; 3] = [Self::Responsible, Self::Assistant, Self::Student];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Responsible => "responsible",
            Self::Assistant => "assistant",
            Self::Student => "student",
        }
    }
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "responsible" => Ok(Self::Responsible),
            "assistant" => Ok(Self::Assistant),
            "student" => Ok(Self::Student),
            _ => Err(ParseEnumError {
                expected: "group role",
                got: s.to_string(),
            }),
        }
    }
}

/// A group of students working cases under a responsible instructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: GroupId,
    pub name: String,
    pub description: String,
    pub active: bool,
    /// Incremented once per committed roster change.
    pub roster_version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored membership row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: i64,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
    pub role_since: DateTime<Utc>,
}

/// A group's membership partitioned by role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub group_id: GroupId,
    pub version: u64,
    pub responsible: Option<UserId>,
    pub assistants: BTreeSet<UserId>,
    pub students: BTreeSet<UserId>,
}

impl Roster {
    /// Partition stored rows. Rows belonging to other groups are ignored.
    #[must_use]
    pub fn from_members(group_id: GroupId, version: u64, members: &[Member]) -> Self {
        let mut roster = Self {
            group_id,
            version,
            responsible: None,
            assistants: BTreeSet::new(),
            students: BTreeSet::new(),
        };
        for member in members.iter().filter(|m| m.group_id == group_id) {
            match member.role {
                GroupRole::Responsible => roster.responsible = Some(member.user_id.clone()),
                GroupRole::Assistant => {
                    roster.assistants.insert(member.user_id.clone());
                }
                GroupRole::Student => {
                    roster.students.insert(member.user_id.clone());
                }
            }
        }
        roster
    }

    #[must_use]
    pub fn role_of(&self, user: &UserId) -> Option<GroupRole> {
        if self.responsible.as_ref() == Some(user) {
            Some(GroupRole::Responsible)
        } else if self.assistants.contains(user) {
            Some(GroupRole::Assistant)
        } else if self.students.contains(user) {
            Some(GroupRole::Student)
        } else {
            None
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.responsible.is_some()) + self.assistants.len() + self.students.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The membership a caller wants a group to end up with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredRoster {
    pub responsible: UserId,
    #[serde(default)]
    pub assistants: BTreeSet<UserId>,
    #[serde(default)]
    pub students: BTreeSet<UserId>,
    /// When set, the reconciliation fails with a concurrent-modification
    /// error unless the stored roster version still matches.
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl DesiredRoster {
    pub fn new(responsible: impl Into<UserId>) -> Self {
        Self {
            responsible: responsible.into(),
            assistants: BTreeSet::new(),
            students: BTreeSet::new(),
            expected_version: None,
        }
    }

    #[must_use]
    pub fn with_assistants<I, U>(mut self, assistants: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        self.assistants = assistants.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_students<I, U>(mut self, students: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        self.students = students.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn expecting_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Input for creating a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub responsible: UserId,
}

#[cfg(test)]
mod tests {
    use super::{DesiredRoster, GroupRole, Member, Roster};
    use crate::model::ids::{GroupId, UserId};
    use chrono::Utc;
    use std::str::FromStr;

    fn member(group: i64, user: &str, role: GroupRole) -> Member {
        Member {
            member_id: 0,
            group_id: GroupId(group),
            user_id: UserId::new(user),
            role,
            joined_at: Utc::now(),
            role_since: Utc::now(),
        }
    }

    #[test]
    fn group_role_parse_roundtrips() {
        for role in GroupRole::ALL {
            assert_eq!(GroupRole::from_str(&role.to_string()).unwrap(), role);
        }
        assert_eq!(
            GroupRole::from_str(" Assistant ").unwrap(),
            GroupRole::Assistant
        );
        assert!(GroupRole::from_str("monitor").is_err());
    }

    #[test]
    fn roster_partitions_members_by_role() {
        let rows = [
            member(1, "u1", GroupRole::Responsible),
            member(1, "u2", GroupRole::Assistant),
            member(1, "s1", GroupRole::Student),
            member(1, "s2", GroupRole::Student),
            member(2, "s9", GroupRole::Student),
        ];
        let roster = Roster::from_members(GroupId(1), 4, &rows);

        assert_eq!(roster.responsible, Some(UserId::new("u1")));
        assert_eq!(roster.assistants.len(), 1);
        assert_eq!(roster.students.len(), 2);
        assert_eq!(roster.len(), 4);
        assert_eq!(roster.role_of(&UserId::new("s2")), Some(GroupRole::Student));
        assert_eq!(roster.role_of(&UserId::new("s9")), None);
    }

    #[test]
    fn desired_roster_deserializes_with_defaults() {
        let desired: DesiredRoster =
            serde_json::from_str(r#"{"responsible":"u1","students":["s1"]}"#).unwrap();
        assert_eq!(desired, DesiredRoster::new("u1").with_students(["s1"]));
        assert!(desired.expected_version.is_none());
    }
}
