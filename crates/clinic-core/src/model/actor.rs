//! Explicit actor context passed into every mutating core call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fmt, str::FromStr};

use super::group::GroupRole;
use super::ids::{GroupId, UserId};
use super::{ParseEnumError, normalize};

/// System-wide role resolved by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemRole {
    Administrator,
    Instructor,
    Student,
}

impl SystemRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Instructor => "instructor",
            Self::Student => "student",
        }
    }
}

impl fmt::Display for SystemRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "administrator" | "admin" => Ok(Self::Administrator),
            "instructor" => Ok(Self::Instructor),
            "student" => Ok(Self::Student),
            _ => Err(ParseEnumError {
                expected: "system role",
                got: s.to_string(),
            }),
        }
    }
}

/// A person known to the clinic, as the identity collaborator registered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub display_name: String,
    pub role: SystemRole,
    pub active: bool,
}

impl User {
    pub fn new(user_id: impl Into<UserId>, display_name: impl Into<String>, role: SystemRole) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role,
            active: true,
        }
    }
}

/// Who is asking, with the memberships the identity collaborator resolved.
///
/// The core trusts this value; it does not re-derive memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: UserId,
    pub role: SystemRole,
    #[serde(default)]
    pub memberships: BTreeMap<GroupId, GroupRole>,
}

impl ActorContext {
    pub fn new(user_id: impl Into<UserId>, role: SystemRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            memberships: BTreeMap::new(),
        }
    }

    pub fn administrator(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, SystemRole::Administrator)
    }

    #[must_use]
    pub fn with_membership(mut self, group_id: GroupId, role: GroupRole) -> Self {
        self.memberships.insert(group_id, role);
        self
    }

    #[must_use]
    pub const fn is_administrator(&self) -> bool {
        matches!(self.role, SystemRole::Administrator)
    }

    #[must_use]
    pub fn membership(&self, group_id: GroupId) -> Option<GroupRole> {
        self.memberships.get(&group_id).copied()
    }

    #[must_use]
    pub fn is_member_of(&self, group_id: GroupId) -> bool {
        self.memberships.contains_key(&group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{ActorContext, SystemRole};
    use crate::model::group::GroupRole;
    use crate::model::ids::GroupId;
    use std::str::FromStr;

    #[test]
    fn memberships_are_looked_up_per_group() {
        let actor = ActorContext::new("inst.lopez", SystemRole::Instructor)
            .with_membership(GroupId(4), GroupRole::Responsible);

        assert!(!actor.is_administrator());
        assert!(actor.is_member_of(GroupId(4)));
        assert_eq!(actor.membership(GroupId(4)), Some(GroupRole::Responsible));
        assert_eq!(actor.membership(GroupId(5)), None);
    }

    #[test]
    fn system_role_accepts_admin_alias() {
        assert_eq!(
            SystemRole::from_str("admin").unwrap(),
            SystemRole::Administrator
        );
        assert!(SystemRole::from_str("dean").is_err());
    }
}
