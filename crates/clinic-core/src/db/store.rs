//! Transactional store traits and their `SQLite` implementation.
//!
//! Core operations run against a [`Store`] by opening one transaction with
//! [`Store::begin`], reading and writing through the [`RosterStore`] and
//! [`CaseStore`] views of that transaction, and finishing with
//! [`Transaction::commit`]. Dropping an uncommitted transaction rolls it
//! back, so a failed operation never leaves partial writes.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::str::FromStr;
use std::time::Duration;

use super::error::StoreError;
use super::{from_micros, to_micros};
use crate::model::actor::{SystemRole, User};
use crate::model::case::{Case, CaseState, CaseTransition, Consultant, NewCase};
use crate::model::group::{Group, GroupRole, Member, Roster};
use crate::model::ids::{CaseId, ConsultantId, GroupId, UserId};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A unit of work that must be committed explicitly.
pub trait Transaction {
    /// Make every write of this transaction durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; nothing is applied in that case.
    fn commit(self) -> Result<(), StoreError>;
}

/// Group and roster access inside one transaction.
pub trait RosterStore {
    fn group(&self, group_id: GroupId) -> Result<Option<Group>, StoreError>;
    fn group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError>;
    fn members(&self, group_id: GroupId) -> Result<Vec<Member>, StoreError>;
    fn memberships_of(&self, user_id: &UserId) -> Result<Vec<Member>, StoreError>;
    fn user(&self, user_id: &UserId) -> Result<Option<User>, StoreError>;
    /// Ids among `users` with no user record, in input order.
    fn missing_users(&self, users: &[&UserId]) -> Result<Vec<UserId>, StoreError>;
    /// The group in which `user_id` currently holds a student row, if any.
    fn student_placement(&self, user_id: &UserId) -> Result<Option<GroupId>, StoreError>;
    fn count_open_cases(&self, group_id: GroupId) -> Result<u64, StoreError>;

    fn insert_group(
        &self,
        name: &str,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<GroupId, StoreError>;
    fn set_group_active(
        &self,
        group_id: GroupId,
        active: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    fn insert_member(
        &self,
        group_id: GroupId,
        user_id: &UserId,
        role: GroupRole,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError>;
    /// Change the role of an existing row in place.
    fn retag_member(
        &self,
        group_id: GroupId,
        user_id: &UserId,
        role: GroupRole,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    fn remove_member(&self, group_id: GroupId, user_id: &UserId) -> Result<(), StoreError>;
    /// Increment and return the group's roster version.
    fn bump_roster_version(&self, group_id: GroupId, at: DateTime<Utc>)
    -> Result<u64, StoreError>;
}

/// New state data written by a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate<'a> {
    pub state: CaseState,
    pub state_reason: Option<&'a str>,
    pub closed_at: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

/// Case access inside one transaction.
pub trait CaseStore {
    fn case(&self, case_id: CaseId) -> Result<Option<Case>, StoreError>;
    fn case_by_folder(&self, folder_number: &str) -> Result<Option<Case>, StoreError>;
    fn consultant(&self, consultant_id: ConsultantId) -> Result<Option<Consultant>, StoreError>;
    fn transitions(&self, case_id: CaseId) -> Result<Vec<CaseTransition>, StoreError>;

    fn insert_case(
        &self,
        new_case: &NewCase,
        state: CaseState,
        at: DateTime<Utc>,
    ) -> Result<CaseId, StoreError>;
    fn update_case_state(&self, case_id: CaseId, update: &StateUpdate<'_>)
    -> Result<(), StoreError>;
    fn append_transition(&self, transition: &CaseTransition) -> Result<(), StoreError>;
    fn delete_case(&self, case_id: CaseId) -> Result<(), StoreError>;
}

/// A store able to open write transactions.
///
/// Implementations must serialize writers: a second `begin` on the same
/// database either waits for the first transaction or fails with
/// [`StoreError::Busy`].
pub trait Store {
    type Tx<'a>: Transaction + RosterStore + CaseStore
    where
        Self: 'a;

    /// Open a write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Busy`] if the write lock could not be acquired.
    fn begin(&mut self) -> Result<Self::Tx<'_>, StoreError>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

/// `SQLite`-backed store owning one connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating and migrating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &std::path::Path, busy_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self::from_connection(super::open_database(path, busy_timeout)?))
    }

    /// Open a private in-memory store with the full schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self::from_connection(super::open_in_memory()?))
    }

    /// Wrap an already configured and migrated connection.
    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Register a user. Identity management proper lives outside the core.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken or the insert fails.
    pub fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO users (user_id, display_name, system_role, active, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.user_id.as_str(),
                user.display_name,
                user.role.as_str(),
                user.active,
                to_micros(Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Register a consultant and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_consultant(
        &self,
        full_name: &str,
        document: Option<&str>,
    ) -> Result<ConsultantId, StoreError> {
        self.conn.execute(
            "INSERT INTO consultants (full_name, document, created_at_us) VALUES (?1, ?2, ?3)",
            params![full_name.trim(), document, to_micros(Utc::now())],
        )?;
        Ok(ConsultantId(self.conn.last_insert_rowid()))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn user(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        sql::user(&self.conn, user_id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn group(&self, group_id: GroupId) -> Result<Option<Group>, StoreError> {
        sql::group(&self.conn, group_id)
    }

    /// All groups, active first, then by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        sql::list_groups(&self.conn)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn members(&self, group_id: GroupId) -> Result<Vec<Member>, StoreError> {
        sql::members(&self.conn, group_id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn memberships_of(&self, user_id: &UserId) -> Result<Vec<Member>, StoreError> {
        sql::memberships_of(&self.conn, user_id)
    }

    /// The group's roster, or `None` for an unknown group.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn roster(&self, group_id: GroupId) -> Result<Option<Roster>, StoreError> {
        let Some(group) = sql::group(&self.conn, group_id)? else {
            return Ok(None);
        };
        let members = sql::members(&self.conn, group_id)?;
        Ok(Some(Roster::from_members(
            group_id,
            group.roster_version,
            &members,
        )))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn case(&self, case_id: CaseId) -> Result<Option<Case>, StoreError> {
        sql::case(&self.conn, case_id)
    }

    /// Cases, optionally restricted to one group, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_cases(&self, group_id: Option<GroupId>) -> Result<Vec<Case>, StoreError> {
        sql::list_cases(&self.conn, group_id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn case_history(&self, case_id: CaseId) -> Result<Vec<CaseTransition>, StoreError> {
        sql::transitions(&self.conn, case_id)
    }
}

impl Store for SqliteStore {
    type Tx<'a> = SqliteTx<'a>;

    fn begin(&mut self) -> Result<SqliteTx<'_>, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(SqliteTx { tx })
    }
}

/// An open `BEGIN IMMEDIATE` transaction on a [`SqliteStore`].
pub struct SqliteTx<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

impl Transaction for SqliteTx<'_> {
    fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }
}

impl RosterStore for SqliteTx<'_> {
    fn group(&self, group_id: GroupId) -> Result<Option<Group>, StoreError> {
        sql::group(&self.tx, group_id)
    }

    fn group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        sql::group_by_name(&self.tx, name)
    }

    fn members(&self, group_id: GroupId) -> Result<Vec<Member>, StoreError> {
        sql::members(&self.tx, group_id)
    }

    fn memberships_of(&self, user_id: &UserId) -> Result<Vec<Member>, StoreError> {
        sql::memberships_of(&self.tx, user_id)
    }

    fn user(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        sql::user(&self.tx, user_id)
    }

    fn missing_users(&self, users: &[&UserId]) -> Result<Vec<UserId>, StoreError> {
        let mut stmt = self
            .tx
            .prepare_cached("SELECT EXISTS(SELECT 1 FROM users WHERE user_id = ?1)")?;
        let mut missing = Vec::new();
        for user in users {
            let exists: bool = stmt.query_row([user.as_str()], |row| row.get(0))?;
            if !exists {
                missing.push((*user).clone());
            }
        }
        Ok(missing)
    }

    fn student_placement(&self, user_id: &UserId) -> Result<Option<GroupId>, StoreError> {
        let group = self
            .tx
            .query_row(
                "SELECT group_id FROM group_members WHERE user_id = ?1 AND role = 'student'",
                [user_id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(group.map(GroupId))
    }

    fn count_open_cases(&self, group_id: GroupId) -> Result<u64, StoreError> {
        let open: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM cases
             WHERE group_id = ?1
               AND state IN ('pending', 'active', 'en_tramite', 'iniciado')",
            [group_id.get()],
            |row| row.get(0),
        )?;
        u64::try_from(open).map_err(|_| StoreError::corrupt("cases.count", open.to_string()))
    }

    fn insert_group(
        &self,
        name: &str,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<GroupId, StoreError> {
        self.tx.execute(
            "INSERT INTO clinic_groups (name, description, active, roster_version,
                                        created_at_us, updated_at_us)
             VALUES (?1, ?2, 1, 0, ?3, ?3)",
            params![name, description, to_micros(at)],
        )?;
        Ok(GroupId(self.tx.last_insert_rowid()))
    }

    fn set_group_active(
        &self,
        group_id: GroupId,
        active: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE clinic_groups SET active = ?2, updated_at_us = ?3 WHERE group_id = ?1",
            params![group_id.get(), active, to_micros(at)],
        )?;
        Ok(())
    }

    fn insert_member(
        &self,
        group_id: GroupId,
        user_id: &UserId,
        role: GroupRole,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let at_us = to_micros(at);
        self.tx.execute(
            "INSERT INTO group_members (group_id, user_id, role, joined_at_us, role_since_us)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![group_id.get(), user_id.as_str(), role.as_str(), at_us],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    fn retag_member(
        &self,
        group_id: GroupId,
        user_id: &UserId,
        role: GroupRole,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let changed = self.tx.execute(
            "UPDATE group_members SET role = ?3, role_since_us = ?4
             WHERE group_id = ?1 AND user_id = ?2",
            params![group_id.get(), user_id.as_str(), role.as_str(), to_micros(at)],
        )?;
        if changed == 1 {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                detail: format!("no roster row for {user_id} in {group_id} to re-tag"),
            })
        }
    }

    fn remove_member(&self, group_id: GroupId, user_id: &UserId) -> Result<(), StoreError> {
        self.tx.execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id.get(), user_id.as_str()],
        )?;
        Ok(())
    }

    fn bump_roster_version(
        &self,
        group_id: GroupId,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.tx.execute(
            "UPDATE clinic_groups
             SET roster_version = roster_version + 1, updated_at_us = ?2
             WHERE group_id = ?1",
            params![group_id.get(), to_micros(at)],
        )?;
        let version: i64 = self.tx.query_row(
            "SELECT roster_version FROM clinic_groups WHERE group_id = ?1",
            [group_id.get()],
            |row| row.get(0),
        )?;
        u64::try_from(version)
            .map_err(|_| StoreError::corrupt("clinic_groups.roster_version", version.to_string()))
    }
}

impl CaseStore for SqliteTx<'_> {
    fn case(&self, case_id: CaseId) -> Result<Option<Case>, StoreError> {
        sql::case(&self.tx, case_id)
    }

    fn case_by_folder(&self, folder_number: &str) -> Result<Option<Case>, StoreError> {
        let row = self
            .tx
            .query_row(
                &format!(
                    "SELECT {} FROM cases WHERE folder_number = ?1",
                    sql::CASE_COLUMNS
                ),
                [folder_number],
                sql::CaseRow::from_row,
            )
            .optional()?;
        row.map(sql::CaseRow::into_case).transpose()
    }

    fn consultant(&self, consultant_id: ConsultantId) -> Result<Option<Consultant>, StoreError> {
        let consultant = self
            .tx
            .query_row(
                "SELECT consultant_id, full_name, document FROM consultants
                 WHERE consultant_id = ?1",
                [consultant_id.get()],
                |row| {
                    Ok(Consultant {
                        consultant_id: ConsultantId(row.get(0)?),
                        full_name: row.get(1)?,
                        document: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(consultant)
    }

    fn transitions(&self, case_id: CaseId) -> Result<Vec<CaseTransition>, StoreError> {
        sql::transitions(&self.tx, case_id)
    }

    fn insert_case(
        &self,
        new_case: &NewCase,
        state: CaseState,
        at: DateTime<Utc>,
    ) -> Result<CaseId, StoreError> {
        let at_us = to_micros(at);
        self.tx.execute(
            "INSERT INTO cases (group_id, consultant_id, folder_number, state,
                                opened_at_us, closed_at_us, observations,
                                state_reason, updated_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, NULL, ?5)",
            params![
                new_case.group_id.get(),
                new_case.consultant_id.get(),
                new_case.folder_number.trim(),
                state.as_str(),
                at_us,
                new_case.observations,
            ],
        )?;
        Ok(CaseId(self.tx.last_insert_rowid()))
    }

    fn update_case_state(
        &self,
        case_id: CaseId,
        update: &StateUpdate<'_>,
    ) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE cases
             SET state = ?2, state_reason = ?3, closed_at_us = ?4, updated_at_us = ?5
             WHERE case_id = ?1",
            params![
                case_id.get(),
                update.state.as_str(),
                update.state_reason,
                update.closed_at.map(to_micros),
                to_micros(update.at),
            ],
        )?;
        Ok(())
    }

    fn append_transition(&self, transition: &CaseTransition) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO case_transitions (case_id, from_state, to_state, reason, actor_id, at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                transition.case_id.get(),
                transition.from.as_str(),
                transition.to.as_str(),
                transition.reason,
                transition.actor_id.as_str(),
                to_micros(transition.at),
            ],
        )?;
        Ok(())
    }

    fn delete_case(&self, case_id: CaseId) -> Result<(), StoreError> {
        self.tx
            .execute("DELETE FROM cases WHERE case_id = ?1", [case_id.get()])?;
        Ok(())
    }
}

/// Map a stored state string to the canonical state.
///
/// `en_tramite` and `iniciado` are legacy spellings of `active`.
pub(crate) fn decode_case_state(raw: &str) -> Result<CaseState, StoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "en_tramite" | "iniciado" => Ok(CaseState::Active),
        other => CaseState::from_str(other).map_err(|_| StoreError::corrupt("cases.state", raw)),
    }
}

// ---------------------------------------------------------------------------
// Shared queries
// ---------------------------------------------------------------------------

mod sql {
    use super::{
        Case, CaseId, CaseTransition, Connection, ConsultantId, FromStr, Group, GroupId,
        GroupRole, Member, OptionalExtension, Row, StoreError, SystemRole, User, UserId,
        decode_case_state, from_micros,
    };
    const GROUP_COLUMNS: &str =
        "group_id, name, description, active, roster_version, created_at_us, updated_at_us";
    const MEMBER_COLUMNS: &str =
        "member_id, group_id, user_id, role, joined_at_us, role_since_us";
    pub(super) const CASE_COLUMNS: &str = "case_id, group_id, consultant_id, folder_number, \
         state, opened_at_us, closed_at_us, observations, state_reason, updated_at_us";

    struct GroupRow {
        group_id: i64,
        name: String,
        description: String,
        active: bool,
        roster_version: i64,
        created_at_us: i64,
        updated_at_us: i64,
    }

    impl GroupRow {
        fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                group_id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                active: row.get(3)?,
                roster_version: row.get(4)?,
                created_at_us: row.get(5)?,
                updated_at_us: row.get(6)?,
            })
        }

        fn into_group(self) -> Result<Group, StoreError> {
            Ok(Group {
                group_id: GroupId(self.group_id),
                name: self.name,
                description: self.description,
                active: self.active,
                roster_version: u64::try_from(self.roster_version).map_err(|_| {
                    StoreError::corrupt(
                        "clinic_groups.roster_version",
                        self.roster_version.to_string(),
                    )
                })?,
                created_at: from_micros("clinic_groups.created_at_us", self.created_at_us)?,
                updated_at: from_micros("clinic_groups.updated_at_us", self.updated_at_us)?,
            })
        }
    }

    struct MemberRow {
        member_id: i64,
        group_id: i64,
        user_id: String,
        role: String,
        joined_at_us: i64,
        role_since_us: i64,
    }

    impl MemberRow {
        fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                member_id: row.get(0)?,
                group_id: row.get(1)?,
                user_id: row.get(2)?,
                role: row.get(3)?,
                joined_at_us: row.get(4)?,
                role_since_us: row.get(5)?,
            })
        }

        fn into_member(self) -> Result<Member, StoreError> {
            Ok(Member {
                member_id: self.member_id,
                group_id: GroupId(self.group_id),
                user_id: UserId::new(self.user_id),
                role: GroupRole::from_str(&self.role)
                    .map_err(|_| StoreError::corrupt("group_members.role", &self.role))?,
                joined_at: from_micros("group_members.joined_at_us", self.joined_at_us)?,
                role_since: from_micros("group_members.role_since_us", self.role_since_us)?,
            })
        }
    }

    pub(super) struct CaseRow {
        case_id: i64,
        group_id: i64,
        consultant_id: i64,
        folder_number: String,
        state: String,
        opened_at_us: i64,
        closed_at_us: Option<i64>,
        observations: String,
        state_reason: Option<String>,
        updated_at_us: i64,
    }

    impl CaseRow {
        pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                case_id: row.get(0)?,
                group_id: row.get(1)?,
                consultant_id: row.get(2)?,
                folder_number: row.get(3)?,
                state: row.get(4)?,
                opened_at_us: row.get(5)?,
                closed_at_us: row.get(6)?,
                observations: row.get(7)?,
                state_reason: row.get(8)?,
                updated_at_us: row.get(9)?,
            })
        }

        pub(super) fn into_case(self) -> Result<Case, StoreError> {
            Ok(Case {
                case_id: CaseId(self.case_id),
                group_id: GroupId(self.group_id),
                consultant_id: ConsultantId(self.consultant_id),
                folder_number: self.folder_number,
                state: decode_case_state(&self.state)?,
                opened_at: from_micros("cases.opened_at_us", self.opened_at_us)?,
                closed_at: self
                    .closed_at_us
                    .map(|us| from_micros("cases.closed_at_us", us))
                    .transpose()?,
                observations: self.observations,
                state_reason: self.state_reason,
                updated_at: from_micros("cases.updated_at_us", self.updated_at_us)?,
            })
        }
    }

    pub(super) fn user(conn: &Connection, user_id: &UserId) -> Result<Option<User>, StoreError> {
        let row = conn
            .query_row(
                "SELECT user_id, display_name, system_role, active FROM users WHERE user_id = ?1",
                [user_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, display_name, role, active)| {
            let role = SystemRole::from_str(&role)
                .map_err(|_| StoreError::corrupt("users.system_role", &role))?;
            Ok(User {
                user_id: UserId::new(id),
                display_name,
                role,
                active,
            })
        })
        .transpose()
    }

    pub(super) fn group(conn: &Connection, group_id: GroupId) -> Result<Option<Group>, StoreError> {
        let row = conn
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM clinic_groups WHERE group_id = ?1"),
                [group_id.get()],
                GroupRow::from_row,
            )
            .optional()?;
        row.map(GroupRow::into_group).transpose()
    }

    pub(super) fn group_by_name(conn: &Connection, name: &str) -> Result<Option<Group>, StoreError> {
        let row = conn
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM clinic_groups WHERE name = ?1"),
                [name],
                GroupRow::from_row,
            )
            .optional()?;
        row.map(GroupRow::into_group).transpose()
    }

    pub(super) fn list_groups(conn: &Connection) -> Result<Vec<Group>, StoreError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {GROUP_COLUMNS} FROM clinic_groups ORDER BY active DESC, name ASC"
        ))?;
        let rows = stmt
            .query_map([], GroupRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(GroupRow::into_group).collect()
    }

    pub(super) fn members(conn: &Connection, group_id: GroupId) -> Result<Vec<Member>, StoreError> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {MEMBER_COLUMNS} FROM group_members WHERE group_id = ?1 ORDER BY member_id"
        ))?;
        let rows = stmt
            .query_map([group_id.get()], MemberRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(MemberRow::into_member).collect()
    }

    pub(super) fn memberships_of(
        conn: &Connection,
        user_id: &UserId,
    ) -> Result<Vec<Member>, StoreError> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {MEMBER_COLUMNS} FROM group_members WHERE user_id = ?1 ORDER BY group_id"
        ))?;
        let rows = stmt
            .query_map([user_id.as_str()], MemberRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(MemberRow::into_member).collect()
    }

    pub(super) fn case(conn: &Connection, case_id: CaseId) -> Result<Option<Case>, StoreError> {
        let row = conn
            .query_row(
                &format!("SELECT {CASE_COLUMNS} FROM cases WHERE case_id = ?1"),
                [case_id.get()],
                CaseRow::from_row,
            )
            .optional()?;
        row.map(CaseRow::into_case).transpose()
    }

    pub(super) fn list_cases(
        conn: &Connection,
        group_id: Option<GroupId>,
    ) -> Result<Vec<Case>, StoreError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {CASE_COLUMNS} FROM cases
             WHERE (?1 IS NULL OR group_id = ?1)
             ORDER BY opened_at_us DESC, case_id DESC"
        ))?;
        let rows = stmt
            .query_map([group_id.map(GroupId::get)], CaseRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(CaseRow::into_case).collect()
    }

    pub(super) fn transitions(
        conn: &Connection,
        case_id: CaseId,
    ) -> Result<Vec<CaseTransition>, StoreError> {
        let mut stmt = conn.prepare_cached(
            "SELECT from_state, to_state, reason, actor_id, at_us
             FROM case_transitions WHERE case_id = ?1 ORDER BY transition_id",
        )?;
        let rows = stmt
            .query_map([case_id.get()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(from, to, reason, actor, at_us)| {
                Ok(CaseTransition {
                    case_id,
                    from: decode_case_state(&from)?,
                    to: decode_case_state(&to)?,
                    reason,
                    actor_id: UserId::new(actor),
                    at: from_micros("case_transitions.at_us", at_us)?,
                })
            })
            .collect()
    }
}
