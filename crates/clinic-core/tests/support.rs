//! Shared fixtures for the clinic-core integration tests.
//!
//! Included from each test file with `#[path = "support.rs"] mod support;`.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use clinic_core::db::SqliteStore;
use clinic_core::event::RecordingSink;
use clinic_core::lifecycle::CaseLifecycle;
use clinic_core::model::actor::{ActorContext, SystemRole, User};
use clinic_core::model::case::{Case, CaseOrigin, NewCase};
use clinic_core::model::group::{DesiredRoster, GroupRole, NewGroup};
use clinic_core::model::ids::{ConsultantId, GroupId, UserId};
use clinic_core::roster::RosterReconciler;

pub const INSTRUCTORS: [&str; 4] = ["u1", "u2", "u3", "u4"];
pub const STUDENTS: [&str; 6] = ["s1", "s2", "s3", "s4", "s5", "s6"];

pub struct Fixture {
    pub store: SqliteStore,
    pub sink: RecordingSink,
    pub admin: ActorContext,
    pub consultant: ConsultantId,
}

impl Fixture {
    pub fn in_memory() -> Self {
        Self::seed(SqliteStore::open_in_memory().expect("open in-memory store"))
    }

    pub fn on_disk(path: &Path, busy_timeout: Duration) -> Self {
        Self::seed(SqliteStore::open(path, busy_timeout).expect("open on-disk store"))
    }

    fn seed(store: SqliteStore) -> Self {
        store
            .insert_user(&User::new("admin", "Clinic Admin", SystemRole::Administrator))
            .expect("insert admin");
        for id in INSTRUCTORS {
            store
                .insert_user(&User::new(id, id.to_uppercase(), SystemRole::Instructor))
                .expect("insert instructor");
        }
        for id in STUDENTS {
            store
                .insert_user(&User::new(id, id.to_uppercase(), SystemRole::Student))
                .expect("insert student");
        }
        let consultant = store
            .insert_consultant("Rosa Diaz", Some("CC 1020"))
            .expect("insert consultant");

        Self {
            store,
            sink: RecordingSink::new(),
            admin: ActorContext::administrator("admin"),
            consultant,
        }
    }

    pub fn roster(&mut self) -> RosterReconciler<'_, SqliteStore> {
        RosterReconciler::new(&mut self.store, &self.sink)
    }

    pub fn cases(&mut self) -> CaseLifecycle<'_, SqliteStore> {
        CaseLifecycle::new(&mut self.store, &self.sink)
    }

    /// Create a group led by `responsible` and clear the recorded events.
    pub fn group(&mut self, name: &str, responsible: &str) -> GroupId {
        let admin = self.admin.clone();
        let group = self
            .roster()
            .create_group(
                &admin,
                &NewGroup {
                    name: name.to_string(),
                    description: String::new(),
                    responsible: UserId::new(responsible),
                },
            )
            .expect("create group");
        self.sink.clear();
        group.group_id
    }

    /// Apply `desired` as administrator and clear the recorded events.
    pub fn set_roster(&mut self, group: GroupId, desired: &DesiredRoster) {
        let admin = self.admin.clone();
        self.roster()
            .reconcile(&admin, group, desired)
            .expect("reconcile roster");
        self.sink.clear();
    }

    /// Open a case as administrator and clear the recorded events.
    pub fn open_case(&mut self, group: GroupId, folder: &str, origin: CaseOrigin) -> Case {
        let admin = self.admin.clone();
        let consultant = self.consultant;
        let case = self
            .cases()
            .open_case(
                &admin,
                &NewCase {
                    group_id: group,
                    consultant_id: consultant,
                    folder_number: folder.to_string(),
                    observations: String::new(),
                    origin,
                },
            )
            .expect("open case");
        self.sink.clear();
        case
    }

    pub fn member_id(&self, group: GroupId, user: &str) -> Option<i64> {
        self.store
            .members(group)
            .expect("list members")
            .into_iter()
            .find(|member| member.user_id.as_str() == user)
            .map(|member| member.member_id)
    }
}

pub fn instructor(id: &str) -> ActorContext {
    ActorContext::new(id, SystemRole::Instructor)
}

pub fn student(id: &str) -> ActorContext {
    ActorContext::new(id, SystemRole::Student)
}

pub fn responsible_of(id: &str, group: GroupId) -> ActorContext {
    instructor(id).with_membership(group, GroupRole::Responsible)
}

pub fn ids(raw: &[&str]) -> std::collections::BTreeSet<UserId> {
    raw.iter().map(|id| UserId::new(*id)).collect()
}
