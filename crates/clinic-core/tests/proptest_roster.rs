use proptest::prelude::*;
use std::collections::BTreeSet;

use clinic_core::model::case::{CaseOrigin, CaseState};
use clinic_core::model::group::{DesiredRoster, GroupRole};
use clinic_core::model::ids::UserId;

#[path = "support.rs"]
mod support;
use support::{Fixture, INSTRUCTORS, STUDENTS};

fn pool() -> Vec<&'static str> {
    INSTRUCTORS.iter().chain(STUDENTS.iter()).copied().collect()
}

/// A roster over the fixture's users: one responsible, every other user
/// either absent, an assistant or a student.
fn arb_roster() -> impl Strategy<Value = DesiredRoster> {
    let users = pool();
    let n = users.len();
    (0..n, proptest::collection::vec(0u8..3, n)).prop_map(move |(responsible, roles)| {
        let mut desired = DesiredRoster::new(users[responsible]);
        for (user, role) in users.iter().zip(roles) {
            match role {
                1 => {
                    desired.assistants.insert(UserId::new(*user));
                }
                2 => {
                    desired.students.insert(UserId::new(*user));
                }
                _ => {}
            }
        }
        // The responsible may also land in a set; reconcile ignores it there.
        desired
    })
}

fn arb_step() -> impl Strategy<Value = (CaseState, Option<&'static str>)> {
    (
        prop::sample::select(CaseState::ALL.to_vec()),
        prop::option::of(prop::sample::select(vec!["", "  ", "client request"])),
    )
}

fn without(set: &BTreeSet<UserId>, user: &UserId) -> BTreeSet<UserId> {
    set.iter().filter(|id| *id != user).cloned().collect()
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    #[test]
    fn reconcile_reaches_the_requested_roster(start in arb_roster(), desired in arb_roster()) {
        let mut fx = Fixture::in_memory();
        let group = fx.group("Civil P", start.responsible.as_str());
        fx.set_roster(group, &start);
        let admin = fx.admin.clone();

        let outcome = fx.roster().reconcile(&admin, group, &desired).unwrap();
        let members = fx.store.members(group).unwrap();

        let responsibles = members.iter().filter(|m| m.role == GroupRole::Responsible).count();
        prop_assert_eq!(responsibles, 1);
        prop_assert_eq!(outcome.roster.responsible.as_ref(), Some(&desired.responsible));
        prop_assert_eq!(&outcome.roster.assistants, &without(&desired.assistants, &desired.responsible));
        prop_assert_eq!(&outcome.roster.students, &without(&desired.students, &desired.responsible));

        let distinct: BTreeSet<_> = members.iter().map(|m| &m.user_id).collect();
        prop_assert_eq!(distinct.len(), members.len());
        prop_assert_eq!(fx.sink.len(), usize::from(outcome.changed()));
    }

    #[test]
    fn reconcile_is_idempotent(start in arb_roster(), desired in arb_roster()) {
        let mut fx = Fixture::in_memory();
        let group = fx.group("Civil Q", start.responsible.as_str());
        fx.set_roster(group, &start);
        fx.set_roster(group, &desired);
        let before = fx.store.roster(group).unwrap().unwrap();
        let admin = fx.admin.clone();

        let again = fx.roster().reconcile(&admin, group, &desired).unwrap();
        prop_assert!(!again.changed());
        prop_assert_eq!(&again.roster, &before);
        prop_assert!(fx.sink.is_empty());
    }

    #[test]
    fn role_changes_keep_member_rows(start in arb_roster(), desired in arb_roster()) {
        let mut fx = Fixture::in_memory();
        let group = fx.group("Civil R", start.responsible.as_str());
        fx.set_roster(group, &start);
        let rows_before = fx.store.members(group).unwrap();
        fx.set_roster(group, &desired);
        let rows_after = fx.store.members(group).unwrap();

        for before in &rows_before {
            if let Some(after) = rows_after.iter().find(|m| m.user_id == before.user_id) {
                prop_assert_eq!(after.member_id, before.member_id);
            }
        }
    }

    #[test]
    fn lifecycle_follows_the_transition_table(steps in proptest::collection::vec(arb_step(), 1..12)) {
        let mut fx = Fixture::in_memory();
        let group = fx.group("Civil S", "u1");
        let case = fx.open_case(group, "2024-0900", CaseOrigin::Intake).case_id;
        let admin = fx.admin.clone();

        let mut expected = CaseState::Pending;
        let mut moves = 0;
        for (to, reason) in steps {
            let has_reason = reason.is_some_and(|r| !r.trim().is_empty());
            let result = fx.cases().transition(&admin, case, to, reason);
            if to == expected {
                prop_assert!(!result.unwrap().changed);
            } else if expected.can_transition_to(to).is_err() {
                prop_assert!(result.is_err());
            } else if to.requires_reason_from(expected) && !has_reason {
                prop_assert!(result.is_err());
            } else {
                let outcome = result.unwrap();
                prop_assert!(outcome.changed);
                prop_assert_eq!(outcome.case.closed_at.is_some(), to.is_terminal());
                expected = to;
                moves += 1;
            }
        }

        prop_assert_eq!(fx.store.case(case).unwrap().unwrap().state, expected);
        prop_assert_eq!(fx.store.case_history(case).unwrap().len(), moves);
        prop_assert_eq!(fx.sink.len(), moves);
    }
}
