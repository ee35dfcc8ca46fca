//! Roster reconciliation against a real SQLite store.

use clinic_core::error::ErrorCode;
use clinic_core::event::EventKind;
use clinic_core::model::case::{CaseOrigin, CaseState};
use clinic_core::model::group::{DesiredRoster, GroupRole, NewGroup};
use clinic_core::model::ids::{GroupId, UserId};
use clinic_core::roster::RosterChange;

#[path = "support.rs"]
mod support;
use support::{Fixture, ids, instructor, responsible_of};

#[test]
fn responsible_swap_retags_rows_in_place() {
    let mut fx = Fixture::in_memory();
    let group = fx.group("Civil A", "u1");
    fx.set_roster(group, &DesiredRoster::new("u1").with_assistants(["u2", "u3"]));

    let u1_row = fx.member_id(group, "u1").expect("u1 row");
    let u2_row = fx.member_id(group, "u2").expect("u2 row");

    let admin = fx.admin.clone();
    let outcome = fx
        .roster()
        .reconcile(&admin, group, &DesiredRoster::new("u2").with_assistants(["u1"]))
        .expect("reconcile");

    assert_eq!(outcome.roster.responsible, Some(UserId::new("u2")));
    assert_eq!(outcome.roster.assistants, ids(&["u1"]));
    assert!(outcome.roster.students.is_empty());
    assert_eq!(outcome.roster.version, 3);

    assert_eq!(fx.member_id(group, "u1"), Some(u1_row));
    assert_eq!(fx.member_id(group, "u2"), Some(u2_row));
    assert_eq!(fx.member_id(group, "u3"), None);

    assert_eq!(fx.sink.kinds(), vec![EventKind::RosterChanged]);
    let event = &fx.sink.events()[0];
    assert_eq!(event.entity_id, group.to_string());
    assert_eq!(event.detail["roster_version"], 3);
    assert_eq!(event.detail["actor"], "admin");
}

#[test]
fn reconciling_twice_is_a_silent_no_op() {
    let mut fx = Fixture::in_memory();
    let group = fx.group("Laboral B", "u1");
    let desired = DesiredRoster::new("u1")
        .with_assistants(["u2"])
        .with_students(["s1", "s2"]);

    let admin = fx.admin.clone();
    let first = fx.roster().reconcile(&admin, group, &desired).unwrap();
    assert!(first.changed());
    assert_eq!(fx.sink.len(), 1);

    let second = fx.roster().reconcile(&admin, group, &desired).unwrap();
    assert!(!second.changed());
    assert_eq!(second.roster, first.roster);
    assert_eq!(fx.sink.len(), 1);
    assert_eq!(fx.store.group(group).unwrap().unwrap().roster_version, 2);
}

#[test]
fn responsible_is_excluded_from_requested_sets() {
    let mut fx = Fixture::in_memory();
    let group = fx.group("Penal C", "u1");
    let admin = fx.admin.clone();

    let outcome = fx
        .roster()
        .reconcile(
            &admin,
            group,
            &DesiredRoster::new("u1")
                .with_assistants(["u1", "u2"])
                .with_students(["u1", "s1"]),
        )
        .unwrap();

    assert_eq!(outcome.roster.responsible, Some(UserId::new("u1")));
    assert_eq!(outcome.roster.assistants, ids(&["u2"]));
    assert_eq!(outcome.roster.students, ids(&["s1"]));
}

#[test]
fn student_moves_between_groups_only_after_release() {
    let mut fx = Fixture::in_memory();
    let group_a = fx.group("Civil A", "u1");
    let group_b = fx.group("Civil B", "u2");
    fx.set_roster(group_a, &DesiredRoster::new("u1").with_students(["s1", "s2"]));

    let admin = fx.admin.clone();
    let err = fx
        .roster()
        .reconcile(&admin, group_b, &DesiredRoster::new("u2").with_students(["s1"]))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::StudentAlreadyAssigned);
    assert!(matches!(
        err,
        clinic_core::error::ClinicError::StudentAlreadyAssigned { group_id, .. } if group_id == group_a
    ));
    assert!(fx.sink.is_empty());
    assert!(fx.store.roster(group_b).unwrap().unwrap().students.is_empty());

    fx.set_roster(group_a, &DesiredRoster::new("u1").with_students(["s2"]));
    let moved = fx
        .roster()
        .reconcile(&admin, group_b, &DesiredRoster::new("u2").with_students(["s1"]))
        .unwrap();
    assert_eq!(moved.roster.students, ids(&["s1"]));
}

#[test]
fn assistant_cannot_become_student_while_studying_elsewhere() {
    let mut fx = Fixture::in_memory();
    let group_a = fx.group("Familia A", "u1");
    let group_b = fx.group("Familia B", "u2");
    fx.set_roster(group_a, &DesiredRoster::new("u1").with_students(["s3"]));
    fx.set_roster(group_b, &DesiredRoster::new("u2").with_assistants(["s3"]));

    let admin = fx.admin.clone();
    let err = fx
        .roster()
        .reconcile(&admin, group_b, &DesiredRoster::new("u2").with_students(["s3"]))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::StudentAlreadyAssigned);
    assert_eq!(
        fx.store.roster(group_b).unwrap().unwrap().role_of(&UserId::new("s3")),
        Some(GroupRole::Assistant)
    );
}

#[test]
fn previous_responsible_can_be_demoted_to_student_and_back() {
    let mut fx = Fixture::in_memory();
    let group = fx.group("Laboral C", "u1");
    let row = fx.member_id(group, "u1").unwrap();

    fx.set_roster(group, &DesiredRoster::new("u2").with_students(["u1"]));
    assert_eq!(fx.member_id(group, "u1"), Some(row));
    let roster = fx.store.roster(group).unwrap().unwrap();
    assert_eq!(roster.role_of(&UserId::new("u1")), Some(GroupRole::Student));

    fx.set_roster(group, &DesiredRoster::new("u1"));
    assert_eq!(fx.member_id(group, "u1"), Some(row));
    let roster = fx.store.roster(group).unwrap().unwrap();
    assert_eq!(roster.responsible, Some(UserId::new("u1")));
    assert_eq!(roster.len(), 1);
}

#[test]
fn change_list_follows_apply_order() {
    let mut fx = Fixture::in_memory();
    let group = fx.group("Civil D", "u1");
    fx.set_roster(
        group,
        &DesiredRoster::new("u1")
            .with_assistants(["u2"])
            .with_students(["s1"]),
    );

    let admin = fx.admin.clone();
    let outcome = fx
        .roster()
        .reconcile(
            &admin,
            group,
            &DesiredRoster::new("u3")
                .with_assistants(["u1"])
                .with_students(["u2", "s4"]),
        )
        .unwrap();

    let ops: Vec<(&str, &str)> = outcome
        .changes
        .iter()
        .map(|change| {
            let op = match change {
                RosterChange::Remove { .. } => "remove",
                RosterChange::Retag { .. } => "retag",
                RosterChange::Insert { .. } => "insert",
            };
            (op, change.user_id().as_str())
        })
        .collect();
    assert_eq!(
        ops,
        vec![
            ("remove", "s1"),
            ("retag", "u1"),
            ("retag", "u2"),
            ("insert", "s4"),
            ("insert", "u3"),
        ]
    );
    assert_eq!(outcome.roster.responsible, Some(UserId::new("u3")));
    assert_eq!(outcome.roster.students, ids(&["s4", "u2"]));
}

#[test]
fn validation_runs_before_authorization() {
    let mut fx = Fixture::in_memory();
    let group = fx.group("Civil E", "u1");
    let outsider = instructor("u4");

    let invalid = fx
        .roster()
        .reconcile(&outsider, group, &DesiredRoster::new(""))
        .unwrap_err();
    assert_eq!(invalid.code(), ErrorCode::InvalidRoster);

    let forbidden = fx
        .roster()
        .reconcile(&outsider, group, &DesiredRoster::new("u1"))
        .unwrap_err();
    assert_eq!(forbidden.code(), ErrorCode::Forbidden);
}

#[test]
fn only_administrators_and_the_responsible_may_reconcile() {
    let mut fx = Fixture::in_memory();
    let group = fx.group("Civil F", "u1");
    fx.set_roster(group, &DesiredRoster::new("u1").with_assistants(["u2"]));

    let assistant = instructor("u2").with_membership(group, GroupRole::Assistant);
    let err = fx
        .roster()
        .reconcile(&assistant, group, &DesiredRoster::new("u1"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    // Responsible of another group has no say here.
    let other = responsible_of("u1", GroupId(999));
    let err = fx
        .roster()
        .reconcile(&other, group, &DesiredRoster::new("u1"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let responsible = responsible_of("u1", group);
    let outcome = fx
        .roster()
        .reconcile(
            &responsible,
            group,
            &DesiredRoster::new("u1").with_students(["s5"]),
        )
        .unwrap();
    assert_eq!(outcome.roster.students, ids(&["s5"]));
    assert_eq!(fx.sink.events()[0].detail["actor"], "u1");
}

#[test]
fn unknown_and_inactive_groups_are_rejected() {
    let mut fx = Fixture::in_memory();
    let admin = fx.admin.clone();

    let err = fx
        .roster()
        .reconcile(&admin, GroupId(404), &DesiredRoster::new("u1"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::GroupNotFound);

    let group = fx.group("Archivo", "u1");
    fx.roster().deactivate_group(&admin, group).unwrap();
    let err = fx
        .roster()
        .reconcile(&admin, group, &DesiredRoster::new("u2"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRoster);
}

#[test]
fn stale_expected_version_wins_over_unknown_members() {
    let mut fx = Fixture::in_memory();
    let group = fx.group("Civil G", "u1");
    let admin = fx.admin.clone();

    let stale = DesiredRoster::new("u1")
        .with_students(["ghost"])
        .expecting_version(0);
    let err = fx.roster().reconcile(&admin, group, &stale).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConcurrentModification);
    assert!(err.is_retryable());

    let current = DesiredRoster::new("u1")
        .with_students(["ghost"])
        .expecting_version(1);
    let err = fx.roster().reconcile(&admin, group, &current).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MemberNotFound);

    let ok = DesiredRoster::new("u1")
        .with_students(["s6"])
        .expecting_version(1);
    let outcome = fx.roster().reconcile(&admin, group, &ok).unwrap();
    assert_eq!(outcome.roster.version, 2);
}

#[test]
fn unknown_responsible_is_member_not_found() {
    let mut fx = Fixture::in_memory();
    let group = fx.group("Civil H", "u1");
    let admin = fx.admin.clone();

    let err = fx
        .roster()
        .reconcile(&admin, group, &DesiredRoster::new("nobody"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MemberNotFound);
    assert_eq!(
        fx.store.roster(group).unwrap().unwrap().responsible,
        Some(UserId::new("u1"))
    );
}

#[test]
fn create_group_checks() {
    let mut fx = Fixture::in_memory();
    let admin = fx.admin.clone();
    let new_group = |name: &str, responsible: &str| NewGroup {
        name: name.to_string(),
        description: "Tuesday shift".to_string(),
        responsible: UserId::new(responsible),
    };

    let err = fx
        .roster()
        .create_group(&instructor("u1"), &new_group("Civil", "u1"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    let err = fx
        .roster()
        .create_group(&admin, &new_group("  ", "u1"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidGroup);

    let err = fx
        .roster()
        .create_group(&admin, &new_group("Civil", "nobody"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MemberNotFound);

    let group = fx
        .roster()
        .create_group(&admin, &new_group(" Civil ", "u1"))
        .unwrap();
    assert_eq!(group.name, "Civil");
    assert_eq!(group.roster_version, 1);
    assert!(group.active);
    assert_eq!(fx.sink.kinds(), vec![EventKind::GroupCreated]);

    let err = fx
        .roster()
        .create_group(&admin, &new_group("Civil", "u2"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::GroupNameTaken);

    let roster = fx.roster().group_roster(group.group_id).unwrap();
    assert_eq!(roster.responsible, Some(UserId::new("u1")));
    assert_eq!(roster.version, 1);
}

#[test]
fn deactivation_waits_for_open_cases() {
    let mut fx = Fixture::in_memory();
    let group = fx.group("Penal D", "u1");
    let case = fx.open_case(group, "2024-0100", CaseOrigin::Direct);
    let admin = fx.admin.clone();

    let err = fx.roster().deactivate_group(&admin, group).unwrap_err();
    assert_eq!(err.code(), ErrorCode::GroupHasOpenCases);

    let err = fx
        .roster()
        .deactivate_group(&responsible_of("u1", group), group)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    fx.cases()
        .transition(&admin, case.case_id, CaseState::Closed, None)
        .unwrap();
    fx.sink.clear();

    let group_row = fx.roster().deactivate_group(&admin, group).unwrap();
    assert!(!group_row.active);
    assert_eq!(fx.sink.kinds(), vec![EventKind::GroupDeactivated]);

    let again = fx.roster().deactivate_group(&admin, group).unwrap();
    assert!(!again.active);
    assert_eq!(fx.sink.len(), 1);
}
