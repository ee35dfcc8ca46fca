//! Group roster reconciliation.
//!
//! Callers submit the roster they want a group to have; the reconciler
//! validates it against the stored roster and applies the difference inside
//! one store transaction. A member changing role keeps its row (and its
//! `member_id`); only the role column is rewritten.
//!
//! Errors are reported in a fixed order so callers can rely on it:
//! input shape, authorization, group lookup, version check, unknown users,
//! then students already placed in another group.

pub mod plan;

pub use plan::{RosterChange, RosterPlan, TargetRoster};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::db::retry::with_storage_retry;
use crate::db::{RosterStore, Store, Transaction};
use crate::error::{ClinicError, ClinicResult};
use crate::event::{DomainEvent, EventSink, dispatch};
use crate::model::actor::ActorContext;
use crate::model::group::{DesiredRoster, Group, GroupRole, NewGroup, Roster};
use crate::model::ids::GroupId;

/// Result of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterOutcome {
    /// The roster as committed (or as found, for a no-op).
    pub roster: Roster,
    /// Changes applied, in apply order. Empty for a no-op.
    pub changes: Vec<RosterChange>,
}

impl RosterOutcome {
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Applies roster and group-level changes against a [`Store`].
pub struct RosterReconciler<'a, S: Store> {
    store: &'a mut S,
    sink: &'a dyn EventSink,
}

impl<'a, S: Store> RosterReconciler<'a, S> {
    pub fn new(store: &'a mut S, sink: &'a dyn EventSink) -> Self {
        Self { store, sink }
    }

    /// Make the group's roster equal to `desired`.
    ///
    /// # Errors
    ///
    /// See the module docs for the order. `ConcurrentModification` is
    /// returned both for a stale `expected_version` and for a write lock
    /// that could not be acquired in time.
    pub fn reconcile(
        &mut self,
        actor: &ActorContext,
        group_id: GroupId,
        desired: &DesiredRoster,
    ) -> ClinicResult<RosterOutcome> {
        let target = TargetRoster::from_desired(desired)?;

        if !actor.is_administrator() && actor.membership(group_id) != Some(GroupRole::Responsible)
        {
            return Err(ClinicError::forbidden(format!(
                "only an administrator or the responsible member of {group_id} may change its roster"
            )));
        }

        let now = Utc::now();
        let store = &mut *self.store;
        let outcome = with_storage_retry("reconcile_roster", || {
            reconcile_attempt(store, group_id, &target, desired.expected_version, now)
        })?;

        if outcome.changed() {
            let changes = serde_json::to_value(&outcome.changes).unwrap_or_default();
            dispatch(
                self.sink,
                &DomainEvent::roster_changed(
                    group_id,
                    outcome.roster.version,
                    &changes,
                    &actor.user_id,
                    now,
                ),
            );
        }
        Ok(outcome)
    }

    /// Create a group with its first responsible member.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-administrators, `InvalidGroup` for a blank name,
    /// `InvalidRoster` for a blank responsible, `GroupNameTaken`, and
    /// `MemberNotFound` for an unknown responsible.
    pub fn create_group(&mut self, actor: &ActorContext, new_group: &NewGroup) -> ClinicResult<Group> {
        if !actor.is_administrator() {
            return Err(ClinicError::forbidden("only administrators may create groups"));
        }
        let name = new_group.name.trim();
        if name.is_empty() {
            return Err(ClinicError::InvalidGroup {
                reason: "group name must not be blank".into(),
            });
        }
        let target = TargetRoster::from_desired(&DesiredRoster::new(new_group.responsible.clone()))?;

        let now = Utc::now();
        let store = &mut *self.store;
        let group = with_storage_retry("create_group", || {
            let tx = store.begin()?;
            if tx.group_by_name(name)?.is_some() {
                return Err(ClinicError::GroupNameTaken {
                    name: name.to_string(),
                });
            }
            if let Some(missing) = tx.missing_users(&[&target.responsible])?.into_iter().next() {
                return Err(ClinicError::MemberNotFound { user_id: missing });
            }

            let group_id = tx.insert_group(name, new_group.description.trim(), now)?;
            tx.insert_member(group_id, &target.responsible, GroupRole::Responsible, now)?;
            tx.bump_roster_version(group_id, now)?;
            let group = tx
                .group(group_id)?
                .ok_or(ClinicError::GroupNotFound { group_id })?;
            tx.commit()?;
            Ok(group)
        })?;

        info!(group_id = %group.group_id, name = %group.name, "created group");
        dispatch(
            self.sink,
            &DomainEvent::group_created(&group, &target.responsible, &actor.user_id),
        );
        Ok(group)
    }

    /// Mark a group inactive. Already-inactive groups are returned as-is.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-administrators, `GroupNotFound`, and
    /// `GroupHasOpenCases` while pending or active cases remain.
    pub fn deactivate_group(&mut self, actor: &ActorContext, group_id: GroupId) -> ClinicResult<Group> {
        if !actor.is_administrator() {
            return Err(ClinicError::forbidden("only administrators may deactivate groups"));
        }

        let now = Utc::now();
        let store = &mut *self.store;
        let (group, changed) = with_storage_retry("deactivate_group", || {
            let tx = store.begin()?;
            let group = tx
                .group(group_id)?
                .ok_or(ClinicError::GroupNotFound { group_id })?;
            if !group.active {
                return Ok((group, false));
            }
            let open = tx.count_open_cases(group_id)?;
            if open > 0 {
                return Err(ClinicError::GroupHasOpenCases { group_id, open });
            }
            tx.set_group_active(group_id, false, now)?;
            let group = tx
                .group(group_id)?
                .ok_or(ClinicError::GroupNotFound { group_id })?;
            tx.commit()?;
            Ok((group, true))
        })?;

        if changed {
            info!(%group_id, "deactivated group");
            dispatch(
                self.sink,
                &DomainEvent::group_deactivated(group_id, &actor.user_id, now),
            );
        }
        Ok(group)
    }

    /// Current roster of a group.
    ///
    /// # Errors
    ///
    /// `GroupNotFound` for an unknown group.
    pub fn group_roster(&mut self, group_id: GroupId) -> ClinicResult<Roster> {
        let store = &mut *self.store;
        with_storage_retry("group_roster", || {
            let tx = store.begin()?;
            let group = tx
                .group(group_id)?
                .ok_or(ClinicError::GroupNotFound { group_id })?;
            let members = tx.members(group_id)?;
            Ok(Roster::from_members(group_id, group.roster_version, &members))
        })
    }
}

fn reconcile_attempt<S: Store>(
    store: &mut S,
    group_id: GroupId,
    target: &TargetRoster,
    expected_version: Option<u64>,
    now: DateTime<Utc>,
) -> ClinicResult<RosterOutcome> {
    let tx = store.begin()?;

    let group = tx
        .group(group_id)?
        .ok_or(ClinicError::GroupNotFound { group_id })?;
    if !group.active {
        return Err(ClinicError::invalid_roster(format!(
            "{group_id} is inactive"
        )));
    }
    if let Some(expected) = expected_version {
        if expected != group.roster_version {
            return Err(ClinicError::ConcurrentModification {
                entity: group_id.to_string(),
                detail: format!(
                    "expected roster version {expected}, found {}",
                    group.roster_version
                ),
            });
        }
    }

    if let Some(missing) = tx.missing_users(&target.referenced())?.into_iter().next() {
        return Err(ClinicError::MemberNotFound { user_id: missing });
    }

    let current = Roster::from_members(group_id, group.roster_version, &tx.members(group_id)?);
    let plan = RosterPlan::diff(&current, target);

    for student in plan.incoming_students() {
        if let Some(other) = tx.student_placement(student)? {
            if other != group_id {
                return Err(ClinicError::StudentAlreadyAssigned {
                    user_id: student.clone(),
                    group_id: other,
                });
            }
        }
    }

    if plan.is_empty() {
        debug!(%group_id, version = current.version, "roster already up to date");
        return Ok(RosterOutcome {
            roster: current,
            changes: Vec::new(),
        });
    }

    debug!(%group_id, changes = plan.len(), "applying roster plan");
    for change in &plan.changes {
        match change {
            RosterChange::Remove { user_id, .. } => tx.remove_member(group_id, user_id)?,
            RosterChange::Retag { user_id, to, .. } => {
                tx.retag_member(group_id, user_id, *to, now)?;
            }
            RosterChange::Insert { user_id, role } => {
                tx.insert_member(group_id, user_id, *role, now)?;
            }
        }
    }

    let version = tx.bump_roster_version(group_id, now)?;
    let roster = Roster::from_members(group_id, version, &tx.members(group_id)?);
    tx.commit()?;

    info!(%group_id, version, changes = plan.len(), "reconciled roster");
    Ok(RosterOutcome {
        roster,
        changes: plan.changes,
    })
}
