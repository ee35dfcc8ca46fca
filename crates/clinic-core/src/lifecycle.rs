//! Case lifecycle: opening, state transitions, history and deletion.
//!
//! The transition table lives on [`CaseState`]; this module adds the side
//! conditions (who may move a case, when a reason is required) and persists
//! every accepted move together with a history row.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::retry::with_storage_retry;
use crate::db::store::StateUpdate;
use crate::db::{CaseStore, RosterStore, Store, Transaction};
use crate::error::{ClinicError, ClinicResult};
use crate::event::{DomainEvent, EventSink, dispatch};
use crate::model::actor::ActorContext;
use crate::model::case::{Case, CaseState, CaseTransition, NewCase};
use crate::model::group::GroupRole;
use crate::model::ids::CaseId;

/// Result of a transition request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    /// The case after the request.
    pub case: Case,
    /// State before the request.
    pub from: CaseState,
    /// False when the case was already in the requested state.
    pub changed: bool,
}

/// Drives cases through their lifecycle against a [`Store`].
pub struct CaseLifecycle<'a, S: Store> {
    store: &'a mut S,
    sink: &'a dyn EventSink,
}

impl<'a, S: Store> CaseLifecycle<'a, S> {
    pub fn new(store: &'a mut S, sink: &'a dyn EventSink) -> Self {
        Self { store, sink }
    }

    /// Move a case to `to`.
    ///
    /// Requesting the current state succeeds without writing anything.
    ///
    /// # Errors
    ///
    /// In order: `CaseNotFound`, `Forbidden` unless the actor is an
    /// administrator or a member of the case's group, `IllegalTransition`,
    /// `ReasonRequired`.
    pub fn transition(
        &mut self,
        actor: &ActorContext,
        case_id: CaseId,
        to: CaseState,
        reason: Option<&str>,
    ) -> ClinicResult<TransitionOutcome> {
        let reason = reason.map(str::trim).filter(|text| !text.is_empty());
        let now = Utc::now();
        let store = &mut *self.store;
        let outcome = with_storage_retry("transition_case", || {
            transition_attempt(store, actor, case_id, to, reason, now)
        })?;

        if outcome.changed {
            dispatch(
                self.sink,
                &DomainEvent::case_state_changed(
                    case_id,
                    outcome.from,
                    to,
                    reason,
                    &actor.user_id,
                    now,
                ),
            );
        }
        Ok(outcome)
    }

    /// Open a case in its group. Intake cases start pending, direct
    /// admissions start active.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-administrators, `InvalidCase` for a blank folder
    /// number, `GroupNotFound`, `InvalidRoster` when the group is inactive
    /// or has no responsible member, `ConsultantNotFound`, and
    /// `FolderNumberTaken`.
    pub fn open_case(&mut self, actor: &ActorContext, new_case: &NewCase) -> ClinicResult<Case> {
        if !actor.is_administrator() {
            return Err(ClinicError::forbidden("only administrators may open cases"));
        }
        let folder_number = new_case.folder_number.trim();
        if folder_number.is_empty() {
            return Err(ClinicError::InvalidCase {
                reason: "folder number must not be blank".into(),
            });
        }

        let now = Utc::now();
        let store = &mut *self.store;
        let case = with_storage_retry("open_case", || {
            let tx = store.begin()?;
            let group_id = new_case.group_id;
            let group = tx
                .group(group_id)?
                .ok_or(ClinicError::GroupNotFound { group_id })?;
            if !group.active {
                return Err(ClinicError::invalid_roster(format!(
                    "{group_id} is inactive"
                )));
            }
            if !tx
                .members(group_id)?
                .iter()
                .any(|member| member.role == GroupRole::Responsible)
            {
                return Err(ClinicError::invalid_roster(format!(
                    "{group_id} has no responsible member"
                )));
            }
            if tx.consultant(new_case.consultant_id)?.is_none() {
                return Err(ClinicError::ConsultantNotFound {
                    consultant_id: new_case.consultant_id,
                });
            }
            if tx.case_by_folder(folder_number)?.is_some() {
                return Err(ClinicError::FolderNumberTaken {
                    folder_number: folder_number.to_string(),
                });
            }

            let case_id = tx.insert_case(new_case, new_case.origin.initial_state(), now)?;
            let case = tx.case(case_id)?.ok_or(ClinicError::CaseNotFound { case_id })?;
            tx.commit()?;
            Ok(case)
        })?;

        info!(
            case_id = %case.case_id,
            group_id = %case.group_id,
            state = %case.state,
            "opened case"
        );
        dispatch(self.sink, &DomainEvent::case_opened(&case, &actor.user_id));
        Ok(case)
    }

    /// Hard-delete a case and its history.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-administrators and `CaseNotFound`.
    pub fn delete_case(&mut self, actor: &ActorContext, case_id: CaseId) -> ClinicResult<Case> {
        if !actor.is_administrator() {
            return Err(ClinicError::forbidden("only administrators may delete cases"));
        }

        let now = Utc::now();
        let store = &mut *self.store;
        let case = with_storage_retry("delete_case", || {
            let tx = store.begin()?;
            let case = tx.case(case_id)?.ok_or(ClinicError::CaseNotFound { case_id })?;
            tx.delete_case(case_id)?;
            tx.commit()?;
            Ok(case)
        })?;

        warn!(
            %case_id,
            folder_number = %case.folder_number,
            actor = %actor.user_id,
            "hard-deleted case"
        );
        dispatch(
            self.sink,
            &DomainEvent::case_deleted(&case, &actor.user_id, now),
        );
        Ok(case)
    }

    /// State history of a case, oldest first.
    ///
    /// # Errors
    ///
    /// `CaseNotFound` for an unknown case.
    pub fn case_history(&mut self, case_id: CaseId) -> ClinicResult<Vec<CaseTransition>> {
        let store = &mut *self.store;
        with_storage_retry("case_history", || {
            let tx = store.begin()?;
            if tx.case(case_id)?.is_none() {
                return Err(ClinicError::CaseNotFound { case_id });
            }
            Ok(tx.transitions(case_id)?)
        })
    }
}

fn transition_attempt<S: Store>(
    store: &mut S,
    actor: &ActorContext,
    case_id: CaseId,
    to: CaseState,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> ClinicResult<TransitionOutcome> {
    let tx = store.begin()?;
    let case = tx
        .case(case_id)?
        .ok_or(ClinicError::CaseNotFound { case_id })?;

    if !actor.is_administrator() && !actor.is_member_of(case.group_id) {
        return Err(ClinicError::forbidden(format!(
            "{} is not a member of {}",
            actor.user_id, case.group_id
        )));
    }

    let from = case.state;
    if from == to {
        debug!(%case_id, state = %to, "case already in requested state");
        return Ok(TransitionOutcome {
            case,
            from,
            changed: false,
        });
    }

    from.can_transition_to(to)?;
    if to.requires_reason_from(from) && reason.is_none() {
        return Err(ClinicError::ReasonRequired { from, to });
    }

    // Reopening clears the justification of the state being left.
    let state_reason = if to == CaseState::Active { None } else { reason };
    let closed_at = to.is_terminal().then_some(now);

    tx.update_case_state(
        case_id,
        &StateUpdate {
            state: to,
            state_reason,
            closed_at,
            at: now,
        },
    )?;
    tx.append_transition(&CaseTransition {
        case_id,
        from,
        to,
        reason: reason.map(str::to_string),
        actor_id: actor.user_id.clone(),
        at: now,
    })?;
    let case = tx
        .case(case_id)?
        .ok_or(ClinicError::CaseNotFound { case_id })?;
    tx.commit()?;

    info!(%case_id, %from, %to, actor = %actor.user_id, "moved case");
    Ok(TransitionOutcome {
        case,
        from,
        changed: true,
    })
}
