//! Builds the [`ActorContext`] the core operations expect.
//!
//! Authentication happens elsewhere; by the time a user id reaches this
//! module it is trusted. We only look up the system role and the group
//! memberships so every mutating call gets them explicitly.

use crate::db::SqliteStore;
use crate::error::{ClinicError, ClinicResult};
use crate::model::actor::ActorContext;
use crate::model::ids::UserId;

/// Resolve `user_id` into an actor context from stored users and rosters.
///
/// # Errors
///
/// Returns [`ClinicError::MemberNotFound`] for an unknown user,
/// [`ClinicError::Forbidden`] for a deactivated one, and
/// [`ClinicError::StorageUnavailable`] if the lookup fails.
pub fn resolve_actor(store: &SqliteStore, user_id: &UserId) -> ClinicResult<ActorContext> {
    let user = store
        .user(user_id)?
        .ok_or_else(|| ClinicError::MemberNotFound {
            user_id: user_id.clone(),
        })?;

    if !user.active {
        return Err(ClinicError::forbidden(format!(
            "user '{user_id}' is deactivated"
        )));
    }

    let actor = store
        .memberships_of(user_id)?
        .into_iter()
        .fold(ActorContext::new(user.user_id, user.role), |actor, member| {
            actor.with_membership(member.group_id, member.role)
        });

    tracing::debug!(
        user_id = %actor.user_id,
        role = %actor.role,
        groups = actor.memberships.len(),
        "resolved actor"
    );
    Ok(actor)
}
