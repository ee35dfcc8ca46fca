//! `clinic user`: register and inspect users.
//!
//! Identity management proper lives outside the clinic core; these commands
//! only record who exists and with which system role, so rosters and actors
//! can refer to them.

use super::{Session, local_datetime};
use crate::output::{CliError, OutputMode, fail, pretty_kv, pretty_section, render_error, render_mode};
use clap::{Args, Subcommand};
use clinic_core::error::ClinicError;
use clinic_core::model::actor::{SystemRole, User};
use clinic_core::model::ids::UserId;
use serde::Serialize;
use std::io::Write;

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Register a user.
    Add(UserAddArgs),
    /// Show a user and their group memberships.
    Show(UserShowArgs),
}

#[derive(Args, Debug)]
pub struct UserAddArgs {
    /// User id (login name).
    pub id: String,

    /// Display name.
    #[arg(long)]
    pub name: String,

    /// System role: administrator, instructor or student.
    #[arg(long, default_value = "student")]
    pub role: SystemRole,
}

#[derive(Args, Debug)]
pub struct UserShowArgs {
    /// User id.
    pub id: String,
}

#[derive(Debug, Serialize)]
struct UserView {
    #[serde(flatten)]
    user: User,
    memberships: Vec<MembershipView>,
}

#[derive(Debug, Serialize)]
struct MembershipView {
    group_id: i64,
    role: String,
    since: String,
}

pub fn run_user(
    command: &UserCommand,
    session: &Session,
    actor_flag: Option<&str>,
) -> anyhow::Result<()> {
    match command {
        UserCommand::Add(args) => run_add(args, session, actor_flag),
        UserCommand::Show(args) => run_show(args, session),
    }
}

fn run_add(args: &UserAddArgs, session: &Session, actor_flag: Option<&str>) -> anyhow::Result<()> {
    let actor = session.actor(actor_flag)?;
    if !actor.is_administrator() {
        return fail(
            session.output,
            &ClinicError::Forbidden {
                reason: "only administrators may register users".to_string(),
            },
        );
    }

    let user_id = UserId::new(args.id.as_str());
    if user_id.is_blank() || args.name.trim().is_empty() {
        render_error(
            session.output,
            &CliError::with_details(
                "user id and name must not be blank",
                "pass a non-empty id and --name",
                "invalid_user",
            ),
        )?;
        anyhow::bail!("user id and name must not be blank");
    }
    if session.store.user(&user_id)?.is_some() {
        render_error(
            session.output,
            &CliError::with_details(
                format!("user '{user_id}' already exists"),
                "use `clinic user show` to inspect it",
                "user_exists",
            ),
        )?;
        anyhow::bail!("user '{user_id}' already exists");
    }

    let user = User::new(user_id, args.name.trim(), args.role);
    session.store.insert_user(&user)?;
    tracing::info!(user_id = %user.user_id, role = %user.role, actor = %actor.user_id, "registered user");

    render_mode(
        session.output,
        &user,
        |u, w| writeln!(w, "{}\t{}\t{}", u.user_id, u.role, u.display_name),
        |u, w| writeln!(w, "✓ Registered {} ({}) as {}", u.display_name, u.user_id, u.role),
    )
}

fn run_show(args: &UserShowArgs, session: &Session) -> anyhow::Result<()> {
    let user_id = UserId::new(args.id.as_str());
    let Some(user) = session.store.user(&user_id)? else {
        return fail(session.output, &ClinicError::MemberNotFound { user_id });
    };

    let memberships = session
        .store
        .memberships_of(&user.user_id)?
        .into_iter()
        .map(|member| MembershipView {
            group_id: member.group_id.get(),
            role: member.role.to_string(),
            since: local_datetime(member.role_since),
        })
        .collect();
    let view = UserView { user, memberships };

    render_mode(
        session.output,
        &view,
        |v, w| {
            writeln!(w, "{}\t{}\t{}\t{}", v.user.user_id, v.user.role, v.user.active, v.user.display_name)?;
            for m in &v.memberships {
                writeln!(w, "grp-{}\t{}", m.group_id, m.role)?;
            }
            Ok(())
        },
        |v, w| {
            pretty_section(w, &format!("{} ({})", v.user.display_name, v.user.user_id))?;
            pretty_kv(w, "Role", v.user.role.as_str())?;
            pretty_kv(w, "Active", if v.user.active { "yes" } else { "no" })?;
            if v.memberships.is_empty() {
                pretty_kv(w, "Groups", "-")?;
            }
            for m in &v.memberships {
                pretty_kv(w, &format!("grp-{}", m.group_id), format!("{} since {}", m.role, m.since))?;
            }
            Ok(())
        },
    )
}
