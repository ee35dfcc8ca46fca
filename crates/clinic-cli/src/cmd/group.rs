//! `clinic group`: create groups, inspect them and edit their rosters.

use super::{Session, local_datetime};
use crate::output::{fail, pretty_kv, pretty_rule, pretty_section, render_mode};
use clap::{Args, Subcommand};
use clinic_core::error::ClinicError;
use clinic_core::model::group::{DesiredRoster, Group, Member, NewGroup, Roster};
use clinic_core::model::ids::{GroupId, UserId};
use clinic_core::roster::{RosterChange, RosterReconciler};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Create a group with its responsible instructor.
    Create(GroupCreateArgs),
    /// List all groups.
    List,
    /// Show a group and its roster.
    Show(GroupRefArgs),
    /// Replace a group's roster with the one given.
    Roster(GroupRosterArgs),
    /// Deactivate a group that has no open cases.
    Deactivate(GroupRefArgs),
}

#[derive(Args, Debug)]
pub struct GroupCreateArgs {
    /// Unique group name.
    #[arg(long)]
    pub name: String,

    /// Free-form description.
    #[arg(long, default_value = "")]
    pub description: String,

    /// User id of the responsible instructor.
    #[arg(long)]
    pub responsible: String,
}

#[derive(Args, Debug)]
pub struct GroupRefArgs {
    /// Group id, e.g. `grp-3` or `3`.
    pub group: GroupId,
}

#[derive(Args, Debug)]
pub struct GroupRosterArgs {
    /// Group id, e.g. `grp-3` or `3`.
    pub group: GroupId,

    /// User id of the responsible instructor.
    #[arg(long)]
    pub responsible: String,

    /// Assistant user ids (repeatable).
    #[arg(long = "assistant", value_name = "USER")]
    pub assistants: Vec<String>,

    /// Student user ids (repeatable).
    #[arg(long = "student", value_name = "USER")]
    pub students: Vec<String>,

    /// Fail unless the stored roster version still matches.
    #[arg(long, value_name = "VERSION")]
    pub expect_version: Option<u64>,
}

impl GroupRosterArgs {
    fn desired(&self) -> DesiredRoster {
        DesiredRoster {
            responsible: UserId::new(self.responsible.as_str()),
            assistants: self.assistants.iter().map(|id| UserId::new(id.as_str())).collect(),
            students: self.students.iter().map(|id| UserId::new(id.as_str())).collect(),
            expected_version: self.expect_version,
        }
    }
}

#[derive(Debug, Serialize)]
struct GroupView {
    group: Group,
    roster: Roster,
    members: Vec<Member>,
}

#[derive(Debug, Serialize)]
struct RosterChangeView {
    group_id: GroupId,
    version: u64,
    changed: bool,
    changes: Vec<RosterChange>,
}

pub fn run_group(
    command: &GroupCommand,
    session: &mut Session,
    actor_flag: Option<&str>,
) -> anyhow::Result<()> {
    match command {
        GroupCommand::Create(args) => run_create(args, session, actor_flag),
        GroupCommand::List => run_list(session),
        GroupCommand::Show(args) => run_show(args.group, session),
        GroupCommand::Roster(args) => run_roster(args, session, actor_flag),
        GroupCommand::Deactivate(args) => run_deactivate(args.group, session, actor_flag),
    }
}

fn run_create(
    args: &GroupCreateArgs,
    session: &mut Session,
    actor_flag: Option<&str>,
) -> anyhow::Result<()> {
    let actor = session.actor(actor_flag)?;
    let new_group = NewGroup {
        name: args.name.clone(),
        description: args.description.clone(),
        responsible: UserId::new(args.responsible.as_str()),
    };

    let output = session.output;
    let group = match RosterReconciler::new(&mut session.store, &session.sink)
        .create_group(&actor, &new_group)
    {
        Ok(group) => group,
        Err(err) => return fail(output, &err),
    };

    render_mode(
        output,
        &group,
        |g, w| writeln!(w, "{}\t{}\tv{}", g.group_id, g.name, g.roster_version),
        |g, w| writeln!(w, "✓ Created group {} ({})", g.name, g.group_id),
    )
}

fn run_list(session: &Session) -> anyhow::Result<()> {
    let groups = session.store.list_groups()?;
    render_mode(
        session.output,
        &groups,
        |groups, w| {
            for g in groups {
                writeln!(w, "{}\t{}\t{}\tv{}", g.group_id, status(g), g.name, g.roster_version)?;
            }
            Ok(())
        },
        |groups, w| {
            pretty_section(w, &format!("Groups ({})", groups.len()))?;
            for g in groups {
                writeln!(w, "{:<8} {:<10} {}", g.group_id.to_string(), status(g), g.name)?;
            }
            Ok(())
        },
    )
}

fn run_show(group_id: GroupId, session: &Session) -> anyhow::Result<()> {
    let Some(group) = session.store.group(group_id)? else {
        return fail(session.output, &ClinicError::GroupNotFound { group_id });
    };
    let members = session.store.members(group_id)?;
    let roster = Roster::from_members(group_id, group.roster_version, &members);
    let view = GroupView {
        group,
        roster,
        members,
    };

    render_mode(
        session.output,
        &view,
        |v, w| {
            writeln!(w, "{}\t{}\t{}\tv{}", v.group.group_id, status(&v.group), v.group.name, v.roster.version)?;
            for m in &v.members {
                writeln!(w, "{}\t{}", m.role, m.user_id)?;
            }
            Ok(())
        },
        |v, w| render_group_pretty(v, w),
    )
}

fn render_group_pretty(v: &GroupView, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("{} {}", v.group.group_id, v.group.name))?;
    if !v.group.description.is_empty() {
        pretty_kv(w, "Description", &v.group.description)?;
    }
    pretty_kv(w, "Status", status(&v.group))?;
    pretty_kv(w, "Roster", format!("v{}", v.roster.version))?;
    pretty_kv(w, "Created", local_datetime(v.group.created_at))?;
    writeln!(w)?;
    pretty_kv(
        w,
        "Responsible",
        v.roster.responsible.as_ref().map_or("-", UserId::as_str),
    )?;
    pretty_kv(w, "Assistants", join_ids(v.roster.assistants.iter()))?;
    pretty_kv(w, "Students", join_ids(v.roster.students.iter()))?;
    pretty_rule(w)
}

fn run_roster(
    args: &GroupRosterArgs,
    session: &mut Session,
    actor_flag: Option<&str>,
) -> anyhow::Result<()> {
    let actor = session.actor(actor_flag)?;
    let output = session.output;
    let outcome = match RosterReconciler::new(&mut session.store, &session.sink).reconcile(
        &actor,
        args.group,
        &args.desired(),
    ) {
        Ok(outcome) => outcome,
        Err(err) => return fail(output, &err),
    };

    let view = RosterChangeView {
        group_id: args.group,
        version: outcome.roster.version,
        changed: outcome.changed(),
        changes: outcome.changes,
    };
    render_mode(
        output,
        &view,
        |v, w| {
            for change in &v.changes {
                writeln!(w, "{}", describe_change(change))?;
            }
            writeln!(w, "{}\tv{}\t{} change(s)", v.group_id, v.version, v.changes.len())
        },
        |v, w| {
            if !v.changed {
                return writeln!(w, "Roster of {} already up to date (v{})", v.group_id, v.version);
            }
            writeln!(w, "✓ Updated roster of {} to v{}", v.group_id, v.version)?;
            for change in &v.changes {
                writeln!(w, "  {}", describe_change(change))?;
            }
            Ok(())
        },
    )
}

fn run_deactivate(
    group_id: GroupId,
    session: &mut Session,
    actor_flag: Option<&str>,
) -> anyhow::Result<()> {
    let actor = session.actor(actor_flag)?;
    let output = session.output;
    let group = match RosterReconciler::new(&mut session.store, &session.sink)
        .deactivate_group(&actor, group_id)
    {
        Ok(group) => group,
        Err(err) => return fail(output, &err),
    };

    render_mode(
        output,
        &group,
        |g, w| writeln!(w, "{}\t{}", g.group_id, status(g)),
        |g, w| writeln!(w, "✓ Deactivated group {} ({})", g.name, g.group_id),
    )
}

const fn status(group: &Group) -> &'static str {
    if group.active { "active" } else { "inactive" }
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a UserId>) -> String {
    let joined = ids.map(UserId::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() { "-".to_string() } else { joined }
}

fn describe_change(change: &RosterChange) -> String {
    match change {
        RosterChange::Remove { user_id, role } => format!("- {user_id} ({role})"),
        RosterChange::Retag { user_id, from, to } => format!("~ {user_id} ({from} -> {to})"),
        RosterChange::Insert { user_id, role } => format!("+ {user_id} ({role})"),
    }
}
