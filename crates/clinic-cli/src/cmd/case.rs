//! `clinic case`: open cases and move them through their lifecycle.

use super::{Session, local_datetime, or_dash};
use crate::output::{fail, pretty_kv, pretty_rule, pretty_section, render, render_mode};
use clap::{Args, Subcommand};
use clinic_core::error::ClinicError;
use clinic_core::lifecycle::CaseLifecycle;
use clinic_core::model::case::{Case, CaseOrigin, CaseState, CaseTransition, NewCase};
use clinic_core::model::ids::{CaseId, ConsultantId, GroupId};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Subcommand, Debug)]
pub enum CaseCommand {
    /// Open a case in a group.
    Open(CaseOpenArgs),
    /// List cases, optionally for one group.
    List(CaseListArgs),
    /// Show one case.
    Show(CaseRefArgs),
    /// Move a case to another state.
    Move(CaseMoveArgs),
    /// Show a case's state history.
    History(CaseRefArgs),
    /// Permanently delete a case.
    Delete(CaseRefArgs),
}

#[derive(Args, Debug)]
pub struct CaseOpenArgs {
    /// Group that will work the case.
    #[arg(long)]
    pub group: GroupId,

    /// Consultant the case is opened for.
    #[arg(long)]
    pub consultant: ConsultantId,

    /// Physical folder number; unique across cases.
    #[arg(long)]
    pub folder: String,

    /// Free-form observations.
    #[arg(long, default_value = "")]
    pub observations: String,

    /// `intake` starts the case pending, `direct` starts it active.
    #[arg(long, default_value = "intake")]
    pub origin: CaseOrigin,
}

#[derive(Args, Debug)]
pub struct CaseListArgs {
    /// Only cases of this group.
    #[arg(long)]
    pub group: Option<GroupId>,
}

#[derive(Args, Debug)]
pub struct CaseRefArgs {
    /// Case id, e.g. `case-12` or `12`.
    pub case: CaseId,
}

#[derive(Args, Debug)]
pub struct CaseMoveArgs {
    /// Case id, e.g. `case-12` or `12`.
    pub case: CaseId,

    /// Target state: pending, active, closed or withdrawn.
    pub state: CaseState,

    /// Justification; required for withdrawals and for moving an active
    /// case back to pending.
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct CaseView {
    #[serde(flatten)]
    case: Case,
    allowed_targets: Vec<CaseState>,
}

#[derive(Debug, Serialize)]
struct MoveView {
    case: Case,
    from: CaseState,
    changed: bool,
}

pub fn run_case(
    command: &CaseCommand,
    session: &mut Session,
    actor_flag: Option<&str>,
) -> anyhow::Result<()> {
    match command {
        CaseCommand::Open(args) => run_open(args, session, actor_flag),
        CaseCommand::List(args) => run_list(args, session),
        CaseCommand::Show(args) => run_show(args.case, session),
        CaseCommand::Move(args) => run_move(args, session, actor_flag),
        CaseCommand::History(args) => run_history(args.case, session),
        CaseCommand::Delete(args) => run_delete(args.case, session, actor_flag),
    }
}

fn run_open(args: &CaseOpenArgs, session: &mut Session, actor_flag: Option<&str>) -> anyhow::Result<()> {
    let actor = session.actor(actor_flag)?;
    let new_case = NewCase {
        group_id: args.group,
        consultant_id: args.consultant,
        folder_number: args.folder.clone(),
        observations: args.observations.clone(),
        origin: args.origin,
    };

    let output = session.output;
    let case = match CaseLifecycle::new(&mut session.store, &session.sink).open_case(&actor, &new_case) {
        Ok(case) => case,
        Err(err) => return fail(output, &err),
    };

    render_mode(
        output,
        &case,
        |c, w| writeln!(w, "{}\t{}\t{}\t{}", c.case_id, c.state, c.group_id, c.folder_number),
        |c, w| {
            writeln!(
                w,
                "✓ Opened {} (folder {}) in {} as {}",
                c.case_id, c.folder_number, c.group_id, c.state
            )
        },
    )
}

fn run_list(args: &CaseListArgs, session: &Session) -> anyhow::Result<()> {
    let cases = session.store.list_cases(args.group)?;
    render_mode(
        session.output,
        &cases,
        |cases, w| {
            for c in cases {
                writeln!(w, "{}\t{}\t{}\t{}", c.case_id, c.state, c.group_id, c.folder_number)?;
            }
            Ok(())
        },
        |cases, w| {
            pretty_section(w, &format!("Cases ({})", cases.len()))?;
            for c in cases {
                writeln!(
                    w,
                    "{:<10} {:<10} {:<8} {}",
                    c.case_id.to_string(),
                    c.state.as_str(),
                    c.group_id.to_string(),
                    c.folder_number
                )?;
            }
            Ok(())
        },
    )
}

fn run_show(case_id: CaseId, session: &Session) -> anyhow::Result<()> {
    let Some(case) = session.store.case(case_id)? else {
        return fail(session.output, &ClinicError::CaseNotFound { case_id });
    };
    let view = CaseView {
        allowed_targets: case.state.allowed_targets(),
        case,
    };

    render_mode(
        session.output,
        &view,
        |v, w| {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}",
                v.case.case_id,
                v.case.state,
                v.case.group_id,
                v.case.folder_number,
                or_dash(v.case.state_reason.as_deref())
            )
        },
        |v, w| render_case_pretty(v, w),
    )
}

fn render_case_pretty(v: &CaseView, w: &mut dyn Write) -> io::Result<()> {
    let c = &v.case;
    pretty_section(w, &format!("{} folder {}", c.case_id, c.folder_number))?;
    pretty_kv(w, "State", c.state.as_str())?;
    if let Some(reason) = c.state_reason.as_deref() {
        pretty_kv(w, "Reason", reason)?;
    }
    pretty_kv(w, "Group", c.group_id.to_string())?;
    pretty_kv(w, "Consultant", c.consultant_id.to_string())?;
    pretty_kv(w, "Opened", local_datetime(c.opened_at))?;
    if let Some(closed_at) = c.closed_at {
        pretty_kv(w, "Closed", local_datetime(closed_at))?;
    }
    if !c.observations.is_empty() {
        pretty_kv(w, "Observations", &c.observations)?;
    }
    let targets = v
        .allowed_targets
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    pretty_kv(w, "Can move to", targets)?;
    pretty_rule(w)
}

fn run_move(args: &CaseMoveArgs, session: &mut Session, actor_flag: Option<&str>) -> anyhow::Result<()> {
    let actor = session.actor(actor_flag)?;
    let output = session.output;
    let outcome = match CaseLifecycle::new(&mut session.store, &session.sink).transition(
        &actor,
        args.case,
        args.state,
        args.reason.as_deref(),
    ) {
        Ok(outcome) => outcome,
        Err(err) => return fail(output, &err),
    };

    let view = MoveView {
        case: outcome.case,
        from: outcome.from,
        changed: outcome.changed,
    };
    render_mode(
        output,
        &view,
        |v, w| writeln!(w, "{}\t{}\t{}", v.case.case_id, v.from, v.case.state),
        |v, w| {
            if v.changed {
                writeln!(w, "✓ Moved {} from {} to {}", v.case.case_id, v.from, v.case.state)
            } else {
                writeln!(w, "{} is already {}", v.case.case_id, v.case.state)
            }
        },
    )
}

fn run_history(case_id: CaseId, session: &mut Session) -> anyhow::Result<()> {
    let output = session.output;
    let history = match CaseLifecycle::new(&mut session.store, &session.sink).case_history(case_id) {
        Ok(history) => history,
        Err(err) => return fail(output, &err),
    };

    render(output, &history, |history: &Vec<CaseTransition>, w| {
        if history.is_empty() {
            return writeln!(w, "{case_id} has no state changes");
        }
        for t in history {
            writeln!(
                w,
                "{}  {:<9} -> {:<9} {:<10} {}",
                local_datetime(t.at),
                t.from.as_str(),
                t.to.as_str(),
                t.actor_id,
                or_dash(t.reason.as_deref())
            )?;
        }
        Ok(())
    })
}

fn run_delete(case_id: CaseId, session: &mut Session, actor_flag: Option<&str>) -> anyhow::Result<()> {
    let actor = session.actor(actor_flag)?;
    let output = session.output;
    let case = match CaseLifecycle::new(&mut session.store, &session.sink).delete_case(&actor, case_id) {
        Ok(case) => case,
        Err(err) => return fail(output, &err),
    };

    render_mode(
        output,
        &case,
        |c, w| writeln!(w, "deleted\t{}\t{}", c.case_id, c.folder_number),
        |c, w| writeln!(w, "✓ Deleted {} (folder {})", c.case_id, c.folder_number),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(subcommand)]
        command: CaseCommand,
    }

    #[test]
    fn move_parses_state_and_reason() {
        let w = Wrapper::parse_from(["test", "move", "case-5", "withdrawn", "--reason", "moved away"]);
        let CaseCommand::Move(args) = w.command else {
            panic!("expected move");
        };
        assert_eq!(args.case, CaseId(5));
        assert_eq!(args.state, CaseState::Withdrawn);
        assert_eq!(args.reason.as_deref(), Some("moved away"));
    }

    #[test]
    fn move_rejects_unknown_state() {
        assert!(Wrapper::try_parse_from(["test", "move", "5", "archived"]).is_err());
    }

    #[test]
    fn open_defaults_to_intake() {
        let w = Wrapper::parse_from([
            "test", "open", "--group", "grp-1", "--consultant", "cons-2", "--folder", "2024-001",
        ]);
        let CaseCommand::Open(args) = w.command else {
            panic!("expected open");
        };
        assert_eq!(args.origin, CaseOrigin::Intake);
        assert_eq!(args.group, GroupId(1));
        assert_eq!(args.consultant, ConsultantId(2));
    }
}
