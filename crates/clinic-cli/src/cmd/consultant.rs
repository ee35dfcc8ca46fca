//! `clinic consultant`: register the people the clinic advises.

use super::{Session, or_dash};
use crate::output::{CliError, fail, render_error, render_mode};
use clap::{Args, Subcommand};
use clinic_core::error::ClinicError;
use clinic_core::model::case::Consultant;
use std::io::Write;

#[derive(Subcommand, Debug)]
pub enum ConsultantCommand {
    /// Register a consultant.
    Add(ConsultantAddArgs),
}

#[derive(Args, Debug)]
pub struct ConsultantAddArgs {
    /// Full name.
    #[arg(long)]
    pub name: String,

    /// Identity document number.
    #[arg(long)]
    pub document: Option<String>,
}

pub fn run_consultant(
    command: &ConsultantCommand,
    session: &Session,
    actor_flag: Option<&str>,
) -> anyhow::Result<()> {
    match command {
        ConsultantCommand::Add(args) => run_add(args, session, actor_flag),
    }
}

fn run_add(
    args: &ConsultantAddArgs,
    session: &Session,
    actor_flag: Option<&str>,
) -> anyhow::Result<()> {
    let actor = session.actor(actor_flag)?;
    if !actor.is_administrator() {
        return fail(
            session.output,
            &ClinicError::Forbidden {
                reason: "only administrators may register consultants".to_string(),
            },
        );
    }

    let full_name = args.name.trim();
    if full_name.is_empty() {
        render_error(
            session.output,
            &CliError::with_details(
                "consultant name must not be blank",
                "pass a non-empty --name",
                "invalid_consultant",
            ),
        )?;
        anyhow::bail!("consultant name must not be blank");
    }
    let document = args
        .document
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let consultant_id = session.store.insert_consultant(full_name, document)?;
    tracing::info!(consultant_id = %consultant_id, actor = %actor.user_id, "registered consultant");

    let consultant = Consultant {
        consultant_id,
        full_name: full_name.to_string(),
        document: document.map(str::to_string),
    };
    render_mode(
        session.output,
        &consultant,
        |c, w| {
            writeln!(
                w,
                "{}\t{}\t{}",
                c.consultant_id,
                c.full_name,
                or_dash(c.document.as_deref())
            )
        },
        |c, w| writeln!(w, "✓ Registered consultant {} as {}", c.full_name, c.consultant_id),
    )
}
