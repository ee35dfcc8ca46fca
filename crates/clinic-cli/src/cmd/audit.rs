//! `clinic audit`: recent entries of the audit log, newest first.

use super::{Session, local_datetime};
use crate::output::{pretty_section, render_mode};
use clap::Args;
use clinic_core::event::{EventKind, list_audit};
use std::io::Write;

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Only entries for this entity, e.g. `grp-3` or `case-12`.
    #[arg(long)]
    pub entity: Option<String>,

    /// Only entries of this kind, e.g. `roster-changed`.
    #[arg(long)]
    pub kind: Option<EventKind>,

    /// Maximum number of entries.
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

pub fn run_audit(args: &AuditArgs, session: &Session) -> anyhow::Result<()> {
    let mut entries = list_audit(
        session.store.connection(),
        args.entity.as_deref().map(str::trim),
        args.limit,
    )?;
    if let Some(kind) = args.kind {
        entries.retain(|entry| entry.kind == kind);
    }

    render_mode(
        session.output,
        &entries,
        |entries, w| {
            for e in entries {
                writeln!(w, "{}\t{}\t{}\t{}", e.entry_id, e.at.to_rfc3339(), e.kind, e.entity_id)?;
            }
            Ok(())
        },
        |entries, w| {
            pretty_section(w, &format!("Audit log ({})", entries.len()))?;
            for e in entries {
                let actor = e.detail.get("actor").and_then(|a| a.as_str()).unwrap_or("-");
                writeln!(
                    w,
                    "{}  {:<20} {:<10} by {}",
                    local_datetime(e.at),
                    e.kind.as_str(),
                    e.entity_id,
                    actor
                )?;
            }
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: AuditArgs,
    }

    #[test]
    fn audit_parses_kind() {
        let w = Wrapper::parse_from(["test", "--kind", "case-state-changed", "--limit", "5"]);
        assert_eq!(w.args.kind, Some(EventKind::CaseStateChanged));
        assert_eq!(w.args.limit, 5);
    }

    #[test]
    fn audit_rejects_unknown_kind() {
        assert!(Wrapper::try_parse_from(["test", "--kind", "case-archived"]).is_err());
    }
}
