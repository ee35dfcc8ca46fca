use crate::output::{OutputMode, pretty_kv, render_mode};
use anyhow::{Context as _, Result};
use clap::Args;
use clinic_core::config::{CLINIC_DIR, EffectiveConfig};
use clinic_core::db::SqliteStore;
use clinic_core::model::actor::{SystemRole, User};
use clinic_core::model::ids::UserId;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// User id of the first administrator.
    #[arg(long)]
    pub admin: String,

    /// Display name of the first administrator.
    #[arg(long)]
    pub name: String,

    /// Rewrite the config even if `.clinic/` already exists.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[database]\n\
    path = \".clinic/clinic.sqlite3\"\n\
    busy_timeout_ms = 5000\n\
    \n\
    [audit]\n\
    enabled = true\n\
    trace_events = true\n";

const GITIGNORE: &str = "*.sqlite3\n*.sqlite3-wal\n*.sqlite3-shm\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    ok: bool,
    database: String,
    admin: UserId,
    admin_created: bool,
}

/// Execute `clinic init`. Creates the project skeleton and the database:
///
/// ```text
/// .clinic/
///   config.toml       (default project config)
///   .gitignore        (database files)
///   clinic.sqlite3    (migrated store with the first administrator)
/// ```
///
/// # Errors
///
/// Returns an error if `.clinic/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(
    args: &InitArgs,
    config: &EffectiveConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let clinic_dir = project_root.join(CLINIC_DIR);

    if clinic_dir.exists() && !args.force {
        anyhow::bail!(".clinic/ already exists. Use `clinic init --force` to reinitialize.");
    }

    let admin_id = UserId::new(args.admin.as_str());
    if admin_id.is_blank() {
        anyhow::bail!("--admin must not be blank");
    }

    std::fs::create_dir_all(&clinic_dir)
        .with_context(|| format!("Failed to create {}", clinic_dir.display()))?;

    let config_path = clinic_dir.join("config.toml");
    std::fs::write(&config_path, CONFIG_TOML)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = clinic_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let store = SqliteStore::open(&config.database_path, config.clinic.database.busy_timeout())?;
    let admin_created = if store.user(&admin_id)?.is_none() {
        store.insert_user(&User::new(
            admin_id.clone(),
            args.name.trim(),
            SystemRole::Administrator,
        ))?;
        true
    } else {
        false
    };
    tracing::info!(
        database = %config.database_path.display(),
        admin = %admin_id,
        admin_created,
        "initialized clinic project"
    );

    let result = InitOutput {
        ok: true,
        database: config.database_path.display().to_string(),
        admin: admin_id,
        admin_created,
    };

    render_mode(
        output,
        &result,
        |r, w| writeln!(w, "initialized {} admin={}", r.database, r.admin),
        |r, w| {
            writeln!(w, "✓ Initialized .clinic/ project structure.")?;
            writeln!(w)?;
            pretty_kv(w, "Database", &r.database)?;
            pretty_kv(w, "Config", ".clinic/config.toml")?;
            pretty_kv(w, "Admin", r.admin.as_str())?;
            writeln!(w)?;
            writeln!(w, "Next steps:")?;
            writeln!(w, "  Set the acting user for mutations:")?;
            writeln!(w, "    export CLINIC_ACTOR={}", r.admin)?;
            writeln!(w)?;
            writeln!(w, "  Register instructors and students:")?;
            writeln!(w, "    clinic user add u1 --name \"Ana Ruiz\" --role instructor")
        },
    )
}
