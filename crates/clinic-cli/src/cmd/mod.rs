pub mod audit;
pub mod case;
pub mod completions;
pub mod consultant;
pub mod group;
pub mod init;
pub mod user;

use crate::actor;
use crate::output::{CliError, OutputMode, fail, render_error};
use chrono::{DateTime, Local, Utc};
use clinic_core::config::EffectiveConfig;
use clinic_core::db::SqliteStore;
use clinic_core::event::FanoutSink;
use clinic_core::identity::resolve_actor;
use clinic_core::model::actor::ActorContext;
use clinic_core::model::ids::UserId;

/// An open store plus the event sinks selected by config.
pub struct Session {
    pub store: SqliteStore,
    pub sink: FanoutSink,
    pub output: OutputMode,
}

impl Session {
    /// Open the configured database. Fails with a hint when `clinic init`
    /// has not been run.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is missing or cannot be opened.
    pub fn open(config: &EffectiveConfig, output: OutputMode) -> anyhow::Result<Self> {
        let path = &config.database_path;
        if !path.exists() {
            render_error(
                output,
                &CliError::with_details(
                    format!("clinic database not found at {}", path.display()),
                    "run `clinic init --admin <id> --name <name>` first",
                    "database_missing",
                ),
            )?;
            anyhow::bail!("clinic database not found");
        }

        let store = SqliteStore::open(path, config.clinic.database.busy_timeout())?;
        let sink = config.event_sink()?;
        Ok(Self {
            store,
            sink,
            output,
        })
    }

    /// Resolve the acting user for a mutating command.
    ///
    /// # Errors
    ///
    /// Returns an error if no actor is set, the user is unknown, or the user
    /// is deactivated.
    pub fn actor(&self, actor_flag: Option<&str>) -> anyhow::Result<ActorContext> {
        let id = match actor::require_actor_id(actor_flag) {
            Ok(id) => id,
            Err(e) => {
                render_error(
                    self.output,
                    &CliError::with_details(&e.message, "Set --actor or CLINIC_ACTOR", e.code),
                )?;
                anyhow::bail!("{}", e.message);
            }
        };

        match resolve_actor(&self.store, &UserId::new(id)) {
            Ok(actor) => Ok(actor),
            Err(err) => fail(self.output, &err),
        }
    }
}

pub fn local_datetime(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}
