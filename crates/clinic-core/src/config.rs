use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::event::{AuditLogSink, FanoutSink, TracingSink};

/// Directory under the project root that holds the database and config.
pub const CLINIC_DIR: &str = ".clinic";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Relative paths are resolved against the project root.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Write events to the `audit_log` table.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Also log every event through `tracing`.
    #[serde(default = "default_true")]
    pub trace_events: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            trace_events: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub clinic: ClinicConfig,
    pub user: UserConfig,
    pub resolved_output: String,
    pub database_path: PathBuf,
}

impl EffectiveConfig {
    /// Sinks selected by the `[audit]` section.
    ///
    /// # Errors
    ///
    /// Returns an error if the audit log connection cannot be opened.
    pub fn event_sink(&self) -> Result<FanoutSink> {
        let mut sink = FanoutSink::new();
        if self.clinic.audit.enabled {
            sink = sink.with(AuditLogSink::open(
                &self.database_path,
                self.clinic.database.busy_timeout(),
            )?);
        }
        if self.clinic.audit.trace_events {
            sink = sink.with(TracingSink);
        }
        Ok(sink)
    }
}

/// Load `<root>/.clinic/config.toml`, or defaults when it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_clinic_config(project_root: &Path) -> Result<ClinicConfig> {
    let path = project_root.join(CLINIC_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ClinicConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ClinicConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load the per-user preferences file, or defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("clinic/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Merge project config, user config and environment overrides.
///
/// # Errors
///
/// Returns an error if either config file is malformed.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let clinic = load_clinic_config(project_root)?;
    let user = load_user_config()?;

    let resolved_output = resolve_output(cli_json, user.output.clone(), env::var("FORMAT").ok());
    let database_path = resolve_database_path(
        project_root,
        &clinic.database,
        env::var_os("CLINIC_DB").map(PathBuf::from),
    );

    Ok(EffectiveConfig {
        clinic,
        user,
        resolved_output,
        database_path,
    })
}

fn resolve_database_path(
    project_root: &Path,
    database: &DatabaseConfig,
    env_db: Option<PathBuf>,
) -> PathBuf {
    let path = env_db
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| database.path.clone());
    if path.is_absolute() {
        path
    } else {
        project_root.join(path)
    }
}

fn resolve_output(
    cli_json: bool,
    user_output: Option<String>,
    env_format: Option<String>,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from(CLINIC_DIR).join("clinic.sqlite3")
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_true() -> bool {
    true
}
