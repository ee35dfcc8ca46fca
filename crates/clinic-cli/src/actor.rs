//! Actor identity resolution for CLI commands.
//!
//! The resolution chain: `--actor` flag > `CLINIC_ACTOR` env > `USER` env (TTY only).
//! Mutating commands require an actor; read-only commands work without one.
//! The resolved id is then turned into an `ActorContext` by
//! `clinic_core::identity::resolve_actor`.

use std::env;

/// Errors from actor resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorResolutionError {
    /// Human-readable description.
    pub message: String,
    /// Machine error code.
    pub code: &'static str,
}

impl std::fmt::Display for ActorResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActorResolutionError {}

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn resolve_actor_id_with(cli_flag: Option<&str>, env: &dyn EnvReader) -> Option<String> {
    if let Some(actor) = cli_flag.map(str::trim).filter(|a| !a.is_empty()) {
        return Some(actor.to_string());
    }

    if let Some(val) = env.get("CLINIC_ACTOR") {
        return Some(val.trim().to_string());
    }

    // USER only counts for an interactive session.
    if env.is_tty() {
        if let Some(val) = env.get("USER") {
            return Some(val.trim().to_string());
        }
    }

    None
}

/// Resolve the acting user's id, returning an error if none is set.
///
/// Use this for mutating commands.
pub fn require_actor_id(cli_flag: Option<&str>) -> Result<String, ActorResolutionError> {
    resolve_actor_id_with(cli_flag, &RealEnv).ok_or_else(|| ActorResolutionError {
        message: "An acting user is required for this command. \
                  Set --actor or the CLINIC_ACTOR environment variable."
            .to_string(),
        code: "missing_actor",
    })
}
