#![forbid(unsafe_code)]

mod actor;
mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use clinic_core::config::resolve_config;
use cmd::Session;
use output::{OutputMode, resolve_output_mode};
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "clinic: group rosters and case lifecycle for legal clinics",
    long_about = None
)]
struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output (alias for `--format json`).
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Acting user id (skips env resolution).
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn actor_flag(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a clinic project",
        long_about = "Create .clinic/ with a default config and a migrated database, and register the first administrator.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    clinic init --admin admin --name \"Clinic Admin\""
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Register and inspect users",
        after_help = "EXAMPLES:\n    # Register an instructor\n    clinic user add u1 --name \"Ana Ruiz\" --role instructor\n\n    # Show a user's memberships\n    clinic user show u1"
    )]
    User {
        #[command(subcommand)]
        command: cmd::user::UserCommand,
    },

    #[command(
        next_help_heading = "Setup",
        about = "Register consultants",
        after_help = "EXAMPLES:\n    clinic consultant add --name \"Rosa Diaz\" --document \"CC 1020\""
    )]
    Consultant {
        #[command(subcommand)]
        command: cmd::consultant::ConsultantCommand,
    },

    #[command(
        next_help_heading = "Groups",
        about = "Create groups and edit rosters",
        after_help = "EXAMPLES:\n    # Create a group\n    clinic group create --name \"Civil A\" --responsible u1\n\n    # Set the full roster\n    clinic group roster grp-1 --responsible u2 --assistant u1 --student s1 --student s2\n\n    # Emit machine-readable output\n    clinic group show grp-1 --json"
    )]
    Group {
        #[command(subcommand)]
        command: cmd::group::GroupCommand,
    },

    #[command(
        next_help_heading = "Cases",
        about = "Open cases and move them through their lifecycle",
        after_help = "EXAMPLES:\n    # Open a case from an approved intake\n    clinic case open --group grp-1 --consultant cons-1 --folder 2024-0131\n\n    # Activate it\n    clinic case move case-1 active\n\n    # Withdraw it with a reason\n    clinic case move case-1 withdrawn --reason \"client moved away\""
    )]
    Case {
        #[command(subcommand)]
        command: cmd::case::CaseCommand,
    },

    #[command(
        next_help_heading = "Read",
        about = "List recent audit log entries",
        after_help = "EXAMPLES:\n    # Everything that happened to one case\n    clinic audit --entity case-1"
    )]
    Audit(cmd::audit::AuditArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    clinic completions bash"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CLINIC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "clinic=debug,clinic_core=debug,info"
        } else {
            "clinic=info,clinic_core=info,warn"
        })
    });

    let format = env::var("CLINIC_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let project_root = env::current_dir()?;
    let config = resolve_config(&project_root, cli.json)?;
    let output = resolve_output_mode(cli.format, &config.resolved_output);
    debug!(database = %config.database_path.display(), ?output, "resolved config");

    let actor_flag = cli.actor_flag();
    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, &config, output, &project_root),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
        Commands::User { command } => {
            let session = Session::open(&config, output)?;
            cmd::user::run_user(command, &session, actor_flag)
        }
        Commands::Consultant { command } => {
            let session = Session::open(&config, output)?;
            cmd::consultant::run_consultant(command, &session, actor_flag)
        }
        Commands::Group { command } => {
            let mut session = Session::open(&config, output)?;
            cmd::group::run_group(command, &mut session, actor_flag)
        }
        Commands::Case { command } => {
            let mut session = Session::open(&config, output)?;
            cmd::case::run_case(command, &mut session, actor_flag)
        }
        Commands::Audit(args) => {
            let session = Session::open(&config, output)?;
            cmd::audit::run_audit(args, &session)
        }
    }
}
