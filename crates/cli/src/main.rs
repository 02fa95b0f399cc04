// relink CLI - migrate legacy SQL dumps into a new system, idempotently

mod exit_codes;
mod migrate;
mod status;
mod validate;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use relink_engine::{ConfigError, EngineError};
use relink_io::{ManualOverrides, MappingError, OverrideError};

use exit_codes::{
    EXIT_ERROR, EXIT_INVALID_CONFIG, EXIT_STEP_ABORTED, EXIT_STORE, EXIT_SUCCESS, EXIT_UNMATCHED,
    EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "relink")]
#[command(about = "Migrate legacy SQL dumps into a new system, resumably and idempotently")]
#[command(version)]
struct Cli {
    /// Migration config (defaults to ./relink.toml, else the built-in plan)
    #[arg(long, short = 'c', global = true, env = "RELINK_CONFIG")]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one step, or every step in dependency order
    #[command(after_help = "\
Examples:
  relink migrate all                       # dry-run (default)
  relink migrate all --execute
  relink migrate users --execute --limit 100 --offset 200
  relink migrate users --strategy email --manual-map overrides.csv
  relink migrate all --execute --json")]
    Migrate(migrate::MigrateArgs),

    /// Reconcile linked steps without writing anything
    #[command(after_help = "\
Examples:
  relink validate
  relink validate --fix --json
  relink validate --strategy domain --manual-map overrides.csv")]
    Validate(validate::ValidateArgs),

    /// Print the step plan in execution order
    Steps,

    /// Print mapping counts per entity type
    Status {
        /// Output JSON to stdout instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Migrate(args) => migrate::cmd_migrate(config, args),
        Commands::Validate(args) => validate::cmd_validate(config, args),
        Commands::Steps => status::cmd_steps(config),
        Commands::Status { json } => status::cmd_status(config, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                let label = if code == EXIT_UNMATCHED { "warning" } else { "error" };
                eprintln!("{label}: {message}");
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {hint}");
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

/// Override file from `--manual-map`, or an empty table.
pub(crate) fn load_overrides(path: Option<&PathBuf>) -> Result<ManualOverrides, CliError> {
    match path {
        Some(p) => ManualOverrides::load(p).map_err(|e| {
            let hint = matches!(e, OverrideError::MissingHeader { .. })
                .then(|| "the first line must be the header: key,target_id".to_string());
            CliError {
                code: EXIT_USAGE,
                message: e.to_string(),
                hint,
            }
        }),
        None => Ok(ManualOverrides::new()),
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    pub fn config(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::Cycle(_) | ConfigError::UnknownDependency { .. } => {
                Some("check depends_on in [[steps]]; `relink steps` prints the plan".to_string())
            }
            _ => None,
        };
        Self { code: EXIT_INVALID_CONFIG, message: err.to_string(), hint }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::new(EXIT_STORE, err.to_string())
    }

    pub fn mapping(err: MappingError) -> Self {
        Self::store(err)
    }

    /// Create error from engine error with proper exit code.
    pub fn engine(err: EngineError) -> Self {
        match err {
            EngineError::Config(e) => Self::config(e),
            e @ EngineError::MissingDump { .. } => Self::new(EXIT_STEP_ABORTED, e.to_string()),
            e @ (EngineError::UnknownStep(_) | EngineError::NotLinked(_)) => {
                Self::new(EXIT_USAGE, e.to_string()).with_hint("`relink steps` lists the step names")
            }
            e @ EngineError::Override(_) => Self::new(EXIT_USAGE, e.to_string()),
            e @ (EngineError::Mapping(_) | EngineError::Target(_)) => Self::store(e),
            e @ EngineError::Report(_) => Self::general(e.to_string()),
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
