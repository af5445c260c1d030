use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use warden_config::{ConfigLoader, WardenConfig, WarningSeverity};
use warden_core::WardenError;
use warden_runtime::{CommandOutput, OperatorCommand, WardenRuntime};

mod console;
mod render;
mod submit;

/// 🛡️ Warden: governance loop for an autonomous agent
#[derive(Parser)]
#[command(name = "warden", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to warden.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the task scheduler and the interactive operator console
    Run,
    /// Show needs tier, balance, resource health and backlog
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent policy verdicts
    Log {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show balance, trend and recent transactions
    Economics {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show the current needs tier and its history
    Hierarchy {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show scheduled maintenance tasks and recent runs
    Tasks {
        #[arg(long)]
        json: bool,
    },
    /// Submit an action request; a dialogue continues on stdin
    Submit {
        /// What the agent should do
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,
        /// Mark the request urgent (flags execute without dialogue)
        #[arg(short, long)]
        urgent: bool,
    },
    /// Record an operator deposit
    Credit {
        amount: f64,
        #[arg(short, long, default_value = "operator credit")]
        memo: String,
    },
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Audit the configuration
    Doctor,
    /// Show version and build info
    Version,
}

impl Cli {
    pub async fn run(self) -> warden_core::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            self.log_level.clone().unwrap_or_else(|| config.logging.level.clone())
        };
        init_tracing(&config, &log_level);

        match self.command {
            Commands::Run => console::cmd_run(config).await,
            Commands::Status { json } => one_shot(config, OperatorCommand::Status, json).await,
            Commands::Log { limit, json } => one_shot(config, OperatorCommand::Log { limit }, json).await,
            Commands::Economics { limit, json } => {
                one_shot(config, OperatorCommand::Economics { limit }, json).await
            }
            Commands::Hierarchy { limit, json } => {
                one_shot(config, OperatorCommand::Hierarchy { limit }, json).await
            }
            Commands::Tasks { json } => one_shot(config, OperatorCommand::Tasks, json).await,
            Commands::Submit { description, urgent } => {
                submit::cmd_submit(config, description.join(" "), urgent).await
            }
            Commands::Credit { amount, memo } => {
                one_shot(config, OperatorCommand::Credit { amount, memo }, false).await
            }
            Commands::Config { json } => Self::cmd_config(&config, json),
            Commands::Doctor => Self::cmd_doctor(&config, &config_loader),
            Commands::Version => Self::cmd_version(),
        }
    }

    fn cmd_config(config: &WardenConfig, json: bool) -> warden_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(config).map_err(|e| WardenError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_doctor(config: &WardenConfig, loader: &ConfigLoader) -> warden_core::Result<()> {
        println!("🩺 Warden Doctor: configuration audit");
        println!("   Config: {}", loader.path().display());
        println!();

        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };
        for w in &warnings {
            println!("  {w}");
        }

        let count = |s: WarningSeverity| warnings.iter().filter(|w| w.severity == s).count();
        let available = config.router.backends.iter().filter(|b| b.available).count();
        let local = config
            .router
            .backends
            .iter()
            .filter(|b| b.available && b.local)
            .count();
        if local == 0 {
            println!("  💡 router.backends: no available local backend, so nothing routes below the budget floor");
        }

        println!();
        println!(
            "  {} backends ({} available, {} local), {} tasks, {} extra rules",
            config.router.backends.len(),
            available,
            local,
            config.scheduler.tasks.iter().filter(|t| t.enabled).count(),
            config.gate.rules.len()
        );
        println!(
            "  ⚠️  {} warnings, 💡 {} suggestions",
            count(WarningSeverity::Warning),
            count(WarningSeverity::Info) + usize::from(local == 0)
        );
        Ok(())
    }

    fn cmd_version() -> warden_core::Result<()> {
        println!("🛡️  Warden v{}", env!("CARGO_PKG_VERSION"));
        println!("   Rust edition: 2024");
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }
}

/// `RUST_LOG` wins over the resolved level; `logging.format = "json"` selects JSON lines.
fn init_tracing(config: &WardenConfig, level: &str) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level))
    };
    match config.logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .json()
            .with_target(true)
            .init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .compact()
            .with_target(false)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(false)
            .init(),
    }
}

/// Open the on-disk runtime, execute one command, print the result.
async fn one_shot(config: WardenConfig, command: OperatorCommand, json: bool) -> warden_core::Result<()> {
    let runtime = WardenRuntime::open(config)?;
    let output = runtime.execute(command, None).await?;
    if json {
        print_json(&output)
    } else {
        render::output(&output);
        Ok(())
    }
}

fn print_json(output: &CommandOutput) -> warden_core::Result<()> {
    fn pretty(value: &impl Serialize) -> warden_core::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
    match output {
        CommandOutput::Status(r) => pretty(r),
        CommandOutput::Log(r) => pretty(r),
        CommandOutput::Economics(r) => pretty(r),
        CommandOutput::Hierarchy(r) => pretty(r),
        CommandOutput::Tasks(r) => pretty(r),
        CommandOutput::Unresolved(r) => pretty(r),
        CommandOutput::Transaction(r) => pretty(r),
        CommandOutput::Dismissed(r) => pretty(r),
        CommandOutput::Backends(r) => pretty(r),
        CommandOutput::Submission(s) => {
            render::submission(s);
            Ok(())
        }
    }
}
