//! ctrun command line interface.
//!
//! - `ctrun discover` - list the tests of a target
//! - `ctrun run [FILTER]...` - run tests, optionally under a debugger
//! - `ctrun config init|show` - manage the configuration file

mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use ctrun_core::config::PROJECT_CONFIG_FILE;
use ctrun_core::exec::LaunchStore;
use ctrun_core::{
    discover, BatchRunner, CancelToken, Config, ConfigError, Inventory, Orchestrator, Profile,
    TargetKind,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "ctrun")]
#[command(author, version, about = "Discover and run CTest-registered unit tests", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file to use instead of the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Target type: primary, executable, binary or cmake
    #[arg(short, long, global = true, value_parser = parse_target)]
    target: Option<TargetKind>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tests of the target
    Discover {
        /// Print the inventory as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run tests one at a time
    Run {
        /// Fixture names or test name fragments; all tests when empty
        filters: Vec<String>,

        /// Run each test under the debugger
        #[arg(long)]
        debug: bool,

        /// Print run events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default ctrun.toml into the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

/// JSON shape of `ctrun discover --json`.
#[derive(Serialize)]
struct DiscoverOutput<'a> {
    target: TargetKind,
    #[serde(flatten)]
    inventory: &'a Inventory,
}

fn parse_target(s: &str) -> Result<TargetKind, String> {
    s.parse().map_err(|e: ConfigError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let Cli {
        config: config_path,
        target,
        verbose,
        command,
    } = Cli::parse();

    match command {
        Commands::Config(ConfigCommands::Init { force }) => {
            init_logging(None, verbose);
            config_init(force)
        }
        Commands::Config(ConfigCommands::Show) => {
            let config = load_config(config_path, verbose)?;
            let text = config
                .to_toml_string()
                .wrap_err("Failed to render configuration")?;
            print!("{text}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Discover { json } => {
            let config = load_config(config_path, verbose)?;
            let kind = target.unwrap_or(config.workspace.default_target);
            discover_command(&config, kind, json).await
        }
        Commands::Run {
            filters,
            debug,
            json,
        } => {
            let config = load_config(config_path, verbose)?;
            let kind = target.unwrap_or(config.workspace.default_target);
            run_command(&config, kind, &filters, debug, json).await
        }
    }
}

fn load_config(path: Option<PathBuf>, verbose: bool) -> Result<Config> {
    let config = Config::load_from(path.as_deref()).wrap_err("Failed to load configuration")?;
    init_logging(Some(&config), verbose);
    Ok(config)
}

fn init_logging(config: Option<&Config>, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let directive = config
                .map(|c| c.logging.filter.clone())
                .unwrap_or_else(|| ctrun_core::config::DEFAULT_LOG_FILTER.to_string());
            EnvFilter::new(directive)
        })
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn config_init(force: bool) -> Result<ExitCode> {
    let path = PathBuf::from(PROJECT_CONFIG_FILE);
    if path.exists() && !force {
        return Err(eyre!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        ));
    }
    std::fs::write(&path, Config::default_config_string())
        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn build_profile(config: &Config, kind: TargetKind) -> Result<Profile> {
    Profile::from_config(kind, config).wrap_err_with(|| format!("Target '{kind}' is not usable"))
}

fn orchestrator(config: &Config) -> Orchestrator {
    Orchestrator::new(LaunchStore::new(config.launch.clone()))
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_interrupt(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

async fn discover_command(config: &Config, kind: TargetKind, json: bool) -> Result<ExitCode> {
    let profile = build_profile(config, kind)?;
    let orchestrator = orchestrator(config);
    let cancel = CancelToken::new();
    cancel_on_interrupt(cancel.clone());

    let inventory = discover(&profile, &orchestrator, &cancel).await;
    if json {
        let output = DiscoverOutput {
            target: kind,
            inventory: &inventory,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        report::print_inventory(&inventory);
    }

    if inventory.is_empty() && !inventory.errors.is_empty() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_command(
    config: &Config,
    kind: TargetKind,
    filters: &[String],
    debug: bool,
    json: bool,
) -> Result<ExitCode> {
    let profile = build_profile(config, kind)?;
    if debug && !kind.supports_debug() {
        return Err(eyre!("Target '{kind}' cannot be debugged"));
    }
    let orchestrator = orchestrator(config);
    let cancel = CancelToken::new();
    cancel_on_interrupt(cancel.clone());

    let inventory = discover(&profile, &orchestrator, &cancel).await;
    for err in &inventory.errors {
        tracing::warn!("{err}");
    }
    let tests = inventory.select(filters);
    if tests.is_empty() {
        return Err(eyre!("No tests match {:?}", filters));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report::consume_events(rx, tests.len(), json));

    let summary = BatchRunner::new(&profile, &orchestrator)
        .debug(debug)
        .run(&tests, &cancel, &tx)
        .await;
    drop(tx);
    reporter.await?;

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        report::print_summary(&summary);
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
