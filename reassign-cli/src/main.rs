//! Kafka reassignment optimizer CLI
//!
//! Proposes minimum-movement partition reassignment plans.
//!
//! # Commands
//! - `propose` - Compute a reassignment plan from a request document
//! - `check` - Validate an existing plan against a request
//! - `config` - Show or initialize configuration
//!
//! # Configuration
//! Config file: ~/.kafka-reassign/config.toml
//! Environment: REASSIGN_TIME_LIMIT_SECS, REASSIGN_MIN_FACTOR, REASSIGN_MAX_FACTOR,
//! REASSIGN_LEADER_STRATEGY, REASSIGN_LEADER_SEED, REASSIGN_TIE_BREAK
//!
//! # Exit codes
//! 0 success, 2 invalid input, 3 infeasible, 4 solver limit exceeded, 1 other

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use console::style;
use reassign_core::{Error, LeaderStrategyKind, OptimizerConfig, Verbosity};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod symbols;

use commands::{check::CheckConfig, propose::Overrides, propose::ProposeConfig};

#[derive(Parser)]
#[command(name = "kafka-reassign-optimizer")]
#[command(about = "Minimum-movement Kafka partition reassignment planner")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.kafka-reassign/config.toml)
    #[arg(long, global = true, env = "REASSIGN_CONFIG")]
    config: Option<PathBuf>,

    /// More output; repeat for debug logging
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a reassignment plan
    Propose {
        /// Request document (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Plan output (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the plan
        #[arg(long)]
        pretty: bool,

        /// Solver time limit in seconds
        #[arg(short, long)]
        time_limit: Option<u64>,

        /// Leader selection: random, preserve or sorted
        #[arg(long)]
        leader: Option<LeaderStrategyKind>,

        /// Seed for random leader selection
        #[arg(long)]
        seed: Option<u64>,

        /// Prefer lower-numbered brokers among equally cheap plans
        #[arg(long)]
        tie_break: bool,

        /// Write the best plan found if the time limit is reached
        #[arg(long)]
        accept_suboptimal: bool,

        /// Log current and proposed placement grids
        #[arg(long)]
        grid: bool,
    },

    /// Validate an existing plan against a request
    Check {
        /// Request document
        #[arg(short, long)]
        input: PathBuf,

        /// Plan to validate
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show effective configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    init_tracing(verbosity);

    match run(cli, verbosity) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style(symbols::CROSS).red(), e);
            exit_code(&e)
        }
    }
}

/// Log to stderr; RUST_LOG overrides the level picked from -v/-q
fn init_tracing(verbosity: Verbosity) {
    let level = match verbosity {
        Verbosity::Quiet => LevelFilter::WARN,
        Verbosity::Normal => LevelFilter::INFO,
        Verbosity::Verbose => LevelFilter::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli, verbosity: Verbosity) -> Result<()> {
    match cli.command {
        Commands::Propose {
            input,
            output,
            pretty,
            time_limit,
            leader,
            seed,
            tie_break,
            accept_suboptimal,
            grid,
        } => {
            let settings = config::load_config(cli.config.as_deref())?;
            let config = ProposeConfig {
                input,
                output,
                pretty,
                overrides: Overrides {
                    time_limit_secs: time_limit,
                    leader_strategy: leader,
                    leader_seed: seed,
                    tie_break,
                    accept_suboptimal,
                    show_grid: grid,
                },
            };
            commands::propose(settings, verbosity, config)?;
        }

        Commands::Check { input, plan } => {
            let settings = config::load_config(cli.config.as_deref())?;
            commands::check(&settings, CheckConfig { input, plan })?;
        }

        Commands::Config { command } => {
            handle_config_command(command, cli.config.as_deref())?;
        }
    }

    Ok(())
}

/// Map library failures to distinct exit codes
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<Error>() {
        Some(Error::InvalidInput { .. }) => ExitCode::from(2),
        Some(Error::Infeasible { .. }) => ExitCode::from(3),
        Some(Error::SolverLimitExceeded { .. }) => ExitCode::from(4),
        _ => ExitCode::FAILURE,
    }
}

/// Handle config subcommands
fn handle_config_command(command: Option<ConfigCommands>, explicit: Option<&Path>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let cfg = config::load_config(explicit)?;
            println!();
            println!("{}", style("Optimizer Configuration").bold().underlined());
            println!();
            print!("{}", cfg.to_toml_string()?);
            println!();

            let path = config::resolve_path(explicit)?;
            println!("{} {}", style("Config file:").dim(), path.display());
            if !path.exists() {
                println!(
                    "{} Run '{}' to create it",
                    style("(not created yet)").yellow(),
                    style("kafka-reassign-optimizer config init").green()
                );
            }
        }

        Some(ConfigCommands::Path) => {
            println!("{}", config::resolve_path(explicit)?.display());
        }

        Some(ConfigCommands::Init { force }) => {
            let path = config::resolve_path(explicit)?;
            if path.exists() && !force {
                println!(
                    "{} Config file already exists at {}",
                    style(symbols::WARN).yellow(),
                    path.display()
                );
                println!("Use --force to overwrite");
                return Ok(());
            }

            config::save_config(&OptimizerConfig::default(), &path)?;
            println!(
                "{} Config file created at {}",
                style(symbols::CHECK).green(),
                path.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_propose_flags() {
        let cli = Cli::try_parse_from([
            "kafka-reassign-optimizer",
            "-vv",
            "propose",
            "--input",
            "request.json",
            "--leader",
            "preserve",
            "--time-limit",
            "30",
            "--tie-break",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Propose {
                input,
                leader,
                time_limit,
                tie_break,
                ..
            } => {
                assert_eq!(input, Some(PathBuf::from("request.json")));
                assert_eq!(leader, Some(LeaderStrategyKind::Preserve));
                assert_eq!(time_limit, Some(30));
                assert!(tie_break);
            }
            _ => panic!("expected propose"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["kafka-reassign-optimizer", "-q", "-v", "config"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_exit_codes() {
        let invalid = anyhow::Error::new(Error::invalid_input("brokers", "empty"));
        assert_eq!(exit_code(&invalid), ExitCode::from(2));

        let infeasible = anyhow::Error::new(Error::Infeasible { hints: Vec::new() });
        assert_eq!(exit_code(&infeasible), ExitCode::from(3));

        let limit = anyhow::Error::new(Error::SolverLimitExceeded {
            limit: None,
            best: None,
        })
        .context("while proposing");
        assert_eq!(exit_code(&limit), ExitCode::from(4));

        assert_eq!(exit_code(&anyhow::anyhow!("io")), ExitCode::FAILURE);
    }
}
