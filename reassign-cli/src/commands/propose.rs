//! Propose Command
//!
//! Reads a reassignment request and writes the proposed plan.

use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use reassign_core::{
    DiagnosticReporter, Error, InputDocument, LeaderStrategyKind, Optimizer, OptimizerConfig,
    Reassignment, ReassignmentPlan, Verbosity,
};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

/// Propose configuration
pub struct ProposeConfig {
    /// Input document; stdin when unset or `-`
    pub input: Option<PathBuf>,
    /// Output document; stdout when unset or `-`
    pub output: Option<PathBuf>,
    pub pretty: bool,
    pub overrides: Overrides,
}

/// Command-line values layered over the loaded configuration
#[derive(Debug, Default)]
pub struct Overrides {
    pub time_limit_secs: Option<u64>,
    pub leader_strategy: Option<LeaderStrategyKind>,
    pub leader_seed: Option<u64>,
    pub tie_break: bool,
    pub accept_suboptimal: bool,
    pub show_grid: bool,
}

impl Overrides {
    pub fn apply(&self, mut config: OptimizerConfig) -> OptimizerConfig {
        if let Some(secs) = self.time_limit_secs {
            config.time_limit_secs = Some(secs);
        }
        if let Some(strategy) = self.leader_strategy {
            config.leader_strategy = strategy;
        }
        if let Some(seed) = self.leader_seed {
            config.leader_seed = Some(seed);
        }
        config.tie_break |= self.tie_break;
        config.accept_suboptimal |= self.accept_suboptimal;
        config.show_grid |= self.show_grid;
        config
    }
}

/// Run propose command
pub fn run(settings: OptimizerConfig, verbosity: Verbosity, config: ProposeConfig) -> Result<()> {
    let settings = config.overrides.apply(settings);
    settings.validate()?;

    let doc = read_input(config.input.as_deref())?;
    let reporter = DiagnosticReporter::new(verbosity).with_grid(settings.show_grid);
    let optimizer = Optimizer::from_config(&settings, reporter);

    match optimizer.run_document(&doc) {
        Ok(reassignment) => {
            write_plan(&reassignment.plan, config.output.as_deref(), config.pretty)?;
            print_summary(&reassignment, config.output.as_deref(), verbosity);
            Ok(())
        }
        Err(Error::SolverLimitExceeded {
            limit,
            best: Some(best),
        }) if settings.accept_suboptimal => {
            write_plan(&best.plan, config.output.as_deref(), config.pretty)?;
            eprintln!(
                "{} Wrote the best plan found; it is not proven optimal",
                style(symbols::WARN).yellow()
            );
            Err(Error::SolverLimitExceeded {
                limit,
                best: Some(best),
            }
            .into())
        }
        Err(e) => Err(e.into()),
    }
}

fn is_stdio(path: Option<&Path>) -> bool {
    path.map_or(true, |p| p.as_os_str() == "-")
}

/// Read the input document from a file or stdin
pub fn read_input(path: Option<&Path>) -> Result<InputDocument> {
    match path {
        Some(path) if !is_stdio(Some(path)) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Ok(InputDocument::from_reader(BufReader::new(file))?)
        }
        _ => Ok(InputDocument::from_reader(io::stdin().lock())?),
    }
}

/// Write the plan to a file or stdout
pub fn write_plan(plan: &ReassignmentPlan, path: Option<&Path>, pretty: bool) -> Result<()> {
    let json = plan.to_json(pretty)?;
    match path {
        Some(path) if !is_stdio(Some(path)) => {
            std::fs::write(path, format!("{}\n", json))
                .with_context(|| format!("Failed to write plan {}", path.display()))?;
        }
        _ => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", json).context("Failed to write plan to stdout")?;
        }
    }
    Ok(())
}

fn print_summary(reassignment: &Reassignment, output: Option<&Path>, verbosity: Verbosity) {
    if verbosity == Verbosity::Quiet {
        return;
    }
    let movement = &reassignment.movement;
    if movement.is_noop() {
        eprintln!(
            "{} Current placement is already balanced, nothing to move",
            style(symbols::CHECK).green()
        );
    } else {
        eprintln!(
            "{} {} replica movements across {} partitions{}",
            style(symbols::CHECK).green(),
            style(movement.weighted_moves).cyan(),
            style(movement.partitions_changed).cyan(),
            if movement.approximate {
                style(" (approximate: replication factor changes)").dim().to_string()
            } else {
                String::new()
            }
        );
    }
    if let Some(path) = output.filter(|p| !is_stdio(Some(*p))) {
        eprintln!("  Plan written to {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = r#"{
        "brokers": "1,2,3,4",
        "balance_parameters": {"min_factor": 1.0, "max_factor": 1.0},
        "partitions": {"version": 1, "partitions": [
            {"topic": "t", "partition": 0, "replicas": [1]},
            {"topic": "t", "partition": 1, "replicas": [1]},
            {"topic": "t", "partition": 2, "replicas": [1]},
            {"topic": "t", "partition": 3, "replicas": [1]}
        ]}
    }"#;

    #[test]
    fn test_overrides_layer_over_config() {
        let overrides = Overrides {
            time_limit_secs: Some(5),
            leader_strategy: Some(LeaderStrategyKind::Sorted),
            tie_break: true,
            ..Default::default()
        };
        let base = OptimizerConfig {
            leader_seed: Some(7),
            ..Default::default()
        };
        let merged = overrides.apply(base);
        assert_eq!(merged.time_limit_secs, Some(5));
        assert_eq!(merged.leader_strategy, LeaderStrategyKind::Sorted);
        assert_eq!(merged.leader_seed, Some(7));
        assert!(merged.tie_break);
        assert!(!merged.accept_suboptimal);
    }

    #[test]
    fn test_propose_writes_plan_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("request.json");
        let output = dir.path().join("plan.json");
        std::fs::write(&input, REQUEST).unwrap();

        let config = ProposeConfig {
            input: Some(input),
            output: Some(output.clone()),
            pretty: true,
            overrides: Overrides {
                leader_strategy: Some(LeaderStrategyKind::Sorted),
                ..Default::default()
            },
        };
        run(OptimizerConfig::default(), Verbosity::Quiet, config).unwrap();

        let plan = ReassignmentPlan::from_reader(File::open(&output).unwrap()).unwrap();
        assert_eq!(plan.version, 1);
        assert_eq!(plan.partitions.len(), 4);
        let mut brokers: Vec<i32> = plan.partitions.iter().map(|p| p.replicas[0]).collect();
        brokers.sort();
        assert_eq!(brokers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_invalid_request_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("request.json");
        std::fs::write(&input, r#"{"brokers": "1,x"}"#).unwrap();

        let config = ProposeConfig {
            input: Some(input),
            output: Some(dir.path().join("plan.json")),
            pretty: false,
            overrides: Overrides::default(),
        };
        let err = run(OptimizerConfig::default(), Verbosity::Quiet, config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidInput { .. })
        ));
    }
}
