//! Diagnostic reporting
//!
//! The pipeline reports through an explicit [`DiagnosticReporter`] whose
//! verbosity is fixed at construction. Output goes to `tracing` events;
//! the binary decides where they are written.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::extract::{render_grid, MovementSummary};
use crate::model::Model;
use crate::solver::{SolveOutcome, SolveStatus};
use crate::spec::ProblemSpec;
use crate::types::Assignment;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Warnings and errors only
    Quiet,
    /// Run summary and outcome
    #[default]
    Normal,
    /// Adds the formulated model and placement grids
    Verbose,
}

impl Verbosity {
    /// Map `-q` / repeated `-v` flags to a level
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose > 0 {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticReporter {
    verbosity: Verbosity,
    show_grid: bool,
}

impl DiagnosticReporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            show_grid: false,
        }
    }

    /// Print current and proposed grids even at normal verbosity
    pub fn with_grid(mut self, show_grid: bool) -> Self {
        self.show_grid = show_grid;
        self
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    fn normal(&self) -> bool {
        self.verbosity >= Verbosity::Normal
    }

    fn verbose(&self) -> bool {
        self.verbosity >= Verbosity::Verbose
    }

    /// Configuration summary plus warnings collected while building the spec
    pub fn problem_summary(&self, spec: &ProblemSpec) {
        for pin in &spec.dropped_pins {
            warn!(partition = %pin.partition, broker = pin.broker, "{}", pin);
        }
        for partition in &spec.ignored_weights {
            warn!(partition = %partition, "Weight given for unknown partition, ignored");
        }
        for slot in &spec.departed {
            warn!(
                partition = %slot.partition,
                broker = slot.broker,
                "Replica is on a broker outside the broker set and will be moved"
            );
        }

        if !self.normal() {
            return;
        }
        info!(brokers = ?spec.brokers, "Reassignment configuration");
        if let Some(rf) = spec.replication_override {
            info!(new_replication_factor = rf, "Replication factor override");
        }
        info!(topics = ?spec.topics(), total_partitions = spec.partitions.len(), "Partitions");
        info!(
            total_replicas_to_assign = spec.total_target_replicas(),
            total_replica_weight = spec.target_mass,
            "Replica mass"
        );
        if !spec.pins.is_empty() {
            let pins: Vec<String> = spec.pins.iter().map(ToString::to_string).collect();
            info!(pinned = ?pins, "Pinned replicas");
        }
        if spec.bounds.is_exact() {
            info!(balanced_load = spec.bounds.min_load, "Balance band");
        } else {
            info!(
                balanced_load_min = spec.bounds.min_load,
                balanced_load_max = spec.bounds.max_load,
                "Balance band"
            );
        }
    }

    pub fn model(&self, model: &Model) {
        if self.verbose() {
            debug!(summary = %model.summary(), "Binary integer program\n{}", model);
        }
    }

    pub fn solve_outcome(&self, solver: &str, outcome: &SolveOutcome) {
        match outcome.status {
            SolveStatus::Optimal => {
                if self.normal() {
                    info!(solver, status = %outcome.status, elapsed = ?outcome.elapsed, "Optimizer finished");
                }
            }
            SolveStatus::Feasible | SolveStatus::NotSolved => {
                warn!(solver, status = %outcome.status, elapsed = ?outcome.elapsed, "Optimizer stopped at its limit");
            }
            _ => {
                error!(solver, status = %outcome.status, elapsed = ?outcome.elapsed, "Optimizer failed");
            }
        }
    }

    pub fn movement(&self, movement: &MovementSummary) {
        if !self.normal() {
            return;
        }
        info!(
            movements = movement.weighted_moves,
            replicas_added = movement.replicas_added,
            replicas_removed = movement.replicas_removed,
            partitions_changed = movement.partitions_changed,
            "Number of partition replica movements"
        );
        if movement.approximate {
            info!("Replication factor changes: the movement figure counts net replica additions and removals as half moves, not as transfers");
        }
    }

    /// Current and proposed placement grids
    pub fn placement(&self, spec: &ProblemSpec, proposed: &Assignment) {
        if !(self.show_grid || self.verbose()) || self.verbosity == Verbosity::Quiet {
            return;
        }
        info!("Current assignment\n{}", render_grid(spec, &spec.current));
        info!("Proposed assignment\n{}", render_grid(spec, proposed));
    }
}
