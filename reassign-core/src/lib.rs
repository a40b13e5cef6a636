//! Kafka partition reassignment optimizer
//!
//! Proposes a new placement of partition replicas across a broker set that
//! moves as little replica weight as possible while keeping every broker's
//! load inside a balance band. This crate provides:
//! - Input normalization into a validated [`ProblemSpec`]
//! - A binary integer program over replica slots ([`formulate`])
//! - A pluggable [`Solver`] port with a pure-Rust backend
//! - Extraction, verification and movement accounting
//! - Leader ordering of the proposed replica lists
//! - Infeasibility diagnosis and plan checking

pub mod config;
pub mod diagnose;
pub mod error;
pub mod extract;
pub mod input;
pub mod leader;
pub mod model;
pub mod optimizer;
pub mod report;
pub mod solver;
pub mod spec;
pub mod types;
pub mod verify;

pub use config::OptimizerConfig;
pub use diagnose::{diagnose, InfeasibilityHint};
pub use error::{Error, Result, UnresolvablePin};
pub use extract::{extract, render_grid, MovementSummary};
pub use input::{InputDocument, PartitionEntry, ReassignmentPlan, PLAN_VERSION};
pub use leader::{
    LeaderSelectionStrategy, LeaderStrategyKind, PreserveLeader, RandomLeader, SortedReplicas,
};
pub use model::{formulate, Model, TieBreak};
pub use optimizer::{Optimizer, Reassignment};
pub use report::{DiagnosticReporter, Verbosity};
pub use solver::{GoodLpSolver, SolveLimits, SolveOutcome, SolveStatus, Solver};
pub use spec::{BalanceBounds, BalanceFactors, ProblemSpec, SpecBuilder};
pub use types::{Assignment, BrokerId, PartitionKey, ReplicaSlot};
pub use verify::{check_plan, verify, PlanCheck, Violation};

/// Default balance band: each broker may carry between 90% and 110% of
/// the mean load.
///
/// Override per document via `balance_parameters`, or globally via
/// REASSIGN_MIN_FACTOR / REASSIGN_MAX_FACTOR.
pub const DEFAULT_MIN_FACTOR: f64 = 0.9;
pub const DEFAULT_MAX_FACTOR: f64 = 1.1;
