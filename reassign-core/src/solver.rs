//! Solver port
//!
//! The pipeline only sees [`Solver`]: submit a [`Model`], get a status and,
//! when a solution exists, one value per variable. Backends translate the
//! model into their own API.

use good_lp::{
    default_solver, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel,
};
use std::fmt;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::model::{Bound, Model};

/// Resource limits handed to a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveLimits {
    /// Wall-clock budget for one solve; `None` waits indefinitely
    pub time_limit: Option<Duration>,
}

impl SolveLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_time_limit(time_limit: Duration) -> Self {
        Self {
            time_limit: Some(time_limit),
        }
    }
}

/// Solver status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveStatus {
    /// Proven optimal
    Optimal,
    /// Limit reached with an incumbent that is not proven optimal
    Feasible,
    Infeasible,
    Unbounded,
    /// Limit reached before any feasible solution was found
    NotSolved,
    Error(String),
}

impl SolveStatus {
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "Optimal"),
            SolveStatus::Feasible => write!(f, "Feasible (not proven optimal)"),
            SolveStatus::Infeasible => write!(f, "Infeasible"),
            SolveStatus::Unbounded => write!(f, "Unbounded"),
            SolveStatus::NotSolved => write!(f, "Not Solved"),
            SolveStatus::Error(msg) => write!(f, "Error ({})", msg),
        }
    }
}

/// What a backend returns
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// One value per model variable, present when the status has a solution
    pub values: Option<Vec<f64>>,
    pub elapsed: Duration,
}

impl SolveOutcome {
    pub fn without_solution(status: SolveStatus, elapsed: Duration) -> Self {
        Self {
            status,
            values: None,
            elapsed,
        }
    }
}

/// A mixed-integer programming backend
pub trait Solver {
    fn name(&self) -> &str;

    fn solve(&self, model: &Model, limits: &SolveLimits) -> SolveOutcome;
}

/// `good_lp` adapter using the pure-Rust `microlp` branch-and-bound engine.
///
/// The engine has no native time budget, so a limited solve runs on a
/// worker thread and the caller stops waiting at the deadline. The engine
/// cannot be interrupted either: a worker abandoned at the deadline keeps
/// one core busy until its solve finishes or the process exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpSolver;

impl GoodLpSolver {
    pub fn new() -> Self {
        Self
    }

    fn solve_blocking(model: &Model) -> (SolveStatus, Option<Vec<f64>>) {
        let mut vars = ProblemVariables::new();
        let handles: Vec<_> = model
            .variables
            .iter()
            .map(|v| vars.add(variable().integer().min(v.lower).max(v.upper)))
            .collect();

        let mut objective = Expression::with_capacity(model.variables.len());
        for (var, coef) in model.objective.movement.terms() {
            objective.add_mul(*coef, handles[var.0]);
        }
        if let Some(secondary) = &model.objective.secondary {
            for (var, coef) in secondary.terms() {
                objective.add_mul(*coef, handles[var.0]);
            }
        }

        let mut problem = vars.minimise(objective).using(default_solver);
        for constraint in &model.constraints {
            let mut expr = Expression::with_capacity(constraint.expr.terms().len());
            for (var, coef) in constraint.expr.terms() {
                expr.add_mul(*coef, handles[var.0]);
            }
            match constraint.bound {
                Bound::Equal(rhs) => {
                    problem = problem.with(expr.eq(rhs));
                }
                Bound::Range { min, max } => {
                    problem = problem.with(expr.clone().geq(min));
                    problem = problem.with(expr.leq(max));
                }
                Bound::AtMost(max) => {
                    problem = problem.with(expr.leq(max));
                }
            }
        }

        match problem.solve() {
            Ok(solution) => {
                let values = handles.iter().map(|h| solution.value(*h)).collect();
                (SolveStatus::Optimal, Some(values))
            }
            Err(ResolutionError::Infeasible) => (SolveStatus::Infeasible, None),
            Err(ResolutionError::Unbounded) => (SolveStatus::Unbounded, None),
            Err(e) => (SolveStatus::Error(e.to_string()), None),
        }
    }
}

impl Solver for GoodLpSolver {
    fn name(&self) -> &str {
        "good_lp/microlp"
    }

    fn solve(&self, model: &Model, limits: &SolveLimits) -> SolveOutcome {
        let started = Instant::now();
        debug!(summary = %model.summary(), ?limits, "Submitting model to solver");

        let Some(time_limit) = limits.time_limit else {
            let (status, values) = Self::solve_blocking(model);
            return SolveOutcome {
                status,
                values,
                elapsed: started.elapsed(),
            };
        };

        let (tx, rx) = mpsc::channel();
        let owned = model.clone();
        let spawned = thread::Builder::new()
            .name("reassign-solver".to_string())
            .spawn(move || {
                let _ = tx.send(Self::solve_blocking(&owned));
            });
        if let Err(e) = spawned {
            return SolveOutcome::without_solution(
                SolveStatus::Error(format!("failed to start solver thread: {}", e)),
                started.elapsed(),
            );
        }

        match rx.recv_timeout(time_limit) {
            Ok((status, values)) => SolveOutcome {
                status,
                values,
                elapsed: started.elapsed(),
            },
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(?time_limit, "Solver time limit reached");
                SolveOutcome::without_solution(SolveStatus::NotSolved, started.elapsed())
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                info!("Solver thread ended without a result");
                SolveOutcome::without_solution(
                    SolveStatus::Error("solver thread terminated unexpectedly".to_string()),
                    started.elapsed(),
                )
            }
        }
    }
}
