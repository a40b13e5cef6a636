//! Reassignment pipeline
//!
//! spec → formulate → solve → extract → order replicas → plan.
//! Strictly sequential, one model in flight, no retries. With a tie-break
//! the solve has two stages: minimum movement first, then the tie-break
//! among placements of that movement.

use std::fmt;
use tracing::{debug, info, instrument, warn};

use crate::config::OptimizerConfig;
use crate::diagnose::diagnose;
use crate::error::{Error, Result};
use crate::extract::{extract, MovementSummary};
use crate::input::{InputDocument, PartitionEntry, ReassignmentPlan};
use crate::leader::LeaderSelectionStrategy;
use crate::model::{formulate, Model, TieBreak};
use crate::report::DiagnosticReporter;
use crate::solver::{GoodLpSolver, SolveLimits, SolveOutcome, SolveStatus, Solver};
use crate::spec::{BalanceFactors, ProblemSpec, SpecBuilder};
use crate::types::Assignment;

/// Objective comparisons allow this much error per unit of target mass
const RELATIVE_TOLERANCE: f64 = 1e-9;

/// An accepted reassignment
#[derive(Debug, Clone)]
pub struct Reassignment {
    pub status: SolveStatus,
    /// False when the solver stopped at a limit with an unproven incumbent
    pub proven_optimal: bool,
    pub proposed: Assignment,
    pub movement: MovementSummary,
    /// Output document, replicas ordered by the leader strategy
    pub plan: ReassignmentPlan,
}

impl Reassignment {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} movements{}, {} replicas added, {} removed, {} partitions changed",
            self.status,
            self.movement.weighted_moves,
            if self.movement.approximate {
                " (approximate)"
            } else {
                ""
            },
            self.movement.replicas_added,
            self.movement.replicas_removed,
            self.movement.partitions_changed
        )
    }
}

/// Minimum-movement reassignment optimizer
pub struct Optimizer<S: Solver> {
    solver: S,
    leader: Box<dyn LeaderSelectionStrategy>,
    reporter: DiagnosticReporter,
    limits: SolveLimits,
    tie_break: TieBreak,
    default_factors: BalanceFactors,
}

impl Optimizer<GoodLpSolver> {
    /// Optimizer on the default backend, configured from `config`
    pub fn from_config(config: &OptimizerConfig, reporter: DiagnosticReporter) -> Self {
        Optimizer::new(GoodLpSolver::new(), config.leader_strategy.build(config.leader_seed))
            .with_reporter(reporter)
            .with_limits(config.solve_limits())
            .with_tie_break(config.tie_break())
            .with_default_factors(config.balance_factors())
    }
}

impl<S: Solver> Optimizer<S> {
    pub fn new(solver: S, leader: Box<dyn LeaderSelectionStrategy>) -> Self {
        Self {
            solver,
            leader,
            reporter: DiagnosticReporter::default(),
            limits: SolveLimits::unlimited(),
            tie_break: TieBreak::None,
            default_factors: BalanceFactors::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: DiagnosticReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Limits applied to each solver call.
    ///
    /// The default backend cannot interrupt a running solve: after a
    /// timeout its worker thread keeps computing until it finishes or the
    /// process exits. Long-lived callers should size the limit with that in
    /// mind.
    pub fn with_limits(mut self, limits: SolveLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Factors applied when an input document has no balance parameters
    pub fn with_default_factors(mut self, factors: BalanceFactors) -> Self {
        self.default_factors = factors;
        self
    }

    /// Normalize a raw document into a spec using this optimizer's defaults
    pub fn build_spec(&self, doc: &InputDocument) -> Result<ProblemSpec> {
        SpecBuilder::from_document(doc, self.default_factors)?.build()
    }

    /// Run the whole pipeline on a raw document
    pub fn run_document(&self, doc: &InputDocument) -> Result<Reassignment> {
        let spec = self.build_spec(doc)?;
        self.run(&spec)
    }

    /// Run the pipeline on a normalized spec
    #[instrument(skip(self, spec), fields(brokers = spec.brokers.len(), partitions = spec.partitions.len()))]
    pub fn run(&self, spec: &ProblemSpec) -> Result<Reassignment> {
        self.reporter.problem_summary(spec);

        let model = formulate(spec, self.tie_break);
        self.reporter.model(&model);

        let outcome = self.solve(spec, &model);

        match (&outcome.status, outcome.values) {
            (SolveStatus::Optimal, Some(values)) => {
                self.accept(spec, &model, &values, SolveStatus::Optimal)
            }
            (SolveStatus::Feasible, Some(values)) => {
                let best = self.accept(spec, &model, &values, SolveStatus::Feasible)?;
                Err(Error::SolverLimitExceeded {
                    limit: self.limits.time_limit,
                    best: Some(Box::new(best)),
                })
            }
            (SolveStatus::Optimal | SolveStatus::Feasible, None) => Err(Error::SolverFailure(
                format!("solver reported {} without a solution", outcome.status),
            )),
            (SolveStatus::NotSolved, _) => Err(Error::SolverLimitExceeded {
                limit: self.limits.time_limit,
                best: None,
            }),
            (SolveStatus::Infeasible, _) => Err(Error::Infeasible {
                hints: diagnose(spec),
            }),
            (SolveStatus::Unbounded, _) => Err(Error::SolverFailure(
                "model is unbounded".to_string(),
            )),
            (SolveStatus::Error(msg), _) => Err(Error::SolverFailure(msg.clone())),
        }
    }

    /// Solve for minimum movement. When the model carries a tie-break,
    /// re-solve with movement capped at the optimum found; if that second
    /// stage does not finish optimally, the first solution stands.
    fn solve(&self, spec: &ProblemSpec, model: &Model) -> SolveOutcome {
        if model.objective.secondary.is_none() {
            let outcome = self.solver.solve(model, &self.limits);
            self.reporter.solve_outcome(self.solver.name(), &outcome);
            return outcome;
        }

        let outcome = self.solver.solve(&model.without_secondary(), &self.limits);
        self.reporter.solve_outcome(self.solver.name(), &outcome);
        let optimum = match (&outcome.status, &outcome.values) {
            (SolveStatus::Optimal, Some(values)) => {
                Some(model.objective.movement_value(&rounded(values)))
            }
            _ => None,
        };
        let Some(optimum) = optimum else {
            return outcome;
        };

        let cap = optimum + tolerance(spec);
        let Some(stage) = model.tie_break_stage(cap) else {
            return outcome;
        };
        debug!(optimum, "Applying tie-break among minimum-movement placements");
        let refined = self.solver.solve(&stage, &self.limits);
        match (&refined.status, refined.values) {
            (SolveStatus::Optimal, Some(values)) => SolveOutcome {
                status: SolveStatus::Optimal,
                values: Some(values),
                elapsed: outcome.elapsed + refined.elapsed,
            },
            _ => {
                warn!(
                    status = %refined.status,
                    "Tie-break stage did not finish, keeping the first optimal placement"
                );
                outcome
            }
        }
    }

    fn accept(
        &self,
        spec: &ProblemSpec,
        model: &Model,
        values: &[f64],
        status: SolveStatus,
    ) -> Result<Reassignment> {
        let proposed = extract(spec, model, values)?;
        let movement = MovementSummary::compute(spec, &proposed);

        // extract accepted the values, so their rounding is the placement
        let objective = model.objective.movement_value(&rounded(values));
        if (objective - movement.weighted_moves).abs() > tolerance(spec) {
            return Err(Error::SolverFailure(format!(
                "objective value {} does not match extracted movement {}",
                objective, movement.weighted_moves
            )));
        }

        self.reporter.movement(&movement);
        self.reporter.placement(spec, &proposed);

        let plan = self.plan(spec, &proposed);
        let reassignment = Reassignment {
            proven_optimal: status == SolveStatus::Optimal,
            status,
            proposed,
            movement,
            plan,
        };
        info!(summary = %reassignment.summary(), "Reassignment proposed");
        Ok(reassignment)
    }

    fn plan(&self, spec: &ProblemSpec, proposed: &Assignment) -> ReassignmentPlan {
        let partitions = spec
            .partitions
            .iter()
            .map(|partition| {
                let brokers = proposed.brokers_of(partition);
                let current = spec
                    .current_replicas
                    .get(partition)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                PartitionEntry {
                    topic: partition.topic.clone(),
                    partition: partition.partition,
                    replicas: self.leader.order(partition, &brokers, current),
                }
            })
            .collect();
        ReassignmentPlan::new(partitions)
    }
}

fn rounded(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| v.round()).collect()
}

fn tolerance(spec: &ProblemSpec) -> f64 {
    RELATIVE_TOLERANCE * spec.target_mass.max(1.0)
}

impl<S: Solver> fmt::Debug for Optimizer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Optimizer")
            .field("solver", &self.solver.name())
            .field("leader", &self.leader.name())
            .field("limits", &self.limits)
            .field("tie_break", &self.tie_break)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leader::{PreserveLeader, SortedReplicas};
    use crate::solver::SolveOutcome;
    use crate::types::PartitionKey;
    use std::cell::Cell;
    use std::time::Duration;

    /// Returns a fixed outcome, ignoring the model
    struct ScriptedSolver {
        status: SolveStatus,
        values: Option<Vec<f64>>,
    }

    impl Solver for ScriptedSolver {
        fn name(&self) -> &str {
            "scripted"
        }

        fn solve(&self, _model: &Model, _limits: &SolveLimits) -> SolveOutcome {
            SolveOutcome {
                status: self.status.clone(),
                values: self.values.clone(),
                elapsed: Duration::ZERO,
            }
        }
    }

    /// Real backend whose values drift just inside the integrality tolerance
    struct NoisySolver;

    impl Solver for NoisySolver {
        fn name(&self) -> &str {
            "noisy"
        }

        fn solve(&self, model: &Model, limits: &SolveLimits) -> SolveOutcome {
            let mut outcome = GoodLpSolver::new().solve(model, limits);
            if let Some(values) = outcome.values.as_mut() {
                for value in values.iter_mut().filter(|v| **v >= 0.5) {
                    *value -= 5e-7;
                }
            }
            outcome
        }
    }

    /// Solves the first call for real, then gives up
    struct OneShotSolver {
        calls: Cell<usize>,
    }

    impl Solver for OneShotSolver {
        fn name(&self) -> &str {
            "one-shot"
        }

        fn solve(&self, model: &Model, limits: &SolveLimits) -> SolveOutcome {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() == 1 {
                GoodLpSolver::new().solve(model, limits)
            } else {
                SolveOutcome::without_solution(SolveStatus::NotSolved, Duration::ZERO)
            }
        }
    }

    fn spec() -> ProblemSpec {
        SpecBuilder::new([1, 2])
            .partition("t", 0, [1])
            .partition("t", 1, [1])
            .balance_factors(BalanceFactors::exact())
            .build()
            .unwrap()
    }

    // variables are partition-major: t_0@1, t_0@2, t_1@1, t_1@2
    fn balanced_values() -> Vec<f64> {
        vec![1.0, 0.0, 0.0, 1.0]
    }

    #[test]
    fn test_optimal_result() {
        let optimizer = Optimizer::new(GoodLpSolver::new(), Box::new(SortedReplicas));
        let result = optimizer.run(&spec()).unwrap();

        assert!(result.proven_optimal);
        assert_eq!(result.movement.weighted_moves, 1.0);
        assert_eq!(result.plan.partitions.len(), 2);
        assert!(result.summary().starts_with("Optimal: 1 movements"));
    }

    #[test]
    fn test_feasible_is_limit_exceeded_with_best() {
        let solver = ScriptedSolver {
            status: SolveStatus::Feasible,
            values: Some(balanced_values()),
        };
        let optimizer = Optimizer::new(solver, Box::new(SortedReplicas))
            .with_limits(SolveLimits::with_time_limit(Duration::from_secs(1)));

        match optimizer.run(&spec()) {
            Err(Error::SolverLimitExceeded { limit, best: Some(best) }) => {
                assert_eq!(limit, Some(Duration::from_secs(1)));
                assert!(!best.proven_optimal);
                assert_eq!(best.status, SolveStatus::Feasible);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_not_solved_is_limit_exceeded_without_best() {
        let solver = ScriptedSolver {
            status: SolveStatus::NotSolved,
            values: None,
        };
        let optimizer = Optimizer::new(solver, Box::new(SortedReplicas));
        assert!(matches!(
            optimizer.run(&spec()),
            Err(Error::SolverLimitExceeded { best: None, .. })
        ));
    }

    #[test]
    fn test_solver_error_is_failure() {
        let solver = ScriptedSolver {
            status: SolveStatus::Error("numerical trouble".to_string()),
            values: None,
        };
        let optimizer = Optimizer::new(solver, Box::new(SortedReplicas));
        assert!(matches!(
            optimizer.run(&spec()),
            Err(Error::SolverFailure(ref msg)) if msg == "numerical trouble"
        ));
    }

    #[test]
    fn test_optimal_without_values_is_failure() {
        let solver = ScriptedSolver {
            status: SolveStatus::Optimal,
            values: None,
        };
        let optimizer = Optimizer::new(solver, Box::new(SortedReplicas));
        assert!(matches!(optimizer.run(&spec()), Err(Error::SolverFailure(_))));
    }

    #[test]
    fn test_bad_solution_is_rejected() {
        // claims optimality but leaves both partitions on broker 1
        let solver = ScriptedSolver {
            status: SolveStatus::Optimal,
            values: Some(vec![1.0, 0.0, 1.0, 0.0]),
        };
        let optimizer = Optimizer::new(solver, Box::new(SortedReplicas));
        assert!(matches!(optimizer.run(&spec()), Err(Error::SolverFailure(_))));
    }

    #[test]
    fn test_infeasible_carries_hints() {
        let spec = SpecBuilder::new([1, 2])
            .partition("t", 0, [1])
            .partition("t", 1, [1])
            .partition("t", 2, [2])
            .balance_factors(BalanceFactors::exact())
            .build()
            .unwrap();
        let optimizer = Optimizer::new(GoodLpSolver::new(), Box::new(SortedReplicas));
        match optimizer.run(&spec) {
            Err(Error::Infeasible { hints }) => assert!(!hints.is_empty()),
            other => panic!("expected infeasible, got {:?}", other),
        }
    }

    #[test]
    fn test_leader_strategy_orders_plan() {
        let spec = SpecBuilder::new([1, 2, 3])
            .partition("t", 0, [3, 1])
            .build()
            .unwrap();
        let optimizer = Optimizer::new(GoodLpSolver::new(), Box::new(PreserveLeader));
        let result = optimizer.run(&spec).unwrap();

        assert_eq!(result.movement.weighted_moves, 0.0);
        assert_eq!(result.plan.partitions[0].replicas, vec![3, 1]);
        assert_eq!(
            result.proposed.brokers_of(&PartitionKey::new("t", 0)),
            vec![1, 3]
        );
    }

    #[test]
    fn test_run_document_uses_default_factors() {
        let doc = InputDocument::from_json(
            r#"{"brokers": "1,2", "partitions": {"version": 1, "partitions": [
                {"topic": "t", "partition": 0, "replicas": [1]},
                {"topic": "t", "partition": 1, "replicas": [1]}
            ]}}"#,
        )
        .unwrap();
        let optimizer = Optimizer::new(GoodLpSolver::new(), Box::new(SortedReplicas))
            .with_default_factors(BalanceFactors::exact());
        let result = optimizer.run_document(&doc).unwrap();
        assert_eq!(result.movement.weighted_moves, 1.0);
    }

    #[test]
    fn test_heavy_weights_accept_near_binary_values() {
        let mut builder = SpecBuilder::new([1, 2]).balance_factors(BalanceFactors::exact());
        for (partition, broker) in [(0, 1), (1, 1), (2, 2), (3, 2)] {
            builder = builder
                .partition("t", partition, [broker])
                .weight("t", partition, 1000.0);
        }
        let optimizer = Optimizer::new(NoisySolver, Box::new(SortedReplicas));
        let result = optimizer.run(&builder.build().unwrap()).unwrap();

        assert!(result.proven_optimal);
        assert_eq!(result.movement.weighted_moves, 0.0);
    }

    #[test]
    fn test_time_limit_on_real_backend() {
        let mut builder = SpecBuilder::new(1..=6).balance_factors(BalanceFactors::exact());
        for partition in 0..24 {
            builder = builder.partition("t", partition, [1]);
        }
        let optimizer = Optimizer::new(GoodLpSolver::new(), Box::new(SortedReplicas))
            .with_limits(SolveLimits::with_time_limit(Duration::from_micros(1)));

        match optimizer.run(&builder.build().unwrap()) {
            Err(Error::SolverLimitExceeded { limit, best: None }) => {
                assert_eq!(limit, Some(Duration::from_micros(1)));
            }
            other => panic!("expected limit without a plan, got {:?}", other),
        }
    }

    #[test]
    fn test_tie_break_runs_second_stage() {
        let solver = OneShotSolver {
            calls: Cell::new(0),
        };
        let optimizer = Optimizer::new(solver, Box::new(SortedReplicas))
            .with_tie_break(TieBreak::PreferLowerBrokers);
        let result = optimizer.run(&spec()).unwrap();

        // the unfinished tie-break stage leaves the first optimum in place
        assert_eq!(optimizer.solver.calls.get(), 2);
        assert!(result.proven_optimal);
        assert_eq!(result.movement.weighted_moves, 1.0);
    }

    #[test]
    fn test_no_tie_break_solves_once() {
        let solver = OneShotSolver {
            calls: Cell::new(0),
        };
        let optimizer = Optimizer::new(solver, Box::new(SortedReplicas));
        assert!(optimizer.run(&spec()).is_ok());
        assert_eq!(optimizer.solver.calls.get(), 1);
    }
}
