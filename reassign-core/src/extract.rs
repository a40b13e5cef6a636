//! Result extraction
//!
//! Turns solver values back into a placement, refusing anything that is not
//! a clean 0/1 solution satisfying every invariant.

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::Model;
use crate::spec::ProblemSpec;
use crate::types::Assignment;
use crate::verify::verify;

/// Maximum distance from 0 or 1 accepted for a solved variable
pub const INTEGRALITY_TOLERANCE: f64 = 1e-6;

/// Movement implied by going from the current to a proposed placement
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MovementSummary {
    /// Half of the weighted arrivals plus departures; equals the objective
    pub weighted_moves: f64,
    pub replicas_added: usize,
    pub replicas_removed: usize,
    pub weighted_added: f64,
    pub weighted_removed: f64,
    pub partitions_changed: usize,
    /// Set when replication factors change: the halved figure then mixes
    /// transfers with net additions and removals
    pub approximate: bool,
}

impl MovementSummary {
    pub fn compute(spec: &ProblemSpec, proposed: &Assignment) -> Self {
        let mut summary = MovementSummary {
            approximate: spec.changes_replication(),
            ..Default::default()
        };

        for partition in &spec.partitions {
            let weight = spec.weight(partition);
            let mut changed = false;
            for broker in &spec.brokers {
                let before = spec.current.contains(partition, *broker);
                let after = proposed.contains(partition, *broker);
                if !before && after {
                    summary.replicas_added += 1;
                    summary.weighted_added += weight;
                    changed = true;
                } else if before && !after {
                    summary.replicas_removed += 1;
                    summary.weighted_removed += weight;
                    changed = true;
                }
            }
            if changed {
                summary.partitions_changed += 1;
            }
        }
        for slot in &spec.departed {
            summary.replicas_removed += 1;
            summary.weighted_removed += spec.weight(&slot.partition);
        }
        let departed_partitions = spec
            .departed
            .iter()
            .map(|slot| &slot.partition)
            .filter(|partition| {
                // already counted when a slot inside the broker set changed
                spec.brokers.iter().all(|broker| {
                    spec.current.contains(partition, *broker)
                        == proposed.contains(partition, *broker)
                })
            })
            .collect::<std::collections::BTreeSet<_>>();
        summary.partitions_changed += departed_partitions.len();

        summary.weighted_moves = (summary.weighted_added + summary.weighted_removed) / 2.0;
        summary
    }

    pub fn is_noop(&self) -> bool {
        self.replicas_added == 0 && self.replicas_removed == 0
    }
}

/// Read solver values into a proposed assignment.
///
/// Fails if a value is not within tolerance of 0 or 1, or if the rounded
/// placement breaks any invariant.
pub fn extract(spec: &ProblemSpec, model: &Model, values: &[f64]) -> Result<Assignment> {
    if values.len() != model.variables.len() {
        return Err(Error::SolverFailure(format!(
            "solver returned {} values for {} variables",
            values.len(),
            model.variables.len()
        )));
    }

    let mut proposed = Assignment::new();
    for (variable, value) in model.variables.iter().zip(values) {
        let rounded = value.round();
        if (value - rounded).abs() > INTEGRALITY_TOLERANCE || !(rounded == 0.0 || rounded == 1.0)
        {
            return Err(Error::SolverFailure(format!(
                "variable {} has non-binary value {}",
                variable.slot, value
            )));
        }
        if rounded == 1.0 {
            proposed.insert(variable.slot.partition.clone(), variable.slot.broker);
        }
    }

    let violations = verify(spec, &proposed);
    if !violations.is_empty() {
        let details = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::SolverFailure(format!(
            "solution violates model invariants: {}",
            details
        )));
    }

    debug!(replicas = proposed.total_replicas(), "Proposed assignment extracted");
    Ok(proposed)
}

/// Broker × partition grid. A cell shows the partition weight when the
/// broker hosts the partition, 0 otherwise; the last row holds broker loads.
pub fn render_grid(spec: &ProblemSpec, assignment: &Assignment) -> String {
    let row = |label: String, cells: Vec<String>| {
        let mut line = label;
        for cell in cells {
            line.push_str(&cell);
            line.push('\t');
        }
        line.push('\n');
        line
    };

    let mut out = row(
        "broker \t\t".to_string(),
        spec.brokers.iter().map(ToString::to_string).collect(),
    );
    for partition in &spec.partitions {
        let cells = spec
            .brokers
            .iter()
            .map(|broker| {
                let cell = if assignment.contains(partition, *broker) {
                    spec.weight(partition)
                } else {
                    0.0
                };
                cell.to_string()
            })
            .collect();
        out.push_str(&row(format!("{}\t", partition), cells));
    }
    out.push_str(&row(
        "load\t\t".to_string(),
        spec.broker_loads(assignment)
            .values()
            .map(ToString::to_string)
            .collect(),
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{formulate, TieBreak};
    use crate::spec::{BalanceFactors, SpecBuilder};
    use crate::types::{PartitionKey, ReplicaSlot};

    fn spec() -> ProblemSpec {
        SpecBuilder::new([1, 2])
            .partition("t", 0, [1])
            .partition("t", 1, [1])
            .balance_factors(BalanceFactors::exact())
            .build()
            .unwrap()
    }

    fn values(model: &Model, hosted: &[(u32, i32)], noise: f64) -> Vec<f64> {
        let mut values = vec![noise; model.variables.len()];
        for (partition, broker) in hosted {
            let slot = ReplicaSlot::new(PartitionKey::new("t", *partition), *broker);
            values[model.var(&slot).unwrap().0] = 1.0 - noise;
        }
        values
    }

    #[test]
    fn test_extract_rounds_within_tolerance() {
        let spec = spec();
        let model = formulate(&spec, TieBreak::None);
        let proposed = extract(&spec, &model, &values(&model, &[(0, 1), (1, 2)], 1e-9)).unwrap();
        assert_eq!(proposed.brokers_of(&PartitionKey::new("t", 0)), vec![1]);
        assert_eq!(proposed.brokers_of(&PartitionKey::new("t", 1)), vec![2]);
    }

    #[test]
    fn test_extract_rejects_fractional_values() {
        let spec = spec();
        let model = formulate(&spec, TieBreak::None);
        let err = extract(&spec, &model, &values(&model, &[(0, 1), (1, 2)], 0.3)).unwrap_err();
        assert!(matches!(err, Error::SolverFailure(ref msg) if msg.contains("non-binary")));
    }

    #[test]
    fn test_extract_rejects_invariant_violation() {
        let spec = spec();
        let model = formulate(&spec, TieBreak::None);
        // both partitions stay on broker 1: unbalanced
        let err = extract(&spec, &model, &values(&model, &[(0, 1), (1, 1)], 0.0)).unwrap_err();
        assert!(matches!(err, Error::SolverFailure(ref msg) if msg.contains("load of broker")));
    }

    #[test]
    fn test_extract_rejects_wrong_length() {
        let spec = spec();
        let model = formulate(&spec, TieBreak::None);
        assert!(extract(&spec, &model, &[1.0]).is_err());
    }

    #[test]
    fn test_movement_summary() {
        let spec = SpecBuilder::new([1, 2, 3])
            .partition("t", 0, [1, 2])
            .partition("t", 1, [9])
            .weight("t", 0, 2.0)
            .build()
            .unwrap();
        let mut proposed = Assignment::new();
        proposed.insert(PartitionKey::new("t", 0), 1);
        proposed.insert(PartitionKey::new("t", 0), 3);
        proposed.insert(PartitionKey::new("t", 1), 2);

        let summary = MovementSummary::compute(&spec, &proposed);
        assert_eq!(summary.replicas_added, 2);
        assert_eq!(summary.replicas_removed, 2);
        assert_eq!(summary.weighted_moves, 3.0);
        assert_eq!(summary.partitions_changed, 2);
        assert!(!summary.approximate);
        assert!(!summary.is_noop());
    }

    #[test]
    fn test_movement_summary_flags_replication_change() {
        let spec = SpecBuilder::new([1, 2])
            .partition("t", 0, [1])
            .replication_factor(2)
            .build()
            .unwrap();
        let mut proposed = Assignment::new();
        proposed.insert(PartitionKey::new("t", 0), 1);
        proposed.insert(PartitionKey::new("t", 0), 2);

        let summary = MovementSummary::compute(&spec, &proposed);
        assert!(summary.approximate);
        assert_eq!(summary.weighted_moves, 0.5);
    }

    #[test]
    fn test_render_grid() {
        let spec = spec();
        let grid = render_grid(&spec, &spec.current);
        assert_eq!(
            grid,
            "broker \t\t1\t2\t\nt_0\t1\t0\t\nt_1\t1\t0\t\nload\t\t2\t0\t\n"
        );
    }
}
