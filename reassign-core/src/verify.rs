//! Invariant checks for proposed placements
//!
//! Used on every solver result before it is accepted, and by the `check`
//! command on plans produced elsewhere.

use std::fmt;

use crate::extract::MovementSummary;
use crate::input::ReassignmentPlan;
use crate::spec::{ProblemSpec, LOAD_TOLERANCE};
use crate::types::{Assignment, BrokerId, PartitionKey, ReplicaSlot};

#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    ReplicationFactor {
        partition: PartitionKey,
        expected: u32,
        actual: usize,
    },
    MassMismatch { expected: f64, actual: f64 },
    Balance {
        broker: BrokerId,
        load: f64,
        min_load: f64,
        max_load: f64,
    },
    PinNotHonored(ReplicaSlot),
    UnknownBroker(ReplicaSlot),
    UnknownPartition(PartitionKey),
    DuplicateReplica(ReplicaSlot),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::ReplicationFactor {
                partition,
                expected,
                actual,
            } => write!(
                f,
                "partition {} has {} replicas, expected {}",
                partition, actual, expected
            ),
            Violation::MassMismatch { expected, actual } => write!(
                f,
                "total replica weight is {}, expected {}",
                actual, expected
            ),
            Violation::Balance {
                broker,
                load,
                min_load,
                max_load,
            } => write!(
                f,
                "load of broker {} is {}, outside [{}, {}]",
                broker, load, min_load, max_load
            ),
            Violation::PinNotHonored(slot) => write!(f, "pinned replica {} is not placed", slot),
            Violation::UnknownBroker(slot) => {
                write!(f, "replica {} is on a broker outside the broker set", slot)
            }
            Violation::UnknownPartition(partition) => {
                write!(f, "partition {} is not part of the request", partition)
            }
            Violation::DuplicateReplica(slot) => write!(f, "replica {} is listed twice", slot),
        }
    }
}

/// Check replication factor, mass, balance and pins for an assignment
pub fn verify(spec: &ProblemSpec, proposed: &Assignment) -> Vec<Violation> {
    let mut violations = Vec::new();

    for partition in &spec.partitions {
        let expected = spec.target_rf(partition);
        let actual = proposed.replica_count(partition);
        if actual != expected as usize {
            violations.push(Violation::ReplicationFactor {
                partition: partition.clone(),
                expected,
                actual,
            });
        }
    }

    let mass = spec.mass_of(proposed);
    if (mass - spec.target_mass).abs() > LOAD_TOLERANCE {
        violations.push(Violation::MassMismatch {
            expected: spec.target_mass,
            actual: mass,
        });
    }

    for (broker, load) in spec.broker_loads(proposed) {
        if !spec.bounds.contains(load) {
            violations.push(Violation::Balance {
                broker,
                load,
                min_load: spec.bounds.min_load,
                max_load: spec.bounds.max_load,
            });
        }
    }

    for pin in &spec.pins {
        if !proposed.contains(&pin.partition, pin.broker) {
            violations.push(Violation::PinNotHonored(pin.clone()));
        }
    }

    violations
}

/// Result of checking an externally produced plan
#[derive(Debug, Clone)]
pub struct PlanCheck {
    pub violations: Vec<Violation>,
    pub movement: MovementSummary,
}

impl PlanCheck {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Evaluate a plan against a spec without solving.
///
/// Partitions the plan omits keep their current placement.
pub fn check_plan(spec: &ProblemSpec, plan: &ReassignmentPlan) -> PlanCheck {
    let mut violations = Vec::new();
    let mut proposed = Assignment::new();
    let mut covered = Vec::new();

    for entry in &plan.partitions {
        let key = entry.key();
        if !spec.current_replicas.contains_key(&key) {
            violations.push(Violation::UnknownPartition(key));
            continue;
        }
        for broker in &entry.replicas {
            let slot = ReplicaSlot::new(key.clone(), *broker);
            if spec.brokers.binary_search(broker).is_err() {
                violations.push(Violation::UnknownBroker(slot));
            } else if !proposed.insert(key.clone(), *broker) {
                violations.push(Violation::DuplicateReplica(slot));
            }
        }
        covered.push(key);
    }
    for partition in &spec.partitions {
        if !covered.contains(partition) {
            for broker in spec.current.brokers_of(partition) {
                proposed.insert(partition.clone(), broker);
            }
        }
    }

    violations.extend(verify(spec, &proposed));
    PlanCheck {
        violations,
        movement: MovementSummary::compute(spec, &proposed),
    }
}
