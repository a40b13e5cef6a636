//! Infeasibility hints
//!
//! When the solver proves a model infeasible it cannot say why. These
//! checks look for the usual culprits so an operator knows whether to
//! loosen the balance band, change the replication factor, or drop pins.

use std::collections::BTreeMap;
use std::fmt;

use crate::spec::{ProblemSpec, LOAD_TOLERANCE};
use crate::types::{BrokerId, PartitionKey};

#[derive(Debug, Clone, PartialEq)]
pub enum InfeasibilityHint {
    /// More replicas requested than there are brokers
    ReplicationFactorExceedsBrokers {
        partition: PartitionKey,
        target: u32,
        brokers: usize,
    },
    /// No combination of partition weights adds up to a load in the band
    UnreachableBalanceBand { min_load: f64, max_load: f64 },
    /// Even every broker at max_load cannot carry the total mass
    MaxLoadTooLow {
        max_load: f64,
        brokers: usize,
        target_mass: f64,
    },
    /// Every broker at min_load already exceeds the total mass
    MinLoadTooHigh {
        min_load: f64,
        brokers: usize,
        target_mass: f64,
    },
    TooManyPins {
        partition: PartitionKey,
        pins: usize,
        target: u32,
    },
    PinnedLoadExceedsMax {
        broker: BrokerId,
        pinned_load: f64,
        max_load: f64,
    },
}

impl fmt::Display for InfeasibilityHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfeasibilityHint::ReplicationFactorExceedsBrokers {
                partition,
                target,
                brokers,
            } => write!(
                f,
                "partition {} needs {} replicas but only {} brokers are available",
                partition, target, brokers
            ),
            InfeasibilityHint::UnreachableBalanceBand { min_load, max_load } => write!(
                f,
                "no broker load in [{}, {}] is reachable with the given partition weights; widen the balance factors",
                min_load, max_load
            ),
            InfeasibilityHint::MaxLoadTooLow {
                max_load,
                brokers,
                target_mass,
            } => write!(
                f,
                "max load {} on {} brokers cannot hold total weight {}; raise max_factor",
                max_load, brokers, target_mass
            ),
            InfeasibilityHint::MinLoadTooHigh {
                min_load,
                brokers,
                target_mass,
            } => write!(
                f,
                "min load {} on {} brokers exceeds total weight {}; lower min_factor",
                min_load, brokers, target_mass
            ),
            InfeasibilityHint::TooManyPins {
                partition,
                pins,
                target,
            } => write!(
                f,
                "partition {} has {} pinned replicas but replication factor {}",
                partition, pins, target
            ),
            InfeasibilityHint::PinnedLoadExceedsMax {
                broker,
                pinned_load,
                max_load,
            } => write!(
                f,
                "pinned replicas put load {} on broker {}, above max load {}",
                pinned_load, broker, max_load
            ),
        }
    }
}

/// Inspect a spec for constraints that are likely binding
pub fn diagnose(spec: &ProblemSpec) -> Vec<InfeasibilityHint> {
    let mut hints = Vec::new();
    let brokers = spec.brokers.len();
    let bounds = spec.bounds;

    for partition in &spec.partitions {
        let target = spec.target_rf(partition);
        if target as usize > brokers {
            hints.push(InfeasibilityHint::ReplicationFactorExceedsBrokers {
                partition: partition.clone(),
                target,
                brokers,
            });
        }
    }

    if bounds.max_load * brokers as f64 + LOAD_TOLERANCE < spec.target_mass {
        hints.push(InfeasibilityHint::MaxLoadTooLow {
            max_load: bounds.max_load,
            brokers,
            target_mass: spec.target_mass,
        });
    }
    if bounds.min_load * brokers as f64 > spec.target_mass + LOAD_TOLERANCE {
        hints.push(InfeasibilityHint::MinLoadTooHigh {
            min_load: bounds.min_load,
            brokers,
            target_mass: spec.target_mass,
        });
    }

    // With whole-number weights every load is an integer
    let integral_weights = spec.weights.values().all(|w| w.fract() == 0.0);
    if integral_weights && bounds.min_load.ceil() > bounds.max_load.floor() {
        hints.push(InfeasibilityHint::UnreachableBalanceBand {
            min_load: bounds.min_load,
            max_load: bounds.max_load,
        });
    }

    let mut pins_per_partition: BTreeMap<&PartitionKey, usize> = BTreeMap::new();
    let mut pinned_load: BTreeMap<BrokerId, f64> = BTreeMap::new();
    for pin in &spec.pins {
        *pins_per_partition.entry(&pin.partition).or_default() += 1;
        *pinned_load.entry(pin.broker).or_default() += spec.weight(&pin.partition);
    }
    for (partition, pins) in pins_per_partition {
        let target = spec.target_rf(partition);
        if pins > target as usize {
            hints.push(InfeasibilityHint::TooManyPins {
                partition: partition.clone(),
                pins,
                target,
            });
        }
    }
    for (broker, load) in pinned_load {
        if load > bounds.max_load + LOAD_TOLERANCE {
            hints.push(InfeasibilityHint::PinnedLoadExceedsMax {
                broker,
                pinned_load: load,
                max_load: bounds.max_load,
            });
        }
    }

    hints
}
