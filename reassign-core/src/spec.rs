//! Normalized reassignment problem
//!
//! Normalizes a raw reassignment request into a canonical [`ProblemSpec`]:
//! - sorted, deduplicated broker set
//! - sorted partition keys with their current replicas
//! - per-partition weights and target replication factors
//! - resolved pins (unresolvable ones are kept aside, not fatal)
//! - total weighted mass and the per-broker balance band

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::{Error, Result, UnresolvablePin};
use crate::input::{InputDocument, PartitionEntry};
use crate::types::{Assignment, BrokerId, PartitionKey, ReplicaSlot};
use crate::{DEFAULT_MAX_FACTOR, DEFAULT_MIN_FACTOR};

/// Tolerance used when comparing weighted loads against bounds
pub const LOAD_TOLERANCE: f64 = 1e-6;

/// Tolerance factors around the mean broker load
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceFactors {
    pub min_factor: f64,
    pub max_factor: f64,
}

impl Default for BalanceFactors {
    fn default() -> Self {
        Self {
            min_factor: DEFAULT_MIN_FACTOR,
            max_factor: DEFAULT_MAX_FACTOR,
        }
    }
}

impl BalanceFactors {
    pub fn new(min_factor: f64, max_factor: f64) -> Self {
        Self {
            min_factor,
            max_factor,
        }
    }

    /// Both factors 1.0: every broker carries exactly the mean load
    pub fn exact() -> Self {
        Self::new(1.0, 1.0)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_factor", self.min_factor),
            ("max_factor", self.max_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid_input(
                    format!("balance_parameters.{}", name),
                    format!("must be a finite non-negative number, got {}", value),
                ));
            }
        }
        if self.min_factor > self.max_factor {
            return Err(Error::invalid_input(
                "balance_parameters",
                format!(
                    "min_factor {} is greater than max_factor {}",
                    self.min_factor, self.max_factor
                ),
            ));
        }
        Ok(())
    }

    pub fn is_exact(&self) -> bool {
        self.min_factor == self.max_factor
    }
}

/// Weighted load band every broker must fall within
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceBounds {
    pub min_load: f64,
    pub max_load: f64,
}

impl BalanceBounds {
    /// Derive the band from the mean load.
    ///
    /// Equal factors pin the load to `mean * factor` without rounding, so a
    /// fractional target stays fractional and surfaces as infeasibility.
    /// Otherwise the band is widened outward to whole units.
    pub fn from_mean(mean: f64, factors: BalanceFactors) -> Self {
        if factors.is_exact() {
            let load = mean * factors.min_factor;
            Self {
                min_load: load,
                max_load: load,
            }
        } else {
            Self {
                min_load: (mean * factors.min_factor).floor(),
                max_load: (mean * factors.max_factor).ceil(),
            }
        }
    }

    pub fn is_exact(&self) -> bool {
        self.min_load == self.max_load
    }

    pub fn contains(&self, load: f64) -> bool {
        load >= self.min_load - LOAD_TOLERANCE && load <= self.max_load + LOAD_TOLERANCE
    }
}

/// Validated, normalized reassignment problem
#[derive(Debug, Clone)]
pub struct ProblemSpec {
    /// Ascending, deduplicated
    pub brokers: Vec<BrokerId>,
    /// Ascending by (topic, partition)
    pub partitions: Vec<PartitionKey>,
    /// Current replica lists in document order (leader first)
    pub current_replicas: BTreeMap<PartitionKey, Vec<BrokerId>>,
    /// Current placement restricted to the broker set
    pub current: Assignment,
    /// Current replicas hosted on brokers outside the broker set
    pub departed: Vec<ReplicaSlot>,
    pub weights: BTreeMap<PartitionKey, f64>,
    /// Weight entries naming partitions absent from the request
    pub ignored_weights: Vec<PartitionKey>,
    pub pins: BTreeSet<ReplicaSlot>,
    pub dropped_pins: Vec<UnresolvablePin>,
    /// Uniform replication factor override, if requested
    pub replication_override: Option<u32>,
    pub target_replication: BTreeMap<PartitionKey, u32>,
    pub factors: BalanceFactors,
    /// Weighted mass of the current placement, departed replicas included
    pub current_mass: f64,
    /// Weighted mass every proposed placement must carry
    pub target_mass: f64,
    pub bounds: BalanceBounds,
}

impl ProblemSpec {
    pub fn weight(&self, partition: &PartitionKey) -> f64 {
        self.weights.get(partition).copied().unwrap_or(1.0)
    }

    pub fn target_rf(&self, partition: &PartitionKey) -> u32 {
        self.target_replication.get(partition).copied().unwrap_or(0)
    }

    pub fn is_pinned(&self, partition: &PartitionKey, broker: BrokerId) -> bool {
        self.pins
            .contains(&ReplicaSlot::new(partition.clone(), broker))
    }

    /// Every slot of the partition × broker product, partition-major
    pub fn slots(&self) -> impl Iterator<Item = ReplicaSlot> + '_ {
        self.partitions.iter().flat_map(move |partition| {
            self.brokers
                .iter()
                .map(move |broker| ReplicaSlot::new(partition.clone(), *broker))
        })
    }

    pub fn slot_count(&self) -> usize {
        self.partitions.len() * self.brokers.len()
    }

    /// Topic names with their partition counts, ascending
    pub fn topics(&self) -> Vec<(String, usize)> {
        let mut topics: BTreeMap<&str, usize> = BTreeMap::new();
        for partition in &self.partitions {
            *topics.entry(partition.topic.as_str()).or_default() += 1;
        }
        topics
            .into_iter()
            .map(|(topic, count)| (topic.to_string(), count))
            .collect()
    }

    pub fn total_target_replicas(&self) -> u64 {
        self.target_replication.values().map(|rf| u64::from(*rf)).sum()
    }

    /// Whether any partition's target factor differs from its current count
    pub fn changes_replication(&self) -> bool {
        self.partitions.iter().any(|partition| {
            let current = self.current_replicas.get(partition).map_or(0, Vec::len);
            current != self.target_rf(partition) as usize
        })
    }

    /// Weighted load each broker carries under an assignment
    pub fn broker_loads(&self, assignment: &Assignment) -> BTreeMap<BrokerId, f64> {
        let mut loads: BTreeMap<BrokerId, f64> =
            self.brokers.iter().map(|broker| (*broker, 0.0)).collect();
        for slot in assignment.slots() {
            if let Some(load) = loads.get_mut(&slot.broker) {
                *load += self.weight(&slot.partition);
            }
        }
        loads
    }

    /// Weighted mass of an assignment over the slot domain
    pub fn mass_of(&self, assignment: &Assignment) -> f64 {
        assignment
            .slots()
            .filter(|slot| self.brokers.binary_search(&slot.broker).is_ok())
            .map(|slot| self.weight(&slot.partition))
            .sum()
    }

    /// Rebuild this spec with a different current placement, keeping every
    /// other parameter.
    pub fn with_current(&self, entries: Vec<PartitionEntry>) -> Result<ProblemSpec> {
        let mut builder = SpecBuilder::new(self.brokers.clone()).balance_factors(self.factors);
        if let Some(rf) = self.replication_override {
            builder = builder.replication_factor(rf);
        }
        for entry in entries {
            builder = builder.partition(entry.topic, entry.partition, entry.replicas);
        }
        for (partition, weight) in &self.weights {
            builder = builder.weight(partition.topic.clone(), partition.partition, *weight);
        }
        for pin in &self.pins {
            builder = builder.pin(pin.partition.topic.clone(), pin.partition.partition, pin.broker);
        }
        builder.build()
    }
}

/// Builder that validates and normalizes a reassignment request
#[derive(Debug, Clone, Default)]
pub struct SpecBuilder {
    brokers: Vec<BrokerId>,
    partitions: Vec<PartitionEntry>,
    replication_factor: Option<u32>,
    factors: Option<BalanceFactors>,
    weights: Vec<(PartitionKey, f64)>,
    pins: Vec<ReplicaSlot>,
}

impl SpecBuilder {
    pub fn new(brokers: impl IntoIterator<Item = BrokerId>) -> Self {
        Self {
            brokers: brokers.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Build from a raw input document. `default_factors` apply to any
    /// factor the document does not set.
    pub fn from_document(doc: &InputDocument, default_factors: BalanceFactors) -> Result<Self> {
        let brokers = doc
            .brokers
            .as_ref()
            .ok_or_else(|| Error::invalid_input("brokers", "field is required"))?
            .parse()?;
        let partitions = doc
            .partitions
            .as_ref()
            .ok_or_else(|| Error::invalid_input("partitions", "field is required"))?;

        let mut builder = SpecBuilder::new(brokers);
        builder.partitions = partitions.partitions.clone();

        if let Some(rf) = doc.new_replication_factor.filter(|rf| *rf > 0) {
            let rf = u32::try_from(rf).map_err(|_| {
                Error::invalid_input("new_replication_factor", format!("{} is out of range", rf))
            })?;
            builder = builder.replication_factor(rf);
        }

        let factors = match doc.balance_parameters {
            Some(params) => BalanceFactors::new(
                params.min_factor.unwrap_or(default_factors.min_factor),
                params.max_factor.unwrap_or(default_factors.max_factor),
            ),
            None => default_factors,
        };
        builder = builder.balance_factors(factors);

        for entry in &doc.partition_weights {
            builder = builder.weight(entry.topic.clone(), entry.partition, entry.weight);
        }
        for entry in &doc.pinned_replicas {
            builder = builder.pin(entry.topic.clone(), entry.partition, entry.replica);
        }

        Ok(builder)
    }

    pub fn partition(
        mut self,
        topic: impl Into<String>,
        partition: u32,
        replicas: impl IntoIterator<Item = BrokerId>,
    ) -> Self {
        self.partitions.push(PartitionEntry {
            topic: topic.into(),
            partition,
            replicas: replicas.into_iter().collect(),
        });
        self
    }

    pub fn replication_factor(mut self, rf: u32) -> Self {
        self.replication_factor = Some(rf);
        self
    }

    pub fn balance_factors(mut self, factors: BalanceFactors) -> Self {
        self.factors = Some(factors);
        self
    }

    pub fn weight(mut self, topic: impl Into<String>, partition: u32, weight: f64) -> Self {
        self.weights
            .push((PartitionKey::new(topic, partition), weight));
        self
    }

    pub fn pin(mut self, topic: impl Into<String>, partition: u32, broker: BrokerId) -> Self {
        self.pins
            .push(ReplicaSlot::new(PartitionKey::new(topic, partition), broker));
        self
    }

    /// Validate and normalize into a [`ProblemSpec`]
    pub fn build(self) -> Result<ProblemSpec> {
        let brokers: Vec<BrokerId> = self
            .brokers
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if brokers.is_empty() {
            return Err(Error::invalid_input("brokers", "broker list is empty"));
        }
        if self.partitions.is_empty() {
            return Err(Error::invalid_input("partitions", "partition list is empty"));
        }
        if self.replication_factor == Some(0) {
            return Err(Error::invalid_input(
                "new_replication_factor",
                "must be greater than zero",
            ));
        }
        let factors = self.factors.unwrap_or_default();
        factors.validate()?;

        // Partitions and their current replicas
        let mut current_replicas: BTreeMap<PartitionKey, Vec<BrokerId>> = BTreeMap::new();
        for entry in &self.partitions {
            let key = entry.key();
            if entry.replicas.is_empty() {
                return Err(Error::invalid_input(
                    "partitions",
                    format!("partition {} has an empty replica list", key),
                ));
            }
            let distinct: BTreeSet<_> = entry.replicas.iter().collect();
            if distinct.len() != entry.replicas.len() {
                return Err(Error::invalid_input(
                    "partitions",
                    format!("partition {} lists a broker more than once: {:?}", key, entry.replicas),
                ));
            }
            if current_replicas
                .insert(key.clone(), entry.replicas.clone())
                .is_some()
            {
                return Err(Error::invalid_input(
                    "partitions",
                    format!("partition {} appears more than once", key),
                ));
            }
        }
        let partitions: Vec<PartitionKey> = current_replicas.keys().cloned().collect();

        let mut current = Assignment::new();
        let mut departed = Vec::new();
        for (key, replicas) in &current_replicas {
            for broker in replicas {
                if brokers.binary_search(broker).is_ok() {
                    current.insert(key.clone(), *broker);
                } else {
                    departed.push(ReplicaSlot::new(key.clone(), *broker));
                }
            }
        }

        // Weights: first entry wins, unknown partitions are set aside
        let mut weights: BTreeMap<PartitionKey, f64> = BTreeMap::new();
        let mut ignored_weights = Vec::new();
        for (key, weight) in self.weights {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(Error::invalid_input(
                    "partition_weights",
                    format!("weight of partition {} must be positive, got {}", key, weight),
                ));
            }
            if !current_replicas.contains_key(&key) {
                ignored_weights.push(key);
                continue;
            }
            weights.entry(key).or_insert(weight);
        }
        for key in &partitions {
            weights.entry(key.clone()).or_insert(1.0);
        }

        // Pins outside the slot domain are dropped
        let mut pins = BTreeSet::new();
        let mut dropped_pins = Vec::new();
        for slot in self.pins {
            let known_partition = current_replicas.contains_key(&slot.partition);
            let known_broker = brokers.binary_search(&slot.broker).is_ok();
            if known_partition && known_broker {
                pins.insert(slot);
            } else {
                let pin = UnresolvablePin {
                    partition: slot.partition,
                    broker: slot.broker,
                };
                if !dropped_pins.contains(&pin) {
                    dropped_pins.push(pin);
                }
            }
        }

        let target_replication: BTreeMap<PartitionKey, u32> = current_replicas
            .iter()
            .map(|(key, replicas)| {
                let rf = self
                    .replication_factor
                    .unwrap_or(replicas.len() as u32);
                (key.clone(), rf)
            })
            .collect();

        let current_mass: f64 = current_replicas
            .iter()
            .map(|(key, replicas)| weights[key] * replicas.len() as f64)
            .sum();
        let target_mass: f64 = target_replication
            .iter()
            .map(|(key, rf)| weights[key] * f64::from(*rf))
            .sum();

        let mean = target_mass / brokers.len() as f64;
        let bounds = BalanceBounds::from_mean(mean, factors);

        debug!(
            brokers = brokers.len(),
            partitions = partitions.len(),
            departed = departed.len(),
            pins = pins.len(),
            dropped_pins = dropped_pins.len(),
            target_mass,
            min_load = bounds.min_load,
            max_load = bounds.max_load,
            "Problem spec built"
        );

        Ok(ProblemSpec {
            brokers,
            partitions,
            current_replicas,
            current,
            departed,
            weights,
            ignored_weights,
            pins,
            dropped_pins,
            replication_override: self.replication_factor,
            target_replication,
            factors,
            current_mass,
            target_mass,
            bounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputDocument;

    fn three_broker_spec() -> ProblemSpec {
        SpecBuilder::new([3, 1, 2, 1])
            .partition("t2", 0, [1, 2])
            .partition("t1", 1, [2, 3])
            .partition("t1", 0, [1, 3])
            .build()
            .unwrap()
    }

    #[test]
    fn test_brokers_sorted_and_deduplicated() {
        let spec = three_broker_spec();
        assert_eq!(spec.brokers, vec![1, 2, 3]);
    }

    #[test]
    fn test_partitions_sorted() {
        let spec = three_broker_spec();
        assert_eq!(
            spec.partitions,
            vec![
                PartitionKey::new("t1", 0),
                PartitionKey::new("t1", 1),
                PartitionKey::new("t2", 0),
            ]
        );
        assert_eq!(spec.topics(), vec![("t1".to_string(), 2), ("t2".to_string(), 1)]);
        assert_eq!(spec.slot_count(), 9);
        assert_eq!(spec.slots().count(), 9);
    }

    #[test]
    fn test_current_assignment_covers_domain() {
        let spec = three_broker_spec();
        let t1_0 = PartitionKey::new("t1", 0);
        assert_eq!(spec.current.value(&t1_0, 1), 1);
        assert_eq!(spec.current.value(&t1_0, 2), 0);
        assert_eq!(spec.current.value(&t1_0, 3), 1);
        assert_eq!(spec.current.total_replicas(), 6);
    }

    #[test]
    fn test_default_band() {
        // mass 6 over 3 brokers: mean 2, band [floor(1.8), ceil(2.2)]
        let spec = three_broker_spec();
        assert_eq!(spec.current_mass, 6.0);
        assert_eq!(spec.target_mass, 6.0);
        assert_eq!(spec.bounds, BalanceBounds { min_load: 1.0, max_load: 3.0 });
        assert!(!spec.bounds.is_exact());
    }

    #[test]
    fn test_exact_band_keeps_fraction() {
        let spec = SpecBuilder::new([1, 2])
            .partition("t", 0, [1])
            .partition("t", 1, [1])
            .partition("t", 2, [2])
            .balance_factors(BalanceFactors::exact())
            .build()
            .unwrap();
        assert!(spec.bounds.is_exact());
        assert_eq!(spec.bounds.min_load, 1.5);
    }

    #[test]
    fn test_weights_default_and_first_wins() {
        let spec = SpecBuilder::new([1, 2])
            .partition("t", 0, [1])
            .partition("t", 1, [2])
            .weight("t", 0, 3.0)
            .weight("t", 0, 5.0)
            .weight("gone", 0, 2.0)
            .build()
            .unwrap();
        assert_eq!(spec.weight(&PartitionKey::new("t", 0)), 3.0);
        assert_eq!(spec.weight(&PartitionKey::new("t", 1)), 1.0);
        assert_eq!(spec.ignored_weights, vec![PartitionKey::new("gone", 0)]);
        assert_eq!(spec.current_mass, 4.0);
    }

    #[test]
    fn test_non_positive_weight_rejected() {
        let result = SpecBuilder::new([1])
            .partition("t", 0, [1])
            .weight("t", 0, 0.0)
            .build();
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn test_pin_on_removed_broker_dropped() {
        let spec = SpecBuilder::new([1, 2])
            .partition("t", 0, [1, 5])
            .pin("t", 0, 5)
            .pin("t", 0, 5)
            .pin("t", 0, 2)
            .build()
            .unwrap();
        assert_eq!(spec.pins.len(), 1);
        assert!(spec.is_pinned(&PartitionKey::new("t", 0), 2));
        assert_eq!(
            spec.dropped_pins,
            vec![UnresolvablePin {
                partition: PartitionKey::new("t", 0),
                broker: 5,
            }]
        );
    }

    #[test]
    fn test_departed_replicas_keep_replication_factor() {
        let spec = SpecBuilder::new([1, 2, 3])
            .partition("t", 0, [4, 1])
            .build()
            .unwrap();
        let key = PartitionKey::new("t", 0);
        assert_eq!(spec.target_rf(&key), 2);
        assert_eq!(spec.departed, vec![ReplicaSlot::new(key.clone(), 4)]);
        assert_eq!(spec.current.brokers_of(&key), vec![1]);
        assert_eq!(spec.current_mass, 2.0);
        assert!(!spec.changes_replication());
    }

    #[test]
    fn test_replication_override_sets_target_mass() {
        let spec = SpecBuilder::new([1, 2, 3])
            .partition("t", 0, [1])
            .partition("t", 1, [2])
            .weight("t", 1, 2.0)
            .replication_factor(3)
            .build()
            .unwrap();
        assert_eq!(spec.current_mass, 3.0);
        assert_eq!(spec.target_mass, 9.0);
        assert_eq!(spec.total_target_replicas(), 6);
        assert!(spec.changes_replication());
    }

    #[test]
    fn test_malformed_replica_lists() {
        let duplicate = SpecBuilder::new([1, 2]).partition("t", 0, [1, 1]).build();
        assert!(matches!(duplicate, Err(Error::InvalidInput { .. })));

        let empty = SpecBuilder::new([1, 2])
            .partition("t", 0, Vec::<BrokerId>::new())
            .build();
        assert!(matches!(empty, Err(Error::InvalidInput { .. })));

        let repeated = SpecBuilder::new([1, 2])
            .partition("t", 0, [1])
            .partition("t", 0, [2])
            .build();
        assert!(matches!(repeated, Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn test_invalid_factors() {
        let result = SpecBuilder::new([1])
            .partition("t", 0, [1])
            .balance_factors(BalanceFactors::new(1.2, 0.8))
            .build();
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn test_missing_required_fields() {
        let doc = InputDocument::from_json(r#"{"partitions": {"partitions": []}}"#).unwrap();
        let err = SpecBuilder::from_document(&doc, BalanceFactors::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { ref field, .. } if field == "brokers"));

        let doc = InputDocument::from_json(r#"{"brokers": "1,2"}"#).unwrap();
        let err = SpecBuilder::from_document(&doc, BalanceFactors::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { ref field, .. } if field == "partitions"));
    }

    #[test]
    fn test_from_document_partial_balance_parameters() {
        let doc = InputDocument::from_json(
            r#"{"brokers": "1,2", "new_replication_factor": -1,
                "balance_parameters": {"max_factor": 1.5},
                "partitions": {"partitions": [{"topic": "t", "partition": 0, "replicas": [1]}]}}"#,
        )
        .unwrap();
        let spec = SpecBuilder::from_document(&doc, BalanceFactors::default())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(spec.factors, BalanceFactors::new(DEFAULT_MIN_FACTOR, 1.5));
        assert_eq!(spec.replication_override, None);
    }

    #[test]
    fn test_with_current_keeps_parameters() {
        let spec = SpecBuilder::new([1, 2])
            .partition("t", 0, [1])
            .weight("t", 0, 2.0)
            .pin("t", 0, 2)
            .balance_factors(BalanceFactors::new(0.5, 1.5))
            .build()
            .unwrap();
        let rebuilt = spec
            .with_current(vec![PartitionEntry {
                topic: "t".to_string(),
                partition: 0,
                replicas: vec![2],
            }])
            .unwrap();
        assert_eq!(rebuilt.factors, spec.factors);
        assert_eq!(rebuilt.weights, spec.weights);
        assert_eq!(rebuilt.pins, spec.pins);
        assert_eq!(rebuilt.current.brokers_of(&PartitionKey::new("t", 0)), vec![2]);
    }

    #[test]
    fn test_bounds_contains_with_tolerance() {
        let bounds = BalanceBounds { min_load: 1.0, max_load: 2.0 };
        assert!(bounds.contains(1.0));
        assert!(bounds.contains(2.0 + 1e-9));
        assert!(!bounds.contains(2.1));
        assert!(!bounds.contains(0.5));
    }
}
