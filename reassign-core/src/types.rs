//! Core identifiers and assignment representation
//!
//! Composite keys are plain structs with derived ordering so they can be
//! used directly as `BTreeMap` keys and iterate deterministically.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Broker identifier
pub type BrokerId = i32;

/// Identity of a replicated unit: (topic, partition index)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub topic: String,
    pub partition: u32,
}

impl PartitionKey {
    pub fn new(topic: impl Into<String>, partition: u32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.topic, self.partition)
    }
}

/// A candidate hosting relationship between a partition and a broker
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaSlot {
    pub partition: PartitionKey,
    pub broker: BrokerId,
}

impl ReplicaSlot {
    pub fn new(partition: PartitionKey, broker: BrokerId) -> Self {
        Self { partition, broker }
    }
}

impl fmt::Display for ReplicaSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_B{}", self.partition, self.broker)
    }
}

/// A total 0/1 function over replica slots.
///
/// Only slots with value 1 are stored; every other slot reads as 0, so the
/// assignment is defined over the whole partition × broker product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    hosted: BTreeMap<PartitionKey, BTreeSet<BrokerId>>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a slot as hosted. Returns false if it already was.
    pub fn insert(&mut self, partition: PartitionKey, broker: BrokerId) -> bool {
        self.hosted.entry(partition).or_default().insert(broker)
    }

    pub fn contains(&self, partition: &PartitionKey, broker: BrokerId) -> bool {
        self.hosted
            .get(partition)
            .is_some_and(|brokers| brokers.contains(&broker))
    }

    /// Slot value as 0 or 1
    pub fn value(&self, partition: &PartitionKey, broker: BrokerId) -> u8 {
        u8::from(self.contains(partition, broker))
    }

    /// Brokers hosting a partition, ascending
    pub fn brokers_of(&self, partition: &PartitionKey) -> Vec<BrokerId> {
        self.hosted
            .get(partition)
            .map(|brokers| brokers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn replica_count(&self, partition: &PartitionKey) -> usize {
        self.hosted.get(partition).map_or(0, BTreeSet::len)
    }

    /// Iterate over every hosted slot in (partition, broker) order
    pub fn slots(&self) -> impl Iterator<Item = ReplicaSlot> + '_ {
        self.hosted.iter().flat_map(|(partition, brokers)| {
            brokers
                .iter()
                .map(move |broker| ReplicaSlot::new(partition.clone(), *broker))
        })
    }

    /// Partitions with at least one hosted replica
    pub fn partitions(&self) -> impl Iterator<Item = &PartitionKey> {
        self.hosted
            .iter()
            .filter(|(_, brokers)| !brokers.is_empty())
            .map(|(partition, _)| partition)
    }

    pub fn total_replicas(&self) -> usize {
        self.hosted.values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_key_ordering() {
        let mut keys = vec![
            PartitionKey::new("b", 0),
            PartitionKey::new("a", 10),
            PartitionKey::new("a", 2),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                PartitionKey::new("a", 2),
                PartitionKey::new("a", 10),
                PartitionKey::new("b", 0),
            ]
        );
    }

    #[test]
    fn test_slot_display() {
        let slot = ReplicaSlot::new(PartitionKey::new("orders", 3), 7);
        assert_eq!(slot.to_string(), "orders_3_B7");
    }

    #[test]
    fn test_assignment_is_total() {
        let mut assignment = Assignment::new();
        let key = PartitionKey::new("t1", 0);
        assert!(assignment.insert(key.clone(), 2));
        assert!(!assignment.insert(key.clone(), 2));
        assignment.insert(key.clone(), 1);

        assert_eq!(assignment.value(&key, 1), 1);
        assert_eq!(assignment.value(&key, 3), 0);
        assert_eq!(assignment.value(&PartitionKey::new("unknown", 0), 1), 0);
        assert_eq!(assignment.brokers_of(&key), vec![1, 2]);
        assert_eq!(assignment.total_replicas(), 2);
        assert_eq!(assignment.slots().count(), 2);
    }
}
