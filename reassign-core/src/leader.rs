//! Leader selection
//!
//! The optimizer decides which brokers host a partition, not which one
//! leads. A [`LeaderSelectionStrategy`] orders the proposed replica set so
//! the first broker becomes the preferred leader.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use crate::types::{BrokerId, PartitionKey};

/// Orders a partition's proposed replicas, leader first
pub trait LeaderSelectionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// `proposed` is ascending; `current` is the current replica list in
    /// document order (leader first).
    fn order(
        &self,
        partition: &PartitionKey,
        proposed: &[BrokerId],
        current: &[BrokerId],
    ) -> Vec<BrokerId>;
}

/// Shuffle the replica list to spread leadership
pub struct RandomLeader {
    rng: Option<Mutex<StdRng>>,
}

impl RandomLeader {
    /// Thread-local entropy, different on every run
    pub fn new() -> Self {
        Self { rng: None }
    }

    /// Reproducible shuffles
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }
}

impl Default for RandomLeader {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderSelectionStrategy for RandomLeader {
    fn name(&self) -> &str {
        "random"
    }

    fn order(
        &self,
        _partition: &PartitionKey,
        proposed: &[BrokerId],
        _current: &[BrokerId],
    ) -> Vec<BrokerId> {
        let mut replicas = proposed.to_vec();
        match &self.rng {
            Some(rng) => {
                let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                replicas.shuffle(&mut *rng);
            }
            None => replicas.shuffle(&mut rand::thread_rng()),
        }
        replicas
    }
}

/// Keep surviving replicas in their current order, then append new ones.
///
/// A current leader that keeps its replica stays leader.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreserveLeader;

impl LeaderSelectionStrategy for PreserveLeader {
    fn name(&self) -> &str {
        "preserve"
    }

    fn order(
        &self,
        _partition: &PartitionKey,
        proposed: &[BrokerId],
        current: &[BrokerId],
    ) -> Vec<BrokerId> {
        let mut replicas: Vec<BrokerId> = current
            .iter()
            .filter(|broker| proposed.contains(broker))
            .copied()
            .collect();
        for broker in proposed {
            if !replicas.contains(broker) {
                replicas.push(*broker);
            }
        }
        replicas
    }
}

/// Ascending broker order
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedReplicas;

impl LeaderSelectionStrategy for SortedReplicas {
    fn name(&self) -> &str {
        "sorted"
    }

    fn order(
        &self,
        _partition: &PartitionKey,
        proposed: &[BrokerId],
        _current: &[BrokerId],
    ) -> Vec<BrokerId> {
        proposed.to_vec()
    }
}

/// Strategy selector used by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderStrategyKind {
    #[default]
    Random,
    Preserve,
    Sorted,
}

impl LeaderStrategyKind {
    pub fn build(self, seed: Option<u64>) -> Box<dyn LeaderSelectionStrategy> {
        match self {
            LeaderStrategyKind::Random => match seed {
                Some(seed) => Box::new(RandomLeader::seeded(seed)),
                None => Box::new(RandomLeader::new()),
            },
            LeaderStrategyKind::Preserve => Box::new(PreserveLeader),
            LeaderStrategyKind::Sorted => Box::new(SortedReplicas),
        }
    }
}

impl FromStr for LeaderStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(LeaderStrategyKind::Random),
            "preserve" => Ok(LeaderStrategyKind::Preserve),
            "sorted" => Ok(LeaderStrategyKind::Sorted),
            other => Err(format!(
                "unknown leader strategy '{}' (expected random, preserve or sorted)",
                other
            )),
        }
    }
}

impl fmt::Display for LeaderStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LeaderStrategyKind::Random => "random",
            LeaderStrategyKind::Preserve => "preserve",
            LeaderStrategyKind::Sorted => "sorted",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PartitionKey {
        PartitionKey::new("t", 0)
    }

    #[test]
    fn test_random_is_permutation() {
        let strategy = RandomLeader::new();
        let mut ordered = strategy.order(&key(), &[1, 2, 3, 4], &[]);
        ordered.sort();
        assert_eq!(ordered, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let a = RandomLeader::seeded(42);
        let b = RandomLeader::seeded(42);
        let proposed: Vec<BrokerId> = (1..=10).collect();
        for _ in 0..5 {
            assert_eq!(
                a.order(&key(), &proposed, &[]),
                b.order(&key(), &proposed, &[])
            );
        }
    }

    #[test]
    fn test_preserve_keeps_surviving_leader() {
        let ordered = PreserveLeader.order(&key(), &[1, 3, 4], &[3, 2, 1]);
        assert_eq!(ordered, vec![3, 1, 4]);
    }

    #[test]
    fn test_preserve_with_departed_leader() {
        let ordered = PreserveLeader.order(&key(), &[1, 4], &[2, 1]);
        assert_eq!(ordered, vec![1, 4]);
    }

    #[test]
    fn test_sorted_is_identity() {
        assert_eq!(SortedReplicas.order(&key(), &[1, 5], &[5, 1]), vec![1, 5]);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Preserve".parse::<LeaderStrategyKind>(), Ok(LeaderStrategyKind::Preserve));
        assert!("first".parse::<LeaderStrategyKind>().is_err());
        assert_eq!(LeaderStrategyKind::Sorted.to_string(), "sorted");
        assert_eq!(LeaderStrategyKind::Random.build(Some(1)).name(), "random");
    }
}
