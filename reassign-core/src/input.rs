//! Input and output documents
//!
//! Input document (stdin by default):
//! ```json
//! {
//!   "brokers": "1,2,3,4,5,6",
//!   "new_replication_factor": 3,
//!   "balance_parameters": { "min_factor": 0.5, "max_factor": 1.5 },
//!   "partitions": {
//!     "version": 1,
//!     "partitions": [ {"topic": "t1", "partition": 0, "replicas": [1,3,5]} ]
//!   },
//!   "pinned_replicas": [ {"topic": "t1", "partition": 0, "replica": 3} ],
//!   "partition_weights": [ {"topic": "t1", "partition": 0, "weight": 2.5} ]
//! }
//! ```
//!
//! The output document uses the `kafka-reassign-partitions` layout:
//! `{"version": 1, "partitions": [...]}`.

use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::error::{Error, Result};
use crate::types::{BrokerId, PartitionKey};

/// Output document version
pub const PLAN_VERSION: u32 = 1;

/// Raw input document, before normalization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputDocument {
    /// Required; kept optional here so a missing field is reported by name
    #[serde(default)]
    pub brokers: Option<BrokerList>,

    /// Values <= 0 keep each partition's current replication factor
    #[serde(default)]
    pub new_replication_factor: Option<i64>,

    #[serde(default)]
    pub balance_parameters: Option<BalanceParameters>,

    /// Required
    #[serde(default)]
    pub partitions: Option<PartitionsDocument>,

    #[serde(default)]
    pub pinned_replicas: Vec<PinnedReplicaEntry>,

    #[serde(default)]
    pub partition_weights: Vec<PartitionWeightEntry>,
}

impl InputDocument {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Broker list, either `"1,2,3"` or `[1, 2, 3]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BrokerList {
    Csv(String),
    Ids(Vec<BrokerId>),
}

impl BrokerList {
    /// Parse into broker ids, in document order
    pub fn parse(&self) -> Result<Vec<BrokerId>> {
        match self {
            BrokerList::Ids(ids) => Ok(ids.clone()),
            BrokerList::Csv(csv) => csv
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(|token| {
                    token.parse::<BrokerId>().map_err(|e| {
                        Error::invalid_input("brokers", format!("invalid broker id '{}': {}", token, e))
                    })
                })
                .collect(),
        }
    }
}

/// Balance tolerance around the mean broker load
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceParameters {
    #[serde(default)]
    pub min_factor: Option<f64>,
    #[serde(default)]
    pub max_factor: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionsDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    pub partitions: Vec<PartitionEntry>,
}

fn default_version() -> u32 {
    PLAN_VERSION
}

/// One partition and its replica list; the first replica is the leader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub topic: String,
    pub partition: u32,
    pub replicas: Vec<BrokerId>,
}

impl PartitionEntry {
    pub fn key(&self) -> PartitionKey {
        PartitionKey::new(self.topic.clone(), self.partition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedReplicaEntry {
    pub topic: String,
    pub partition: u32,
    pub replica: BrokerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionWeightEntry {
    pub topic: String,
    pub partition: u32,
    pub weight: f64,
}

/// Proposed reassignment, ready for `kafka-reassign-partitions --execute`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignmentPlan {
    pub version: u32,
    pub partitions: Vec<PartitionEntry>,
}

impl ReassignmentPlan {
    pub fn new(partitions: Vec<PartitionEntry>) -> Self {
        Self {
            version: PLAN_VERSION,
            partitions,
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}
