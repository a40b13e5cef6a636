//! Error types for the reassignment optimizer
//!
//! Every failure is terminal for a run: nothing is retried and no
//! constraint is relaxed behind the caller's back.

use std::time::Duration;
use thiserror::Error;

use crate::diagnose::InfeasibilityHint;
use crate::optimizer::Reassignment;
use crate::types::{BrokerId, PartitionKey};

/// Result type alias for optimizer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the optimizer pipeline
#[derive(Error, Debug)]
pub enum Error {
    // ===== Input Errors =====
    #[error("Invalid input for `{field}`: {reason}")]
    InvalidInput { field: String, reason: String },

    // ===== Model Errors =====
    #[error("Model is infeasible: {}", format_hints(.hints))]
    Infeasible { hints: Vec<InfeasibilityHint> },

    // ===== Solver Errors =====
    #[error(
        "Solver limit {} reached before proving optimality ({})",
        format_limit(.limit),
        format_best(.best)
    )]
    SolverLimitExceeded {
        limit: Option<Duration>,
        best: Option<Box<Reassignment>>,
    },

    #[error("Solver failure: {0}")]
    SolverFailure(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::invalid_input("document", err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

/// A pin that names a slot outside the problem domain.
///
/// Dropped with a warning; the run continues because cluster topology
/// legitimately changes between the pin being written and the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "replica of partition {partition} on broker {broker} is outside the broker or partition set and won't be pinned"
)]
pub struct UnresolvablePin {
    pub partition: PartitionKey,
    pub broker: BrokerId,
}

fn format_hints(hints: &[InfeasibilityHint]) -> String {
    if hints.is_empty() {
        return "no obvious binding constraint".to_string();
    }
    hints
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_best(best: &Option<Box<Reassignment>>) -> &'static str {
    if best.is_some() {
        "best feasible plan available"
    } else {
        "no feasible plan found"
    }
}

fn format_limit(limit: &Option<Duration>) -> String {
    match limit {
        Some(limit) => format!("{:?}", limit),
        None => "(unspecified)".to_string(),
    }
}
