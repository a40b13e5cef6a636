//! Optimizer configuration
//!
//! Layered: defaults, then a TOML file, then environment variables. The
//! binary applies command-line flags last.
//!
//! ```toml
//! time_limit_secs = 300
//! min_factor = 0.9
//! max_factor = 1.1
//! tie_break = false
//! leader_strategy = "random"
//! leader_seed = 42
//! show_grid = false
//! accept_suboptimal = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::leader::LeaderStrategyKind;
use crate::model::TieBreak;
use crate::solver::SolveLimits;
use crate::spec::BalanceFactors;
use crate::{DEFAULT_MAX_FACTOR, DEFAULT_MIN_FACTOR};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Solver wall-clock budget in seconds; unset waits indefinitely
    pub time_limit_secs: Option<u64>,

    /// Balance factors used when the input document does not set them
    pub min_factor: f64,
    pub max_factor: f64,

    /// Prefer lower-numbered brokers among equally cheap placements
    pub tie_break: bool,

    pub leader_strategy: LeaderStrategyKind,

    /// Seed for the random leader strategy
    pub leader_seed: Option<u64>,

    /// Log current and proposed placement grids
    pub show_grid: bool,

    /// Write the best plan found when the solver stops at its limit
    pub accept_suboptimal: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: None,
            min_factor: DEFAULT_MIN_FACTOR,
            max_factor: DEFAULT_MAX_FACTOR,
            tie_break: false,
            leader_strategy: LeaderStrategyKind::Random,
            leader_seed: None,
            show_grid: false,
            accept_suboptimal: false,
        }
    }
}

impl OptimizerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Apply `REASSIGN_*` environment overrides
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn with_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("REASSIGN_TIME_LIMIT_SECS") {
            self.time_limit_secs = Some(parse_var("REASSIGN_TIME_LIMIT_SECS", &value)?);
        }
        if let Some(value) = lookup("REASSIGN_MIN_FACTOR") {
            self.min_factor = parse_var("REASSIGN_MIN_FACTOR", &value)?;
        }
        if let Some(value) = lookup("REASSIGN_MAX_FACTOR") {
            self.max_factor = parse_var("REASSIGN_MAX_FACTOR", &value)?;
        }
        if let Some(value) = lookup("REASSIGN_LEADER_STRATEGY") {
            self.leader_strategy = value.parse().map_err(Error::Configuration)?;
        }
        if let Some(value) = lookup("REASSIGN_LEADER_SEED") {
            self.leader_seed = Some(parse_var("REASSIGN_LEADER_SEED", &value)?);
        }
        if let Some(value) = lookup("REASSIGN_TIE_BREAK") {
            self.tie_break = value == "true" || value == "1";
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.balance_factors()
            .validate()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        if self.time_limit_secs == Some(0) {
            return Err(Error::Configuration(
                "time_limit_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn balance_factors(&self) -> BalanceFactors {
        BalanceFactors::new(self.min_factor, self.max_factor)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs.map(Duration::from_secs)
    }

    pub fn solve_limits(&self) -> SolveLimits {
        SolveLimits {
            time_limit: self.time_limit(),
        }
    }

    pub fn tie_break(&self) -> TieBreak {
        if self.tie_break {
            TieBreak::PreferLowerBrokers
        } else {
            TieBreak::None
        }
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Configuration(format!("invalid value for {}: {} ({})", key, value, e)))
}
