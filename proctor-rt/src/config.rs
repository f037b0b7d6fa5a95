//! proctor-rt configuration
//!
//! Compiled defaults, overlaid by the TOML file (if any), overlaid by CLI
//! flags and `PROCTOR_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::scoring::{ScoringConfig, ScoringPolicy};
use crate::session::RegistryTimeouts;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5780";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on waiting for a session lock
    pub lock_ms: u64,
    /// Bound on each durable-store call
    pub store_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            lock_ms: 2000,
            store_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Messages buffered per connection before delivery to it is dropped
    pub outbox_capacity: usize,
    /// Messages buffered on the process-wide event bus
    pub event_bus_capacity: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 64,
            event_bus_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    /// Falls back to the platform data directory
    pub database_path: Option<PathBuf>,
    /// Falls back to the `token_shared_secret` setting in the database
    pub shared_secret: Option<i64>,
    pub timeouts: TimeoutConfig,
    pub fanout: FanoutConfig,
    pub scoring: ScoringConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_path: None,
            shared_secret: None,
            timeouts: TimeoutConfig::default(),
            fanout: FanoutConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Config {
    /// Load from the resolved config file, or defaults if there is none
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        proctor_common::config::load_or_default(cli_path).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply command-line / environment overrides
    pub fn with_overrides(
        mut self,
        bind_addr: Option<String>,
        database_path: Option<PathBuf>,
        shared_secret: Option<i64>,
    ) -> Self {
        if let Some(bind_addr) = bind_addr {
            self.bind_addr = bind_addr;
        }
        if database_path.is_some() {
            self.database_path = database_path;
        }
        if shared_secret.is_some() {
            self.shared_secret = shared_secret;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeouts.lock_ms == 0 || self.timeouts.store_ms == 0 {
            return Err(Error::Config("timeouts must be greater than zero".to_string()));
        }
        if self.fanout.outbox_capacity == 0 || self.fanout.event_bus_capacity == 0 {
            return Err(Error::Config("fan-out capacities must be greater than zero".to_string()));
        }
        if self.shared_secret == Some(0) {
            return Err(Error::Config("shared_secret must be non-zero".to_string()));
        }
        let critical = self.scoring.escalation.critical_confidence;
        if !(0.0..=1.0).contains(&critical) {
            return Err(Error::Config(format!(
                "escalation.critical_confidence {} is outside [0, 1]",
                critical
            )));
        }
        ScoringPolicy::from_config(&self.scoring)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(proctor_common::config::default_database_path)
    }

    pub fn registry_timeouts(&self) -> RegistryTimeouts {
        RegistryTimeouts {
            lock: Duration::from_millis(self.timeouts.lock_ms),
            store: Duration::from_millis(self.timeouts.store_ms),
        }
    }
}
