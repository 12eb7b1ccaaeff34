//! Scheduler configuration.
//!
//! ```toml
//! max_concurrency = 4
//! execute_tasks_in_background_enabled = true
//! start_suspended = false
//! foreground = true
//! ```
//!
//! Every key is optional; unknown keys are rejected.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Number of workers, i.e. the maximum number of Executing tasks.
    pub max_concurrency: usize,

    /// Scheduler-wide switch for starting network-bound work while the host
    /// lacks foreground priority. ANDed with the background policy.
    pub execute_tasks_in_background_enabled: bool,

    /// Build the scheduler with the suspend flag already set.
    pub start_suspended: bool,

    /// Initial host state.
    pub foreground: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            execute_tasks_in_background_enabled: true,
            start_suspended: false,
            foreground: true,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl SchedulerConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, SchedulerError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_concurrency == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
