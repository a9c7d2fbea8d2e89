use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use wardencore_rs::utils::DurationLimits;

use crate::Error;

/// Engine configuration
///
/// Loaded from a YAML file; every field has a default, so an empty document
/// is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub reconciler: ReconcilerConfig,
    pub duration_limits: DurationLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the durable store document
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/user_logs.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Seconds between reconciliation ticks
    pub interval_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = std::fs::File::open(path)
            .map_err(|e| format!("{} could not be loaded: {}", path.display(), e))?;

        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconciler.interval_secs)
    }
}
