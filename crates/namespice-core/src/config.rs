//! Controller configuration
//!
//! Loaded from a YAML file (every field optional), then overridden by
//! command line flags.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Default namespace annotation listing the classes of a namespace
pub const DEFAULT_ANNOTATION_KEY: &str = "namespice.io/class";

/// Default ownership label stamped on every managed object
pub const DEFAULT_LABEL_KEY: &str = "namespice.io/class";

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ControllerConfig {
    /// Namespace annotation holding the comma-separated class list
    #[serde(default = "default_annotation_key")]
    pub annotation_key: String,

    /// Ownership label key
    #[serde(default = "default_label_key")]
    pub label_key: String,

    /// Period of the drift-correcting full sweep
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Period after which each watch stream is restarted to force a relist
    #[serde(default = "default_relist_interval", with = "humantime_serde")]
    pub relist_interval: Duration,

    /// Per-type list requests kept in flight during a sweep
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
}

fn default_annotation_key() -> String {
    DEFAULT_ANNOTATION_KEY.to_string()
}

fn default_label_key() -> String {
    DEFAULT_LABEL_KEY.to_string()
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_relist_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_scan_concurrency() -> usize {
    8
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            annotation_key: default_annotation_key(),
            label_key: default_label_key(),
            sweep_interval: default_sweep_interval(),
            relist_interval: default_relist_interval(),
            scan_concurrency: default_scan_concurrency(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty file deserializes to null
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.annotation_key.trim().is_empty() {
            return Err(invalid("annotationKey must not be empty"));
        }
        if self.label_key.trim().is_empty() {
            return Err(invalid("labelKey must not be empty"));
        }
        if self.sweep_interval.is_zero() {
            return Err(invalid("sweepInterval must be greater than zero"));
        }
        if self.relist_interval.is_zero() {
            return Err(invalid("relistInterval must be greater than zero"));
        }
        if self.scan_concurrency == 0 {
            return Err(invalid("scanConcurrency must be at least 1"));
        }
        Ok(())
    }

    /// Label selector matching every managed object ("key exists")
    pub fn ownership_selector(&self) -> &str {
        &self.label_key
    }
}

fn invalid(message: &str) -> CoreError {
    CoreError::InvalidConfig {
        message: message.to_string(),
    }
}
