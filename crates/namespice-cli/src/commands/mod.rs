//! CLI commands

pub mod render;
pub mod run;
pub mod sweep;

use std::path::Path;
use std::time::Duration;

use namespice_core::ControllerConfig;

use crate::error::{CliError, Result};

/// Load the controller configuration and apply command-line overrides
pub fn load_config(
    path: Option<&Path>,
    sweep_interval: Option<Duration>,
    relist_interval: Option<Duration>,
) -> Result<ControllerConfig> {
    let mut config = match path {
        Some(path) => ControllerConfig::load_from(path).map_err(|e| {
            CliError::config_with_help(
                format!("{}: {}", path.display(), e),
                "known keys: annotationKey, labelKey, sweepInterval, relistInterval, scanConcurrency",
            )
        })?,
        None => ControllerConfig::default(),
    };

    if let Some(interval) = sweep_interval {
        config.sweep_interval = interval;
    }
    if let Some(interval) = relist_interval {
        config.relist_interval = interval;
    }

    config.validate()?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

/// Parse a human duration such as `30s` or `10m`
pub fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}
