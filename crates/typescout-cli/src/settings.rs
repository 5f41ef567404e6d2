//! Discovery settings file (TOML)

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use typescout_core::DiscoveryConfig;

/// Load discovery settings. A missing file falls back to defaults.
pub fn load(path: Option<&Path>) -> Result<DiscoveryConfig> {
    let Some(path) = path else {
        return Ok(DiscoveryConfig::default());
    };

    if !path.exists() {
        warn!("Settings file {} not found, using defaults", path.display());
        return Ok(DiscoveryConfig::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: DiscoveryConfig = toml::from_str(&content)
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    info!("Loaded settings from {}", path.display());
    Ok(config)
}

/// Render a configuration in the settings file format
pub fn render(config: &DiscoveryConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}
