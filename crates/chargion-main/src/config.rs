// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of ChargION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use chargion_types::config::SystemConfig;

/// Load and validate the TOML configuration. The path comes from
/// CHARGION_CONFIG or defaults to ./config.toml. Validation failures are
/// fatal here, at the boundary where they are detected.
pub fn load_config() -> Result<SystemConfig> {
    let path = std::env::var("CHARGION_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    load_config_from(Path::new(&path))
}

pub fn load_config_from(path: &Path) -> Result<SystemConfig> {
    info!("📋 Loading configuration from {}", path.display());

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: SystemConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    Ok(config)
}
