//! Route file loading
//!
//! Layers embedded defaults, the route file, and `AILB_` environment
//! overrides into one raw payload.

use ailb_core::RawConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Embedded default route options (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Load a route file (TOML, JSON or YAML by extension)
pub fn load_route(path: &Path) -> Result<RawConfig> {
    if !path.exists() {
        anyhow::bail!("Route file not found: {}", path.display());
    }

    let config = Config::builder()
        // 1. Embedded defaults
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. The route file itself
        .add_source(File::from(path))
        // 3. Environment variables (highest priority), e.g. AILB_REDIS__SERVICE_NAME
        .add_source(
            Environment::with_prefix("AILB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read route file {}", path.display()))?;

    config
        .try_deserialize()
        .context("Failed to deserialize route configuration")
}
