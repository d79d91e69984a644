/// `load_config` module: loads the static YAML configuration and applies
/// environment overrides on top of it.
///
/// This is the only place where user-supplied YAML is parsed. Every section
/// is optional and falls back to the defaults in `harvest_core::config`.
/// Secrets (tokens) are never read from YAML; see [`crate::credentials`].
///
/// # Errors
/// All errors use `anyhow::Error` with the offending path in context, and are
/// surfaced at the CLI boundary.
use anyhow::{Context, Result};
use harvest_core::config::Config;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::credentials::apply_env_overrides;

/// Loads a YAML config file, validates value ranges and applies env overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config = parse_config(&config_content)
        .with_context(|| format!("Invalid config file {}", path_ref.display()))?;
    apply_env_overrides(&mut config)?;
    config.trace_loaded();
    Ok(config)
}

/// Parses and validates YAML text. An empty document yields the defaults.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(content).map_err(|e| {
            error!(error = ?e, "Failed to parse config YAML");
            anyhow::anyhow!("Failed to parse config YAML: {e}")
        })?
    };
    config.validate()?;
    Ok(config)
}

/// The config at `path`, or the defaults (plus env overrides) when no path is given.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => {
            let mut config = Config::default();
            apply_env_overrides(&mut config)?;
            config.trace_loaded();
            Ok(config)
        }
    }
}
