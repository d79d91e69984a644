//! Secrets and per-environment overrides read from the process environment.
//!
//! `.env` is loaded first if present. Tokens are never logged; only whether
//! they were found.

use std::env;

use anyhow::{anyhow, Context, Result};
use harvest_core::config::Config;

pub const API_TOKEN_VAR: &str = "HARVEST_API_TOKEN";
pub const DRIVE_TOKEN_VAR: &str = "HARVEST_DRIVE_TOKEN";
pub const PROJECT_ID_VAR: &str = "HARVEST_PROJECT_ID";
pub const PROJECT_NAME_VAR: &str = "HARVEST_PROJECT_NAME";

fn required(var: &str) -> Result<String> {
    dotenvy::dotenv().ok();
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => {
            tracing::info!(var, token_set = true, "Loaded secret from environment");
            Ok(value)
        }
        Ok(_) => {
            tracing::error!(var, "Secret is empty in environment");
            Err(anyhow!("{var} is set but empty"))
        }
        Err(e) => {
            tracing::error!(error = ?e, var, "Secret missing in environment");
            Err(anyhow!("{var} must be set in the environment (or .env)"))
        }
    }
}

/// Bearer token for the annotation platform.
pub fn api_token_from_env() -> Result<String> {
    required(API_TOKEN_VAR)
}

/// OAuth access token for the Drive listing API.
pub fn drive_token_from_env() -> Result<String> {
    required(DRIVE_TOKEN_VAR)
}

/// Apply `HARVEST_PROJECT_ID` / `HARVEST_PROJECT_NAME` over the loaded config.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    dotenvy::dotenv().ok();
    if let Ok(raw) = env::var(PROJECT_ID_VAR) {
        config.publish.project_id = raw.trim().parse::<i64>().map_err(|e| {
            tracing::error!(error = ?e, raw = %raw, "Failed to parse project id from env");
            e
        }).with_context(|| format!("{PROJECT_ID_VAR} must be an integer"))?;
    }
    if let Ok(name) = env::var(PROJECT_NAME_VAR) {
        config.publish.project_name = name;
    }
    Ok(())
}
