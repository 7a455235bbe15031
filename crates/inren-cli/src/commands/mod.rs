//! Sub-command implementations and the helpers they share.

pub mod batch;
pub mod config;
pub mod process;

use std::path::{Path, PathBuf};

use tracing::debug;

use inren_core::models::config::InrenConfig;
use inren_core::{FieldConfig, FieldName};

/// `<config dir>/inren/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("inren")
        .join("config.json")
}

/// The config file in use: `--config` if given, else the default location.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load the configuration file (defaults if absent) with environment overrides applied.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<InrenConfig> {
    let path = config_path(explicit);
    let mut config = read_config(&path, explicit.is_some())?;
    config.api = config.api.with_env_overrides();
    Ok(config)
}

/// Read a config file without environment overrides.
pub fn read_config(path: &Path, required: bool) -> anyhow::Result<InrenConfig> {
    if path.exists() {
        debug!("Loading config from {}", path.display());
        Ok(InrenConfig::from_file(path)?)
    } else if required {
        anyhow::bail!("Config file not found: {}", path.display())
    } else {
        Ok(InrenConfig::default())
    }
}

/// Field selection from `--fields`, falling back to the configured one.
pub fn field_selection(fields: &[FieldName], configured: &[FieldConfig]) -> Vec<FieldConfig> {
    if fields.is_empty() {
        configured.to_vec()
    } else {
        FieldConfig::from_names(fields)
    }
}
