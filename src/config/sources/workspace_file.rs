//! Workspace config files under `<workspace>/config/`.
//!
//! Layers, lowest first: `config.toml`, `{VIGIL_ENV}.toml` (default
//! `development`), then an uncommitted `local.toml`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_VAR: &str = "VIGIL_ENV";
const DEFAULT_ENV: &str = "development";

/// Existing workspace config files in merge order.
pub fn workspace_layers(workspace_root: &Path) -> Vec<PathBuf> {
    let config_dir = workspace_root.join("config");
    let env_name = std::env::var(ENV_VAR)
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENV.to_string());

    [
        "config.toml".to_string(),
        format!("{}.toml", env_name),
        "local.toml".to_string(),
    ]
    .into_iter()
    .map(|name| config_dir.join(name))
    .filter(|path| path.is_file())
    .collect()
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(workspace_layers(workspace_root)
        .into_iter()
        .fold(builder, |builder, path| {
            debug!(config_path = %path.display(), "Loading workspace configuration");
            builder.add_source(File::from(path).required(false))
        }))
}
