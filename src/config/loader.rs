//! Config loader: builds `VigilConfig` from the layered sources.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::VigilConfig;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Order: defaults, global file, `config/config.toml`,
    /// `config/{VIGIL_ENV}.toml`, then `VIGIL__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<VigilConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Load configuration from one explicit file over the defaults.
    pub fn load_from_file(path: &Path) -> Result<VigilConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()))
            .build()?
            .try_deserialize()
    }

    /// Location of the user-level config file, if a home directory is known.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
