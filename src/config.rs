//! Configuration System
//!
//! Layered configuration for the monitor, queue, sync coordinator, gateway,
//! storage and logging. Sources are merged in order: built-in defaults, the
//! global user file, workspace files, then `VIGIL__SECTION__KEY` environment
//! variables.

use crate::error::ApiError;
use crate::gateway::GatewayConfig;
use crate::logging::LoggingConfig;
use crate::monitor::MonitorConfig;
use crate::queue::QueuedMutation;
use crate::sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Retry budget for mutations created by this process
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    QueuedMutation::DEFAULT_MAX_RETRIES
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

/// Local storage paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database holding the offline queue. Relative paths resolve
    /// against the workspace root.
    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,
}

/// `<data dir>/vigil/queue`, or `.vigil/queue` when no home directory is known.
pub fn default_queue_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "vigil")
        .map(|dirs| dirs.data_dir().join("queue"))
        .unwrap_or_else(|| PathBuf::from(".vigil").join("queue"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            queue_path: default_queue_path(),
        }
    }
}

impl StorageConfig {
    pub fn resolve_queue_path(&self, workspace_root: &Path) -> PathBuf {
        if self.queue_path.is_absolute() {
            self.queue_path.clone()
        } else {
            workspace_root.join(&self.queue_path)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Monitor(String),
    Queue(String),
    Sync(String),
    Gateway(String),
    Storage(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Monitor(msg) => write!(f, "monitor: {}", msg),
            ValidationError::Queue(msg) => write!(f, "queue: {}", msg),
            ValidationError::Sync(msg) => write!(f, "sync: {}", msg),
            ValidationError::Gateway(msg) => write!(f, "gateway: {}", msg),
            ValidationError::Storage(msg) => write!(f, "storage: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl VigilConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.monitor.validate() {
            errors.push(ValidationError::Monitor(e));
        }
        if self.queue.max_retries == 0 {
            errors.push(ValidationError::Queue(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if let Err(e) = self.sync.validate() {
            errors.push(ValidationError::Sync(e));
        }
        if let Err(e) = self.gateway.validate() {
            errors.push(ValidationError::Gateway(e));
        }
        if self.storage.queue_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "queue_path cannot be empty".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold every problem into a single `ApiError`.
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })
    }
}
