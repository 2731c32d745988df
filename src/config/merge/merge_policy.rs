//! Merge rules: defaults, override order, conflict handling.

use crate::config::default_queue_path;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("monitor.idle_timeout_secs", 300)?
        .set_default("monitor.tick_interval_secs", 60)?
        .set_default("queue.max_retries", 3)?
        .set_default("sync.tag", "vigil-background-sync")?
        .set_default("sync.periodic_interval_secs", 900)?
        .set_default(
            "storage.queue_path",
            default_queue_path().to_string_lossy().to_string(),
        )
}
