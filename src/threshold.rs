//! Threshold Evaluator
//!
//! Compares accumulated usage against an owner's configured limits. The pure
//! [`evaluate`] step is separate from [`ThresholdEvaluator::check`], which
//! fetches configuration and statistics through the gateway first.

use crate::gateway::RemoteGateway;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const MS_PER_MINUTE: u64 = 60_000;

/// Per-owner usage limits, in minutes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdConfig {
    pub owner_id: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit_minutes: u64,
    #[serde(default = "default_weekly_limit")]
    pub weekly_limit_minutes: u64,
    #[serde(default = "default_break_reminder")]
    pub break_reminder_minutes: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_daily_limit() -> u64 {
    120
}

fn default_weekly_limit() -> u64 {
    600
}

fn default_break_reminder() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

impl ThresholdConfig {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            daily_limit_minutes: default_daily_limit(),
            weekly_limit_minutes: default_weekly_limit(),
            break_reminder_minutes: default_break_reminder(),
            enabled: default_enabled(),
        }
    }
}

/// Aggregated usage for an owner. Time fields are milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageStats {
    pub total_time: u64,
    pub today_time: u64,
    pub weekly_time: u64,
    pub monthly_time: u64,
    pub average_session_duration: u64,
    pub longest_session: u64,
    pub shortest_session: u64,
    pub sessions: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdCategory {
    Daily,
    Weekly,
    Break,
}

impl ThresholdCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdCategory::Daily => "daily",
            ThresholdCategory::Weekly => "weekly",
            ThresholdCategory::Break => "break",
        }
    }
}

/// A limit that has been met or exceeded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdBreach {
    pub category: ThresholdCategory,
    /// Fractional minutes, e.g. 90.5
    pub observed_minutes: f64,
    pub limit_minutes: u64,
}

/// Every category whose observed minutes reach its limit.
///
/// A disabled config yields nothing. Categories are independent and appear in
/// daily, weekly, break order.
pub fn evaluate(
    config: &ThresholdConfig,
    stats: &UsageStats,
    session_duration_ms: u64,
) -> Vec<ThresholdBreach> {
    if !config.enabled {
        return Vec::new();
    }

    [
        (
            ThresholdCategory::Daily,
            stats.today_time,
            config.daily_limit_minutes,
        ),
        (
            ThresholdCategory::Weekly,
            stats.weekly_time,
            config.weekly_limit_minutes,
        ),
        (
            ThresholdCategory::Break,
            session_duration_ms,
            config.break_reminder_minutes,
        ),
    ]
    .into_iter()
    .filter_map(|(category, observed_ms, limit_minutes)| {
        (observed_ms >= limit_minutes.saturating_mul(MS_PER_MINUTE)).then(|| ThresholdBreach {
            category,
            observed_minutes: observed_ms as f64 / MS_PER_MINUTE as f64,
            limit_minutes,
        })
    })
    .collect()
}

/// Fetches thresholds and stats, then evaluates them
#[derive(Clone)]
pub struct ThresholdEvaluator {
    gateway: Arc<dyn RemoteGateway>,
}

impl ThresholdEvaluator {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self { gateway }
    }

    /// Breaches for `owner_id`. Fetch failures and missing config yield none.
    pub async fn check(&self, owner_id: &str, session_duration_ms: u64) -> Vec<ThresholdBreach> {
        let config = match self.gateway.fetch_thresholds(owner_id).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!(owner_id, "No threshold config, skipping evaluation");
                return Vec::new();
            }
            Err(err) => {
                debug!(owner_id, error = %err, "Failed to fetch thresholds");
                return Vec::new();
            }
        };
        if !config.enabled {
            return Vec::new();
        }

        let stats = match self.gateway.fetch_stats(owner_id).await {
            Ok(stats) => stats,
            Err(err) => {
                debug!(owner_id, error = %err, "Failed to fetch usage stats");
                return Vec::new();
            }
        };

        evaluate(&config, &stats, session_duration_ms)
    }
}
