//! Consent toggle for usage tracking.

use crate::error::ApiError;
use crate::gateway::RemoteGateway;
use crate::monitor::ActivityMonitor;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Host capability gating usage tracking
#[async_trait]
pub trait UsagePermission: Send + Sync {
    async fn is_granted(&self) -> bool;

    /// Ask the host to grant access, e.g. by opening its settings screen.
    async fn request(&self) {}
}

/// Host permission that is always granted
pub struct AlwaysGranted;

#[async_trait]
impl UsagePermission for AlwaysGranted {
    async fn is_granted(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentUpdate {
    pub owner_id: String,
    pub consent: bool,
    /// RFC 3339 UTC timestamp
    pub consent_date: String,
}

impl ConsentUpdate {
    pub fn new(owner_id: impl Into<String>, consent: bool) -> Self {
        Self::at(owner_id, consent, Utc::now())
    }

    pub fn at(owner_id: impl Into<String>, consent: bool, when: DateTime<Utc>) -> Self {
        Self {
            owner_id: owner_id.into(),
            consent,
            consent_date: when.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    /// The host has not granted usage access; nothing was recorded.
    PermissionRequired,
    Enabled,
    Disabled,
}

/// Opt-in switch for usage tracking.
///
/// When a monitor is attached, enabling starts a session for the owner and
/// disabling ends it, so tracking only runs while consent is recorded.
pub struct ConsentToggle {
    gateway: Arc<dyn RemoteGateway>,
    permission: Arc<dyn UsagePermission>,
    monitor: Option<Arc<ActivityMonitor>>,
    state: Mutex<ToggleState>,
}

impl ConsentToggle {
    pub fn new(gateway: Arc<dyn RemoteGateway>, permission: Arc<dyn UsagePermission>) -> Self {
        Self {
            gateway,
            permission,
            monitor: None,
            state: Mutex::new(ToggleState::Disabled),
        }
    }

    /// Start and stop `monitor` along with consent.
    pub fn with_monitor(mut self, monitor: Arc<ActivityMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Last state reached by `enable` or `disable`.
    pub fn status(&self) -> ToggleState {
        *self.state.lock()
    }

    pub async fn enable(&self, owner_id: &str) -> Result<ToggleState, ApiError> {
        if !self.permission.is_granted().await {
            self.permission.request().await;
            if !self.permission.is_granted().await {
                info!(owner_id, "Usage access not granted, tracking stays off");
                *self.state.lock() = ToggleState::PermissionRequired;
                return Ok(ToggleState::PermissionRequired);
            }
        }
        self.gateway
            .update_consent(&ConsentUpdate::new(owner_id, true))
            .await?;
        if let Some(monitor) = &self.monitor {
            let session = monitor.start_session(owner_id).await;
            info!(owner_id, session_id = %session.id, "Usage tracking enabled");
        } else {
            info!(owner_id, "Usage tracking enabled");
        }
        *self.state.lock() = ToggleState::Enabled;
        Ok(ToggleState::Enabled)
    }

    /// Stop tracking, then record the revocation remotely.
    pub async fn disable(&self, owner_id: &str) -> Result<ToggleState, ApiError> {
        if let Some(monitor) = &self.monitor {
            monitor.end_session().await;
        }
        *self.state.lock() = ToggleState::Disabled;
        self.gateway
            .update_consent(&ConsentUpdate::new(owner_id, false))
            .await?;
        info!(owner_id, "Usage tracking disabled");
        Ok(ToggleState::Disabled)
    }
}
