//! Remote Gateway
//!
//! Client side of the HTTP endpoints this crate talks to: session persistence,
//! usage statistics, threshold configuration, consent, and verbatim replay of
//! queued mutations.

use crate::consent::ConsentUpdate;
use crate::error::GatewayError;
use crate::monitor::Session;
use crate::queue::QueuedMutation;
use crate::threshold::{ThresholdConfig, UsageStats};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Gateway connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the remote API, e.g. `https://example.org/api/screen-time`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token attached to every request
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Applies to API calls only; replay is bounded by `sync.request_timeout_secs`
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000/api/screen-time".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!(
                "base_url must start with http:// or https:// (got '{}')",
                self.base_url
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Result of replaying a queued mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub status: u16,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Remote service consumed by the monitor, evaluator, toggle and sync coordinator
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Persist a finalized session
    async fn save_session(&self, session: &Session) -> Result<(), GatewayError>;

    /// Aggregated usage statistics for an owner
    async fn fetch_stats(&self, owner_id: &str) -> Result<UsageStats, GatewayError>;

    /// Threshold configuration for an owner, `None` when none is configured
    async fn fetch_thresholds(
        &self,
        owner_id: &str,
    ) -> Result<Option<ThresholdConfig>, GatewayError>;

    async fn set_thresholds(&self, config: &ThresholdConfig) -> Result<(), GatewayError>;

    async fn update_consent(&self, update: &ConsentUpdate) -> Result<(), GatewayError>;

    /// Send a queued mutation exactly as it was recorded.
    ///
    /// Any HTTP response is an `Ok` outcome; only transport failures are errors.
    async fn replay(&self, mutation: &QueuedMutation) -> Result<DeliveryOutcome, GatewayError>;

    /// URL a failed `save_session` should be queued against
    fn sessions_url(&self) -> String;
}

fn map_http_error(error: reqwest::Error) -> GatewayError {
    if let Some(status) = error.status() {
        match status.as_u16() {
            401 | 403 => GatewayError::AuthFailed(error.to_string()),
            404 => GatewayError::NotFound(error.to_string()),
            code => GatewayError::Status {
                status: code,
                body: error.to_string(),
            },
        }
    } else if error.is_timeout() {
        GatewayError::Transport(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        GatewayError::Transport(format!("Connection error: {}", error))
    } else if error.is_decode() {
        GatewayError::Decode(error.to_string())
    } else {
        GatewayError::Transport(format!("HTTP error: {}", error))
    }
}

async fn ensure_success(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(match status.as_u16() {
        401 | 403 => GatewayError::AuthFailed(body),
        404 => GatewayError::NotFound(body),
        code => GatewayError::Status { status: code, body },
    })
}

/// reqwest-backed gateway
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Client(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Authorized API call bounded by `request_timeout_secs`.
    fn api(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, self.endpoint(path))
            .timeout(Duration::from_secs(self.config.request_timeout_secs));
        self.authorize(request)
    }

    /// Verbatim request for a queued mutation, without a client-side timeout.
    fn replay_request(&self, mutation: &QueuedMutation) -> Result<RequestBuilder, GatewayError> {
        let method = Method::from_bytes(mutation.method.as_bytes())
            .map_err(|e| GatewayError::Client(format!("Invalid method: {}", e)))?;
        let mut request = self.client.request(method, &mutation.url);
        for (name, value) in &mutation.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &mutation.body {
            request = request.body(body.clone());
        }
        // Recorded headers may already carry credentials.
        if !mutation
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("authorization"))
        {
            request = self.authorize(request);
        }
        Ok(request)
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn save_session(&self, session: &Session) -> Result<(), GatewayError> {
        let response = self
            .api(Method::POST, "sessions")
            .json(session)
            .send()
            .await
            .map_err(map_http_error)?;
        ensure_success(response).await?;
        debug!(session_id = %session.id, "Session persisted");
        Ok(())
    }

    async fn fetch_stats(&self, owner_id: &str) -> Result<UsageStats, GatewayError> {
        let response = self
            .api(Method::GET, "stats")
            .query(&[("ownerId", owner_id)])
            .send()
            .await
            .map_err(map_http_error)?;
        let response = ensure_success(response).await?;
        response
            .json::<UsageStats>()
            .await
            .map_err(|e| GatewayError::Decode(format!("Failed to parse stats: {}", e)))
    }

    async fn fetch_thresholds(
        &self,
        owner_id: &str,
    ) -> Result<Option<ThresholdConfig>, GatewayError> {
        let response = self
            .api(Method::GET, "thresholds")
            .query(&[("ownerId", owner_id)])
            .send()
            .await
            .map_err(map_http_error)?;
        let response = match ensure_success(response).await {
            Ok(response) => response,
            Err(GatewayError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        response
            .json::<Option<ThresholdConfig>>()
            .await
            .map_err(|e| GatewayError::Decode(format!("Failed to parse thresholds: {}", e)))
    }

    async fn set_thresholds(&self, config: &ThresholdConfig) -> Result<(), GatewayError> {
        let response = self
            .api(Method::POST, "thresholds")
            .json(config)
            .send()
            .await
            .map_err(map_http_error)?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn update_consent(&self, update: &ConsentUpdate) -> Result<(), GatewayError> {
        let response = self
            .api(Method::PATCH, "consent")
            .json(update)
            .send()
            .await
            .map_err(map_http_error)?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn replay(&self, mutation: &QueuedMutation) -> Result<DeliveryOutcome, GatewayError> {
        let response = self
            .replay_request(mutation)?
            .send()
            .await
            .map_err(map_http_error)?;
        Ok(DeliveryOutcome {
            status: response.status().as_u16(),
        })
    }

    fn sessions_url(&self) -> String {
        self.endpoint("sessions")
    }
}

/// In-memory gateway for unit tests
#[cfg(test)]
#[derive(Default)]
pub struct MockGateway {
    pub saved: parking_lot::Mutex<Vec<Session>>,
    pub consents: parking_lot::Mutex<Vec<ConsentUpdate>>,
    pub replayed: parking_lot::Mutex<Vec<String>>,
    pub thresholds: parking_lot::Mutex<Option<ThresholdConfig>>,
    pub stats: parking_lot::Mutex<UsageStats>,
    /// Replay status per URL; unlisted URLs answer 200
    pub statuses: parking_lot::Mutex<std::collections::HashMap<String, u16>>,
    pub fail_saves: std::sync::atomic::AtomicBool,
    pub fail_consent: std::sync::atomic::AtomicBool,
    pub offline: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MockGateway {
    pub fn respond_with(&self, url: &str, status: u16) {
        self.statuses.lock().insert(url.to_string(), status);
    }
}

#[cfg(test)]
#[async_trait]
impl RemoteGateway for MockGateway {
    async fn save_session(&self, session: &Session) -> Result<(), GatewayError> {
        use std::sync::atomic::Ordering;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("offline".to_string()));
        }
        self.saved.lock().push(session.clone());
        Ok(())
    }

    async fn fetch_stats(&self, _owner_id: &str) -> Result<UsageStats, GatewayError> {
        Ok(self.stats.lock().clone())
    }

    async fn fetch_thresholds(
        &self,
        _owner_id: &str,
    ) -> Result<Option<ThresholdConfig>, GatewayError> {
        Ok(self.thresholds.lock().clone())
    }

    async fn set_thresholds(&self, config: &ThresholdConfig) -> Result<(), GatewayError> {
        *self.thresholds.lock() = Some(config.clone());
        Ok(())
    }

    async fn update_consent(&self, update: &ConsentUpdate) -> Result<(), GatewayError> {
        use std::sync::atomic::Ordering;
        if self.fail_consent.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.consents.lock().push(update.clone());
        Ok(())
    }

    async fn replay(&self, mutation: &QueuedMutation) -> Result<DeliveryOutcome, GatewayError> {
        use std::sync::atomic::Ordering;
        self.replayed.lock().push(mutation.id.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("offline".to_string()));
        }
        let status = self
            .statuses
            .lock()
            .get(&mutation.url)
            .copied()
            .unwrap_or(200);
        Ok(DeliveryOutcome { status })
    }

    fn sessions_url(&self) -> String {
        "http://mock/api/screen-time/sessions".to_string()
    }
}
