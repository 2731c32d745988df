//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, GatewayError};

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::GatewayError(GatewayError::Transport(_)) => {
            format!("{} (is the remote service reachable?)", e)
        }
        ApiError::GatewayError(GatewayError::AuthFailed(_)) => {
            format!("{} (check gateway.auth_token)", e)
        }
        _ => e.to_string(),
    }
}
