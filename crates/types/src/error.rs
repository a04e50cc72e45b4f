//! Unified error type for the gravlink workspace.

use std::time::Duration;
use thiserror::Error;

/// Enumerates all error kinds that can occur across gravlink crates.
#[derive(Debug, Error)]
pub enum GravlinkError {
    /// OAuth or credential authentication failure.
    #[error("authentication error: {0}")]
    Auth(String),

    /// No stored credential exists for the given provider.
    #[error("credential not found for provider: {0}")]
    TokenNotFound(crate::ProviderId),

    /// No usable project id could be determined for the credential.
    #[error("project resolution failed: {0}")]
    ProjectResolution(String),

    /// HTTP transport error (connect, TLS, reset, body read).
    #[error("http error: {0}")]
    Http(String),

    /// A single endpoint attempt exceeded its timeout.
    #[error("request to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credential persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Request or response shape could not be translated.
    #[error("translation error: {0}")]
    Translation(String),

    /// Every candidate endpoint failed without producing a response.
    #[error("all Antigravity endpoints failed")]
    AllEndpointsFailed,
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for GravlinkError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<std::io::Error> for GravlinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl GravlinkError {
    /// Returns `true` for transport-level failures, which the endpoint router
    /// treats as retryable on any candidate but the last.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GravlinkError>;
