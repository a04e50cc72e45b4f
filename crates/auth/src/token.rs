//! Access-token lifecycle: expiry detection, refresh-token exchange and
//! persistence of the refreshed credential.
//!
//! Refresh never fails loudly. Any transport error, non-2xx status or
//! malformed body yields `None`, and the caller degrades to an unauthenticated
//! passthrough.
//!
//! Refreshes are serialized per manager. A caller that queued behind an
//! in-flight refresh of the same refresh token reuses that result instead of
//! exchanging (and persisting) a second time.
use crate::antigravity;
use bytes::Bytes;
use gravlink_config::Config;
use gravlink_types::{
    AuthRecord, CredentialStore, FetchRequest, HttpTransport, OAuthCredential, ProviderId,
    RefreshParts, credential::epoch_millis,
};
use http::{HeaderValue, Method, header};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;

/// OAuth client used for the refresh-token grant.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl Default for OAuthClient {
    fn default() -> Self {
        Self {
            client_id: antigravity::CLIENT_ID.to_string(),
            client_secret: String::new(),
            token_url: antigravity::TOKEN_URL.to_string(),
        }
    }
}

impl OAuthClient {
    /// Applies configured overrides on top of the built-in Antigravity client.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let base = Self::default();
        Self {
            client_id: config.oauth.client_id.clone().unwrap_or(base.client_id),
            client_secret: config
                .oauth
                .client_secret
                .clone()
                .unwrap_or(base.client_secret),
            token_url: config.oauth.token_url.clone().unwrap_or(base.token_url),
        }
    }
}

/// The outcome of the most recent successful exchange for a provider.
struct LastRefresh {
    /// Refresh token that was exchanged.
    source: String,
    credential: OAuthCredential,
}

/// Keeps bearer credentials valid and persists refreshed ones.
pub struct TokenManager {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn CredentialStore>,
    client: OAuthClient,
    timeout: Duration,
    last: Mutex<HashMap<ProviderId, LastRefresh>>,
}

impl TokenManager {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        client: OAuthClient,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            client,
            timeout,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self::new(
            transport,
            store,
            OAuthClient::from_config(config),
            config.refresh_timeout(),
        )
    }

    /// Returns the credential unchanged while its access token is valid,
    /// otherwise attempts a refresh.
    pub async fn ensure_fresh(
        &self,
        credential: OAuthCredential,
        provider: &ProviderId,
    ) -> Option<OAuthCredential> {
        if credential.access_token_expired() {
            self.refresh(&credential, provider).await
        } else {
            Some(credential)
        }
    }

    /// Exchange the credential's refresh token for a new access token.
    ///
    /// On success the refreshed record is persisted exactly once through the
    /// injected store before returning, whether or not Google rotated the
    /// refresh token. Returns `None` when there is no refresh token or the
    /// exchange fails.
    pub async fn refresh(
        &self,
        credential: &OAuthCredential,
        provider: &ProviderId,
    ) -> Option<OAuthCredential> {
        if !credential.refresh.has_refresh_token() {
            tracing::debug!(provider = %provider, "no refresh token; skipping refresh");
            return None;
        }

        let mut last = self.last.lock().await;
        if let Some(prev) = last.get(provider)
            && Self::covers(prev, &credential.refresh)
        {
            tracing::debug!(provider = %provider, "reusing concurrent refresh result");
            return Some(OAuthCredential {
                refresh: RefreshParts {
                    refresh_token: prev.credential.refresh.refresh_token.clone(),
                    ..credential.refresh.clone()
                },
                access: prev.credential.access.clone(),
                expires: prev.credential.expires,
            });
        }

        let refreshed = self.exchange(credential, provider).await?;

        let record = AuthRecord::OAuth(refreshed.clone());
        if let Err(e) = self.store.set(provider, &record).await {
            tracing::error!(provider = %provider, error = %e, "failed to persist refreshed credential");
        }

        last.insert(
            provider.clone(),
            LastRefresh {
                source: credential.refresh.refresh_token.clone(),
                credential: refreshed.clone(),
            },
        );
        Some(refreshed)
    }

    /// Whether a previous refresh already satisfies a request to refresh `parts`.
    fn covers(prev: &LastRefresh, parts: &RefreshParts) -> bool {
        let same_token = prev.source == parts.refresh_token
            || prev.credential.refresh.refresh_token == parts.refresh_token;
        same_token && !prev.credential.access_token_expired()
    }

    async fn exchange(
        &self,
        credential: &OAuthCredential,
        provider: &ProviderId,
    ) -> Option<OAuthCredential> {
        let started = epoch_millis();
        let params = antigravity::refresh_form_params(
            &self.client.client_id,
            &self.client.client_secret,
            &credential.refresh.refresh_token,
        );
        let body = match serde_urlencoded::to_string(&params) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode refresh form");
                return None;
            }
        };

        let mut request = FetchRequest::new(Method::POST, self.client.token_url.clone());
        request.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        request.body = Some(Bytes::from(body));

        let response = match self.transport.send(request, self.timeout).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "token refresh request failed");
                return None;
            }
        };

        let status = response.status;
        let body = match tokio::time::timeout(self.timeout, response.bytes()).await {
            Ok(Ok(b)) => b,
            Ok(Err(e)) => {
                tracing::warn!(provider = %provider, error = %e, "token refresh body unreadable");
                return None;
            }
            Err(_) => {
                tracing::warn!(provider = %provider, after = ?self.timeout, "token refresh body timed out");
                return None;
            }
        };

        if !status.is_success() {
            if antigravity::parse_error_code(&body).as_deref() == Some("invalid_grant") {
                tracing::warn!(
                    provider = %provider,
                    "refresh token was revoked or expired; re-authentication required"
                );
            } else {
                tracing::warn!(provider = %provider, status = status.as_u16(), "token refresh rejected");
            }
            return None;
        }

        let token = match antigravity::parse_token_response(&body) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "malformed token refresh response");
                return None;
            }
        };

        let rotated = token.refresh_token.is_some();
        let refresh = RefreshParts {
            refresh_token: token
                .refresh_token
                .unwrap_or_else(|| credential.refresh.refresh_token.clone()),
            ..credential.refresh.clone()
        };
        tracing::info!(provider = %provider, rotated, "access token refreshed");

        Some(OAuthCredential::new(refresh).with_access(
            token.access_token,
            started,
            token
                .expires_in
                .unwrap_or(antigravity::DEFAULT_EXPIRES_IN_SECS),
        ))
    }
}
