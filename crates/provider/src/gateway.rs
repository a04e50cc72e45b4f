//! The fetch-shaped entry point.
//!
//! [`Gateway::fetch`] is a drop-in replacement for a plain HTTP fetch:
//! requests outside the generative-language convention, or made without a
//! usable OAuth credential, go out untouched. Everything else is refreshed,
//! bound to a project, routed across the backend endpoints and normalized.

use crate::{
    request::{self, CallContext, PreparedRequest, RequestOptions},
    response,
    router::EndpointRouter,
};
use gravlink_auth::{ProjectResolver, TokenManager};
use gravlink_config::Config;
use gravlink_types::{
    AuthRecord, CredentialStore, FetchRequest, FetchResponse, HeaderStyle, HttpTransport,
    OAuthCredential, ProviderId, traits::Result,
};
use std::{sync::Arc, time::Duration};
use tracing::Instrument as _;

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Backend header style; `None` uses the configured default.
    pub header_style: Option<HeaderStyle>,
    pub force_thinking_recovery: bool,
}

pub struct Gateway {
    provider: ProviderId,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn HttpTransport>,
    tokens: TokenManager,
    projects: ProjectResolver,
    router: EndpointRouter,
    default_style: HeaderStyle,
    tool_hardening: bool,
    attempt_timeout: Duration,
}

impl Gateway {
    pub fn new(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            provider: config.provider(),
            tokens: TokenManager::from_config(config, transport.clone(), store.clone()),
            projects: ProjectResolver::from_config(config, transport.clone(), store.clone()),
            router: EndpointRouter::new(config.endpoints.clone(), config.attempt_timeout()),
            default_style: config.header_style,
            tool_hardening: config.tool_hardening,
            attempt_timeout: config.attempt_timeout(),
            store,
            transport,
        }
    }

    #[must_use]
    pub fn router(&self) -> &EndpointRouter {
        &self.router
    }

    #[must_use]
    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    /// [`Self::fetch_with`] using the configured defaults.
    ///
    /// # Errors
    ///
    /// See [`Self::fetch_with`].
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        self.fetch_with(request, FetchOptions::default()).await
    }

    /// Send `request`, translating it for the backend when it is a
    /// generative-language call and an OAuth credential is available.
    ///
    /// # Errors
    ///
    /// Returns a store error, a project resolution error, or the last
    /// endpoint's transport error when every endpoint failed without a
    /// response.
    pub async fn fetch_with(
        &self,
        request: FetchRequest,
        options: FetchOptions,
    ) -> Result<FetchResponse> {
        if !request::is_generative_language_request(&request.url)
            || request::parse_model_path(&request.url).is_none()
        {
            return self.passthrough(request).await;
        }
        let Some(credential) = self.usable_credential().await? else {
            return self.passthrough(request).await;
        };
        let Some(access) = credential.access_token() else {
            return self.passthrough(request).await;
        };

        let project = self.projects.resolve(&credential, &self.provider).await?;
        tracing::debug!(project = %project.project_id, source = %project.source, "project resolved");

        let request_options = RequestOptions {
            tool_hardening: self.tool_hardening,
            force_thinking_recovery: options.force_thinking_recovery,
        };
        let inbound = &request;
        let project_id = project.project_id.as_str();

        let routed = self
            .router
            .route(|endpoint| async move {
                let ctx = CallContext {
                    access_token: access,
                    project_id,
                    endpoint: &endpoint,
                    header_style: options.header_style,
                    default_style: self.default_style,
                };
                let prepared = request::prepare(inbound, &ctx, request_options)?;
                let span = tracing::info_span!(
                    "gravlink.fetch",
                    original_url = %inbound.url,
                    resolved_url = %prepared.request.url,
                    method = %prepared.request.method,
                    streaming = prepared.streaming,
                    project = %prepared.project_id,
                    model = %prepared.effective_model,
                );
                self.attempt(prepared).instrument(span).await
            })
            .await?;

        tracing::debug!(
            endpoint = %routed.endpoint,
            attempts = routed.attempts,
            status = routed.response.status.as_u16(),
            "call routed"
        );
        response::transform(routed.response, &routed.context).await
    }

    async fn attempt(&self, prepared: PreparedRequest) -> Result<(FetchResponse, PreparedRequest)> {
        if let Some(tool_debug) = &prepared.tool_debug {
            tracing::debug!(
                missing_schemas = tool_debug.missing_schemas,
                tools = %tool_debug.summary,
                "tool declarations"
            );
        }
        let mut response = self
            .transport
            .send(prepared.request.clone(), self.attempt_timeout)
            .await?;
        tracing::debug!(status = response.status.as_u16(), "backend responded");
        // Unary bodies are read here so the router's attempt timeout covers them.
        if !prepared.streaming {
            response = response.into_buffered().await?;
        }
        Ok((response, prepared))
    }

    /// The stored OAuth credential, refreshed when expired. `None` means the
    /// call should go out unauthenticated.
    async fn usable_credential(&self) -> Result<Option<OAuthCredential>> {
        let credential = match self.store.load(&self.provider).await? {
            Some(AuthRecord::OAuth(credential)) => credential,
            Some(AuthRecord::ApiKey { .. }) | None => return Ok(None),
        };
        let refreshed = self.tokens.ensure_fresh(credential, &self.provider).await;
        if refreshed.is_none() {
            tracing::warn!(provider = %self.provider, "could not refresh access token; passing request through");
        }
        Ok(refreshed)
    }

    async fn passthrough(&self, request: FetchRequest) -> Result<FetchResponse> {
        tracing::trace!(url = %request.url, "passthrough");
        self.transport.send(request, self.attempt_timeout).await
    }
}
