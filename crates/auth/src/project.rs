//! Cloud project resolution for Code Assist calls.
//!
//! Order: a project embedded in the credential's refresh state, then
//! `loadCodeAssist` discovery across the load endpoints, then the reserved
//! default project (if allowed). A discovered managed project is packed into
//! the credential and persisted so later calls skip discovery.
use crate::antigravity;
use gravlink_config::Config;
use gravlink_types::{
    AuthRecord, CredentialStore, FetchRequest, GravlinkError, HeaderStyle, HttpTransport,
    OAuthCredential, ProviderId, traits::Result,
};
use http::{HeaderName, HeaderValue, header};
use serde_json::{Value, json};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tokio::sync::Mutex;

/// Where a resolved project id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectSource {
    /// Packed into the credential's refresh state.
    Embedded,
    /// Returned by `loadCodeAssist`.
    Discovered,
    /// The reserved fallback project.
    Default,
}

impl fmt::Display for ProjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Embedded => "embedded",
            Self::Discovered => "discovered",
            Self::Default => "default",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub project_id: String,
    pub source: ProjectSource,
}

pub struct ProjectResolver {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn CredentialStore>,
    load_endpoints: Vec<String>,
    default_project_id: Option<String>,
    timeout: Duration,
    /// Keyed by the packed refresh state.
    cache: Mutex<HashMap<String, ProjectContext>>,
}

impl ProjectResolver {
    /// `default_project_id` of `None` disables the last-resort fallback.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        load_endpoints: Vec<String>,
        default_project_id: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            load_endpoints,
            default_project_id,
            timeout,
            cache: Mutex::new(HashMap::new()),
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
            config.load_endpoints.clone(),
            config
                .allow_default_project
                .then(|| config.default_project_id.clone()),
            config.attempt_timeout(),
        )
    }

    /// Determine the project id for `credential`.
    ///
    /// # Errors
    ///
    /// Returns [`GravlinkError::ProjectResolution`] when nothing is embedded,
    /// discovery fails and the default project is disabled, or when discovery
    /// is needed but the credential has no access token.
    pub async fn resolve(
        &self,
        credential: &OAuthCredential,
        provider: &ProviderId,
    ) -> Result<ProjectContext> {
        if let Some(project) = credential.refresh.embedded_project() {
            return Ok(ProjectContext {
                project_id: project.to_string(),
                source: ProjectSource::Embedded,
            });
        }

        let key = credential.refresh.pack();
        let mut cache = self.cache.lock().await;
        if let Some(hit) = cache.get(&key) {
            return Ok(hit.clone());
        }

        let access = credential.access_token().ok_or_else(|| {
            GravlinkError::ProjectResolution("access token required for project discovery".into())
        })?;

        let ctx = if let Some(managed) = self.discover(access, credential).await {
            self.persist_managed(credential, &managed, provider).await;
            ProjectContext {
                project_id: managed,
                source: ProjectSource::Discovered,
            }
        } else if let Some(default) = &self.default_project_id {
            tracing::warn!(
                provider = %provider,
                project = %default,
                "project discovery failed; using default project"
            );
            ProjectContext {
                project_id: default.clone(),
                source: ProjectSource::Default,
            }
        } else {
            return Err(GravlinkError::ProjectResolution(
                "no project id could be discovered and the default project is disabled".into(),
            ));
        };

        cache.insert(key, ctx.clone());
        Ok(ctx)
    }

    async fn discover(&self, access: &str, credential: &OAuthCredential) -> Option<String> {
        let body = load_code_assist_body(credential.refresh.project_id.as_deref());
        for endpoint in &self.load_endpoints {
            let mut request =
                FetchRequest::post_json(format!("{endpoint}/v1internal:loadCodeAssist"), &body);
            let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {access}")) else {
                return None;
            };
            request.headers.insert(header::AUTHORIZATION, bearer);
            for &(name, value) in antigravity::identifying_headers(HeaderStyle::Primary) {
                request.headers.insert(
                    HeaderName::from_static(name),
                    HeaderValue::from_static(value),
                );
            }

            let response = match self.transport.send(request, self.timeout).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "loadCodeAssist failed");
                    continue;
                }
            };
            let status = response.status;
            if !status.is_success() {
                tracing::debug!(endpoint = %endpoint, status = status.as_u16(), "loadCodeAssist rejected");
                continue;
            }
            let bytes = match tokio::time::timeout(self.timeout, response.bytes()).await {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "loadCodeAssist body unreadable");
                    continue;
                }
                Err(_) => {
                    tracing::debug!(endpoint = %endpoint, after = ?self.timeout, "loadCodeAssist body timed out");
                    continue;
                }
            };
            if let Some(project) = parse_load_code_assist(&bytes) {
                tracing::info!(endpoint = %endpoint, project = %project, "discovered managed project");
                return Some(project);
            }
        }
        None
    }

    async fn persist_managed(
        &self,
        credential: &OAuthCredential,
        managed: &str,
        provider: &ProviderId,
    ) {
        let mut updated = credential.clone();
        updated.refresh.managed_project_id = Some(managed.to_string());
        if let Err(e) = self.store.set(provider, &AuthRecord::OAuth(updated)).await {
            tracing::error!(provider = %provider, error = %e, "failed to persist managed project");
        }
    }
}

/// Request body for `loadCodeAssist`.
#[must_use]
pub fn load_code_assist_body(project: Option<&str>) -> Value {
    let mut metadata = json!({
        "ideType": "IDE_UNSPECIFIED",
        "platform": "PLATFORM_UNSPECIFIED",
        "pluginType": "GEMINI",
    });
    if let Some(project) = project {
        metadata["duetProject"] = Value::String(project.to_string());
    }
    json!({ "metadata": metadata })
}

/// Reads `cloudaicompanionProject`, which is either a string or `{"id": …}`.
#[must_use]
pub fn parse_load_code_assist(body: &[u8]) -> Option<String> {
    let json: Value = serde_json::from_slice(body).ok()?;
    let project = json.get("cloudaicompanionProject")?;
    let id = match project {
        Value::String(s) => s.as_str(),
        Value::Object(o) => o.get("id")?.as_str()?,
        _ => return None,
    };
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}
