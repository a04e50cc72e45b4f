use gravlink_types::{GravlinkError, HeaderStyle, ProviderId};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Daily sandbox endpoint (tried first).
pub const ENDPOINT_DAILY: &str = "https://daily-cloudcode-pa.sandbox.googleapis.com";
/// Autopush sandbox endpoint.
pub const ENDPOINT_AUTOPUSH: &str = "https://autopush-cloudcode-pa.sandbox.googleapis.com";
/// Production endpoint.
pub const ENDPOINT_PROD: &str = "https://cloudcode-pa.googleapis.com";

/// Call fallback order: daily → autopush → prod.
pub const ENDPOINT_FALLBACKS: [&str; 3] = [ENDPOINT_DAILY, ENDPOINT_AUTOPUSH, ENDPOINT_PROD];

/// Project discovery order: prod first, where `loadCodeAssist` is best supported.
pub const LOAD_ENDPOINTS: [&str; 3] = [ENDPOINT_PROD, ENDPOINT_DAILY, ENDPOINT_AUTOPUSH];

/// Project id used when the account never exposes one (e.g. workspace accounts).
pub const DEFAULT_PROJECT_ID: &str = "rising-fact-p41fc";

const ENV_PREFIX: &str = "GRAVLINK_";
const CLIENT_SECRET_ENV: &str = "ANTIGRAVITY_CLIENT_SECRET";

/// `.json` files are parsed as JSON, everything else as YAML.
fn merge_file(figment: figment::Figment, path: &Path) -> figment::Figment {
    use figment::providers::{Format as _, Json, Yaml};
    if path.extension().is_some_and(|ext| ext == "json") {
        figment.merge(Json::file(path))
    } else {
        figment.merge(Yaml::file(path))
    }
}

fn default_true() -> bool {
    true
}
fn default_provider_id() -> String {
    ProviderId::DEFAULT.to_string()
}
fn default_endpoints() -> Vec<String> {
    ENDPOINT_FALLBACKS.iter().map(ToString::to_string).collect()
}
fn default_load_endpoints() -> Vec<String> {
    LOAD_ENDPOINTS.iter().map(ToString::to_string).collect()
}
fn default_project_id() -> String {
    DEFAULT_PROJECT_ID.to_string()
}
fn default_attempt_timeout() -> u64 {
    120
}
fn default_refresh_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

/// OAuth client overrides. Unset fields fall back to the built-in
/// Antigravity application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    /// Usually supplied through `ANTIGRAVITY_CLIENT_SECRET`.
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Top-level adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Credential store key (defaults to `google`).
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    /// Header style used unless a call overrides it.
    #[serde(default)]
    pub header_style: HeaderStyle,
    /// Generative-call endpoints in fallback priority order.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    /// Project discovery endpoints in priority order.
    #[serde(default = "default_load_endpoints")]
    pub load_endpoints: Vec<String>,
    #[serde(default = "default_project_id")]
    pub default_project_id: String,
    /// Whether the reserved default project may be used as a last resort.
    #[serde(default = "default_true")]
    pub allow_default_project: bool,
    /// Per-attempt timeout until response headers arrive.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    /// Tool-call schema hardening for Claude-family models.
    #[serde(default = "default_true")]
    pub tool_hardening: bool,
    /// Outbound HTTP(S) proxy for every backend call.
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            header_style: HeaderStyle::default(),
            endpoints: default_endpoints(),
            load_endpoints: default_load_endpoints(),
            default_project_id: default_project_id(),
            allow_default_project: true,
            attempt_timeout_secs: default_attempt_timeout(),
            refresh_timeout_secs: default_refresh_timeout(),
            tool_hardening: true,
            proxy_url: None,
            oauth: OAuthConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads configuration from a YAML (or `.json`) file, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &Path) -> Result<Self, figment::Error> {
        use figment::{Figment, providers::Serialized};
        merge_file(Figment::from(Serialized::defaults(Config::default())), path).extract()
    }

    /// Loads defaults, then the optional YAML file, then `GRAVLINK_*`
    /// environment variables (`__` separates nested keys), then
    /// `ANTIGRAVITY_CLIENT_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if any layer fails to parse.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Serialized},
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = merge_file(figment, path);
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(
                Env::raw()
                    .only(&[CLIENT_SECRET_ENV])
                    .map(|_| "oauth.client_secret".into()),
            )
            .extract()
    }

    /// Checks invariants figment cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`GravlinkError::Config`] when an endpoint list is empty or a
    /// timeout is zero.
    pub fn validate(&self) -> Result<(), GravlinkError> {
        if self.endpoints.is_empty() {
            return Err(GravlinkError::Config("endpoints must not be empty".into()));
        }
        if self.load_endpoints.is_empty() {
            return Err(GravlinkError::Config(
                "load_endpoints must not be empty".into(),
            ));
        }
        if self.attempt_timeout_secs == 0 || self.refresh_timeout_secs == 0 {
            return Err(GravlinkError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn provider(&self) -> ProviderId {
        ProviderId::new(self.provider_id.clone())
    }

    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    #[must_use]
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}
