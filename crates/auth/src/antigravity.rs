//! Google Cloud Code Assist (Antigravity) OAuth application and wire constants.
//!
//! Only the refresh-token grant lives here; the interactive authorization
//! flow belongs to the host application.

use gravlink_types::{GravlinkError, HeaderStyle, traits::Result};
use serde::Deserialize;

/// OAuth 2.0 client ID for Antigravity.
pub const CLIENT_ID: &str =
    "1071006060591-tmhssin2h21lcre235vtolojh4g403ep.apps.googleusercontent.com";

/// Google OAuth 2.0 token endpoint.
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Identifying headers sent on every primary-backend call.
pub const PRIMARY_HEADERS: [(&str, &str); 3] = [
    ("user-agent", "antigravity/1.11.5 windows/amd64"),
    ("x-goog-api-client", "google-cloud-sdk vscode_cloudshelleditor/0.1"),
    (
        "client-metadata",
        r#"{"ideType":"IDE_UNSPECIFIED","platform":"PLATFORM_UNSPECIFIED","pluginType":"GEMINI"}"#,
    ),
];

/// Identifying headers sent on every CLI-compatible backend call.
pub const CLI_HEADERS: [(&str, &str); 3] = [
    ("user-agent", "google-api-nodejs-client/9.15.1"),
    ("x-goog-api-client", "gl-node/22.17.0"),
    (
        "client-metadata",
        "ideType=IDE_UNSPECIFIED,platform=PLATFORM_UNSPECIFIED,pluginType=GEMINI",
    ),
];

/// Returns the fixed identifying headers for a header style.
#[must_use]
pub fn identifying_headers(style: HeaderStyle) -> &'static [(&'static str, &'static str)] {
    match style {
        HeaderStyle::Primary => &PRIMARY_HEADERS,
        HeaderStyle::Cli => &CLI_HEADERS,
    }
}

/// Build the form parameters for the refresh-token grant.
#[must_use]
pub fn refresh_form_params(
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("grant_type", "refresh_token".into()),
        ("refresh_token", refresh_token.into()),
        ("client_id", client_id.into()),
        ("client_secret", client_secret.into()),
    ]
}

/// The fields consumed from a successful token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Present only when Google rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Parse the token endpoint JSON body.
///
/// # Errors
///
/// Returns an error if the body is not JSON or lacks a non-empty `access_token`.
pub fn parse_token_response(body: &[u8]) -> Result<TokenResponse> {
    let token: TokenResponse = serde_json::from_slice(body)?;
    if token.access_token.trim().is_empty() {
        return Err(GravlinkError::Auth("empty access_token in response".into()));
    }
    Ok(token)
}

/// Extract the OAuth `error` code (e.g. `invalid_grant`) from an error body.
#[must_use]
pub fn parse_error_code(body: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;
    json.get("error")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}
