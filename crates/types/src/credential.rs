//! Credential records, packed refresh state and expiry logic.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Tokens expiring within this window are treated as already expired.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn epoch_millis() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    u64::try_from(now.as_millis()).unwrap_or(u64::MAX)
}

/// Auxiliary state packed into the persisted `refresh` field.
///
/// Wire format (v1): `refresh_token[|project_id[|managed_project_id]]`.
/// Empty segments mean "absent"; trailing absent segments are omitted when
/// packing. The host application stores this as an opaque string, so the
/// layout must stay backward compatible with records written by older
/// versions that only carried the bare refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefreshParts {
    pub refresh_token: String,
    pub project_id: Option<String>,
    pub managed_project_id: Option<String>,
}

impl RefreshParts {
    const SEPARATOR: char = '|';

    /// Creates parts carrying only a refresh token.
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            project_id: None,
            managed_project_id: None,
        }
    }

    /// Decodes a packed refresh string. Never fails: unknown extra segments are
    /// ignored and blank segments decode as `None`.
    #[must_use]
    pub fn parse(packed: &str) -> Self {
        let mut segments = packed.split(Self::SEPARATOR).map(str::trim);
        let segment = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);
        let refresh_token = segments.next().unwrap_or_default().to_string();
        let project_id = segment(segments.next());
        let managed_project_id = segment(segments.next());
        Self {
            refresh_token,
            project_id,
            managed_project_id,
        }
    }

    /// Encodes the parts back into the single persisted string.
    #[must_use]
    pub fn pack(&self) -> String {
        let project = self.project_id.as_deref().unwrap_or_default();
        match &self.managed_project_id {
            Some(managed) => format!(
                "{}{sep}{project}{sep}{managed}",
                self.refresh_token,
                sep = Self::SEPARATOR
            ),
            None if !project.is_empty() => {
                format!("{}{}{project}", self.refresh_token, Self::SEPARATOR)
            }
            None => self.refresh_token.clone(),
        }
    }

    /// Returns `true` if a non-blank refresh token is present.
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }

    /// The embedded project id to route against, managed project first.
    #[must_use]
    pub fn embedded_project(&self) -> Option<&str> {
        self.managed_project_id
            .as_deref()
            .or(self.project_id.as_deref())
    }
}

impl Serialize for RefreshParts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pack())
    }
}

impl<'de> Deserialize<'de> for RefreshParts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let packed = String::deserialize(deserializer)?;
        Ok(Self::parse(&packed))
    }
}

/// An OAuth credential as persisted by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredential {
    pub refresh: RefreshParts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    /// Access token deadline, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
}

impl OAuthCredential {
    /// Create a credential from a refresh state with no access token yet.
    #[must_use]
    pub fn new(refresh: RefreshParts) -> Self {
        Self {
            refresh,
            access: None,
            expires: None,
        }
    }

    /// Attach an access token expiring `expires_in_secs` after `issued_at_ms`.
    #[must_use]
    pub fn with_access(
        mut self,
        access: impl Into<String>,
        issued_at_ms: u64,
        expires_in_secs: u64,
    ) -> Self {
        self.access = Some(access.into());
        self.expires = Some(issued_at_ms.saturating_add(expires_in_secs.saturating_mul(1000)));
        self
    }

    /// Returns the access token if one is present and non-blank.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access.as_deref().filter(|a| !a.trim().is_empty())
    }

    /// Return `true` if the access token is missing, has no deadline, or
    /// expires within [`EXPIRY_MARGIN`] of `now_ms`.
    #[must_use]
    pub fn expired_at(&self, now_ms: u64) -> bool {
        let (Some(_), Some(expires)) = (self.access_token(), self.expires) else {
            return true;
        };
        let margin = u64::try_from(EXPIRY_MARGIN.as_millis()).unwrap_or(u64::MAX);
        expires <= now_ms.saturating_add(margin)
    }

    /// [`Self::expired_at`] against the current wall clock.
    #[must_use]
    pub fn access_token_expired(&self) -> bool {
        self.expired_at(epoch_millis())
    }
}

/// A stored credential record, tagged the way the host application persists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthRecord {
    #[serde(rename = "oauth")]
    OAuth(OAuthCredential),
    #[serde(rename = "api")]
    ApiKey { key: String },
}

impl AuthRecord {
    /// Returns the OAuth credential, or `None` for API-key records.
    #[must_use]
    pub fn as_oauth(&self) -> Option<&OAuthCredential> {
        match self {
            Self::OAuth(c) => Some(c),
            Self::ApiKey { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: u64 = 3_600_000;

    fn cred(expires: Option<u64>) -> OAuthCredential {
        OAuthCredential {
            refresh: RefreshParts::new("ref"),
            access: Some("tok".into()),
            expires,
        }
    }

    #[test]
    fn test_parse_bare_refresh_token() {
        let parts = RefreshParts::parse("refresh-token");
        assert_eq!(parts.refresh_token, "refresh-token");
        assert!(parts.project_id.is_none());
        assert!(parts.managed_project_id.is_none());
    }

    #[test]
    fn test_parse_with_project() {
        let parts = RefreshParts::parse("refresh-token|project-123");
        assert_eq!(parts.refresh_token, "refresh-token");
        assert_eq!(parts.project_id.as_deref(), Some("project-123"));
        assert_eq!(parts.embedded_project(), Some("project-123"));
    }

    #[test]
    fn test_parse_managed_only() {
        let parts = RefreshParts::parse("rt||managed-9");
        assert!(parts.project_id.is_none());
        assert_eq!(parts.managed_project_id.as_deref(), Some("managed-9"));
        assert_eq!(parts.pack(), "rt||managed-9");
    }

    #[test]
    fn test_managed_project_takes_precedence() {
        let parts = RefreshParts::parse("rt|user-proj|managed-proj");
        assert_eq!(parts.embedded_project(), Some("managed-proj"));
    }

    #[test]
    fn test_pack_trims_absent_segments() {
        assert_eq!(RefreshParts::new("rt").pack(), "rt");
        let parts = RefreshParts {
            refresh_token: "rt".into(),
            project_id: Some("p".into()),
            managed_project_id: None,
        };
        assert_eq!(parts.pack(), "rt|p");
    }

    #[test]
    fn test_blank_refresh_token() {
        assert!(!RefreshParts::parse("").has_refresh_token());
        assert!(!RefreshParts::parse("  |proj").has_refresh_token());
        assert!(RefreshParts::parse("rt").has_refresh_token());
    }

    #[test]
    fn test_expired_within_margin() {
        let now = 1_000_000_000;
        assert!(cred(Some(now + 30_000)).expired_at(now));
        assert!(cred(Some(now)).expired_at(now));
        assert!(cred(Some(now - 1)).expired_at(now));
    }

    #[test]
    fn test_valid_well_beyond_margin() {
        let now = 1_000_000_000;
        assert!(!cred(Some(now + HOUR_MS)).expired_at(now));
    }

    #[test]
    fn test_missing_access_or_deadline_is_expired() {
        let now = 1_000_000_000;
        assert!(cred(None).expired_at(now));
        let mut c = cred(Some(now + HOUR_MS));
        c.access = Some(String::new());
        assert!(c.expired_at(now));
    }

    #[test]
    fn test_with_access_sets_deadline() {
        let c = OAuthCredential::new(RefreshParts::new("rt")).with_access("at", 1_000, 3600);
        assert_eq!(c.access_token(), Some("at"));
        assert_eq!(c.expires, Some(1_000 + HOUR_MS));
    }

    #[test]
    fn test_record_wire_shape() {
        let record = AuthRecord::OAuth(OAuthCredential {
            refresh: RefreshParts::parse("rt|proj"),
            access: Some("at".into()),
            expires: Some(42),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "oauth");
        assert_eq!(json["refresh"], "rt|proj");
        assert_eq!(json["access"], "at");
        assert_eq!(json["expires"], 42);

        let back: AuthRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_api_key_record() {
        let record: AuthRecord =
            serde_json::from_str(r#"{"type":"api","key":"AIza-test"}"#).unwrap();
        assert!(record.as_oauth().is_none());
    }
}
