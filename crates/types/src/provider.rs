//! Provider identifiers and backend header styles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider identifier used by the host application's credential store.
///
/// The adapter is instantiated per provider id; the id is only used as a key
/// when loading and persisting credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// The provider id shared by the plugin loader and credential store.
    pub const DEFAULT: &'static str = "google";

    /// Creates a provider id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProviderId {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The two mutually incompatible request conventions exposed by the backend
/// family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderStyle {
    /// The Antigravity backend; understands tier-suffixed model names natively.
    #[default]
    #[serde(alias = "antigravity")]
    Primary,
    /// The Gemini-CLI-compatible backend; expects preview-marked base names.
    #[serde(alias = "gemini-cli", alias = "gemini_cli")]
    Cli,
}

impl fmt::Display for HeaderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Cli => write!(f, "cli"),
        }
    }
}

impl std::str::FromStr for HeaderStyle {
    type Err = crate::GravlinkError;

    /// Parse a header style name or well-known alias.
    ///
    /// # Errors
    ///
    /// Returns [`GravlinkError::Config`](crate::GravlinkError::Config) for
    /// unknown names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" | "antigravity" => Ok(Self::Primary),
            "cli" | "gemini-cli" | "gemini_cli" => Ok(Self::Cli),
            other => Err(crate::GravlinkError::Config(format!(
                "unknown header style: {other}"
            ))),
        }
    }
}
