//! Model alias resolution.
//!
//! The primary backend understands tier-suffixed Gemini 3 names
//! (`gemini-3-pro-high`) natively; the CLI-compatible backend only knows the
//! preview-marked base names (`gemini-3-pro-preview`) and takes the tier as a
//! thinking level instead.

use gravlink_types::HeaderStyle;
use std::fmt;

/// Namespacing prefix some callers put in front of model ids.
const NAMESPACE_PREFIX: &str = "antigravity-";

const PREVIEW_SUFFIX: &str = "-preview";

/// Gemini 3 families that carry tier suffixes.
const TIERED_FAMILIES: [&str; 2] = ["gemini-3-pro", "gemini-3-flash"];

/// Aliases for the primary backend: preview spellings it does not serve.
const PRIMARY_ALIASES: &[(&str, &str)] = &[
    ("gemini-3-pro-preview", "gemini-3-pro-high"),
    ("gemini-3-flash-preview", "gemini-3-flash"),
    ("gemini-3-pro-image-preview", "gemini-3-pro-image"),
    ("gemini-2.5-computer-use-preview-10-2025", "rev19-uic3-1p"),
    ("gemini-claude-sonnet-4-5", "claude-sonnet-4-5"),
    ("gemini-claude-sonnet-4-5-thinking", "claude-sonnet-4-5-thinking"),
    ("gemini-claude-opus-4-5-thinking", "claude-opus-4-5-thinking"),
];

/// Aliases for the CLI-compatible backend beyond the Gemini 3 tier rules.
const CLI_ALIASES: &[(&str, &str)] = &[("gemini-3-pro-image", "gemini-3-pro-image-preview")];

/// A quality/cost tier suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// The `thinkingLevel` value the CLI-compatible backend accepts.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of alias resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Requested id with namespacing prefixes removed.
    pub requested: String,
    /// Id sent to the backend.
    pub effective: String,
    /// Tier removed from the name, to be carried as a thinking level.
    pub stripped_tier: Option<Tier>,
}

/// Strip `models/`, `provider/` and `antigravity-` prefixes.
#[must_use]
pub fn strip_namespace(model: &str) -> &str {
    let model = model.trim();
    let model = model.rsplit('/').next().unwrap_or(model);
    model.strip_prefix(NAMESPACE_PREFIX).unwrap_or(model)
}

/// Claude-family models are served only by the primary backend.
#[must_use]
pub fn is_claude(model: &str) -> bool {
    strip_namespace(model).contains("claude")
}

/// Splits `gemini-3-pro-high` into (`gemini-3-pro`, `Some(High)`) and
/// `gemini-3-pro` into (`gemini-3-pro`, `None`). Returns `None` for anything
/// outside the tiered families.
fn split_tiered(model: &str) -> Option<(&'static str, Option<Tier>)> {
    TIERED_FAMILIES.iter().find_map(|&family| {
        let rest = model.strip_prefix(family)?;
        if rest.is_empty() {
            return Some((family, None));
        }
        let tier = Tier::from_suffix(rest.strip_prefix('-')?)?;
        Some((family, Some(tier)))
    })
}

fn lookup(table: &[(&str, &'static str)], model: &str) -> Option<&'static str> {
    table
        .iter()
        .find_map(|&(from, to)| (from == model).then_some(to))
}

/// Resolve `requested` for the backend selected by `style`.
///
/// Unknown models are never rejected; they pass through unchanged.
#[must_use]
pub fn resolve_model(requested: &str, style: HeaderStyle) -> ResolvedModel {
    let name = strip_namespace(requested);
    let (effective, stripped_tier) = match style {
        HeaderStyle::Cli if name.ends_with(PREVIEW_SUFFIX) => (name.to_string(), None),
        HeaderStyle::Cli => match split_tiered(name) {
            Some((family, tier)) => (format!("{family}{PREVIEW_SUFFIX}"), tier),
            None => (lookup(CLI_ALIASES, name).unwrap_or(name).to_string(), None),
        },
        HeaderStyle::Primary => match split_tiered(name) {
            Some((_, Some(_))) => (name.to_string(), None),
            _ => (lookup(PRIMARY_ALIASES, name).unwrap_or(name).to_string(), None),
        },
    };
    ResolvedModel {
        requested: name.to_string(),
        effective,
        stripped_tier,
    }
}

/// The canonical backend id for `requested` under `style`.
#[must_use]
pub fn resolve_effective_model(requested: &str, style: HeaderStyle) -> String {
    resolve_model(requested, style).effective
}
