//! Credential lifecycle for the Antigravity backend.
//!
//! [`antigravity`] holds the OAuth application constants and token-endpoint
//! wire helpers. [`TokenManager`] keeps the bearer credential fresh and
//! persists rotated tokens; [`ProjectResolver`] determines the project id a
//! credential routes against.

pub mod antigravity;
pub mod project;
pub mod token;

pub use project::{ProjectContext, ProjectResolver, ProjectSource};
pub use token::{OAuthClient, TokenManager};

#[cfg(test)]
mod test_support;
