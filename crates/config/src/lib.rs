//! Configuration loading for the gravlink adapter.
//!
//! Uses figment for layered configuration: built-in defaults, then an
//! optional YAML file, then `GRAVLINK_*` environment variables.

pub mod schema;

pub use schema::{Config, LogConfig, LogFormat, OAuthConfig};
