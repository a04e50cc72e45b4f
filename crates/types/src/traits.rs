//! Async traits shared across all gravlink crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `gravlink-types`, not on each other.

use crate::{AuthRecord, FetchRequest, FetchResponse, ProviderId};
use async_trait::async_trait;
use std::time::Duration;

pub use crate::error::Result;

/// Persistent storage for credential records, keyed by provider.
///
/// This is the host application's capability; the adapter never decides
/// where or how records are kept.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the current record for the given provider.
    async fn load(&self, provider: &ProviderId) -> Result<Option<AuthRecord>>;
    /// Persist (replace) the record for the given provider.
    async fn set(&self, provider: &ProviderId, record: &AuthRecord) -> Result<()>;
}

/// Sends a single HTTP request.
///
/// `timeout` bounds the time until response headers arrive; streamed bodies
/// are not subject to it. Dropping the returned future cancels the request,
/// and dropping a streamed body releases the connection.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: FetchRequest, timeout: Duration) -> Result<FetchResponse>;
}
