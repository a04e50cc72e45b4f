//! Core types and traits for the gravlink workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! adapter: the error taxonomy, provider identifiers, the credential record
//! (including its packed refresh state), the fetch-shaped request/response
//! model and the async traits that the store and transport layers implement.

pub mod credential;
pub mod error;
pub mod fetch;
pub mod provider;
pub mod traits;

pub use credential::{AuthRecord, OAuthCredential, RefreshParts};
pub use error::GravlinkError;
pub use fetch::{ByteStream, CallMetadata, FetchRequest, FetchResponse, ResponseBody};
pub use provider::{HeaderStyle, ProviderId};
pub use traits::{CredentialStore, HttpTransport};
