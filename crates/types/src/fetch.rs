//! Fetch-shaped request and response model.
//!
//! The adapter is a drop-in replacement for a plain HTTP fetch, so requests
//! and responses are modelled as method + URL + headers + body, with response
//! bodies either buffered or streamed.

use crate::error::Result;
use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use http::{HeaderMap, Method, StatusCode};
use std::{fmt, pin::Pin};

/// A pinned, sendable stream of response body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// An outbound HTTP request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    /// Creates a bodiless request.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a `POST` request with a JSON body and content type.
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
        let mut req = Self::new(Method::POST, url);
        req.headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        req.body = Some(Bytes::from(body.to_string()));
        req
    }

    /// Parses the body as JSON, returning `None` for empty or non-JSON bodies.
    #[must_use]
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_ref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// A response body: fully buffered, or a forward-only chunk stream.
pub enum ResponseBody {
    Buffered(Bytes),
    Stream(ByteStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(b) => f.debug_tuple("Buffered").field(&b.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl ResponseBody {
    /// Drains the body into memory.
    ///
    /// # Errors
    ///
    /// Returns the first transport error raised by a streamed body.
    pub async fn collect(self) -> Result<Bytes> {
        match self {
            Self::Buffered(b) => Ok(b),
            Self::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = std::future::poll_fn(|cx| stream.as_mut().poll_next(cx)).await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

/// Routing facts attached to responses produced by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMetadata {
    pub requested_model: String,
    pub effective_model: String,
    pub project_id: String,
    pub endpoint: String,
    pub streaming: bool,
}

/// An HTTP response as seen by the caller.
#[derive(Debug)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    /// Present only on responses produced by the adapter (not on passthrough).
    pub metadata: Option<CallMetadata>,
}

impl FetchResponse {
    /// Creates a buffered response with no headers.
    pub fn buffered(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Buffered(body.into()),
            metadata: None,
        }
    }

    /// Creates a streamed response with no headers.
    #[must_use]
    pub fn streamed(status: StatusCode, body: ByteStream) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Stream(body),
            metadata: None,
        }
    }

    /// Drains the body into memory.
    ///
    /// # Errors
    ///
    /// Returns the first transport error raised by a streamed body.
    pub async fn bytes(self) -> Result<Bytes> {
        self.body.collect().await
    }

    /// Replaces a streamed body with its drained contents, keeping status,
    /// headers and metadata.
    ///
    /// # Errors
    ///
    /// Returns the first transport error raised by a streamed body.
    pub async fn into_buffered(mut self) -> Result<Self> {
        if matches!(self.body, ResponseBody::Stream(_)) {
            let body = std::mem::replace(&mut self.body, ResponseBody::Buffered(Bytes::new()));
            self.body = ResponseBody::Buffered(body.collect().await?);
        }
        Ok(self)
    }

    /// Drains the body and parses it as JSON.
    ///
    /// # Errors
    ///
    /// Returns a transport error or [`GravlinkError::Serialization`](crate::GravlinkError::Serialization).
    pub async fn json(self) -> Result<serde_json::Value> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
