//! [`HttpTransport`] over a shared `reqwest` client.

use async_trait::async_trait;
use futures_util::StreamExt as _;
use gravlink_types::{
    FetchRequest, FetchResponse, GravlinkError, HttpTransport, ResponseBody, traits::Result,
};
use std::time::Duration;

/// Build an HTTP client, optionally configured with a proxy URL.
#[must_use]
pub fn build_http_client(proxy_url: Option<&str>) -> reqwest::Client {
    if let Some(url) = proxy_url {
        match reqwest::Proxy::all(url) {
            Ok(proxy) => {
                return reqwest::Client::builder()
                    .proxy(proxy)
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new());
            }
            Err(e) => {
                tracing::warn!(url = url, error = %e, "invalid proxy_url, using direct connection");
            }
        }
    }
    reqwest::Client::new()
}

/// Sends requests with `reqwest`; bodies always come back as streams.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: FetchRequest, timeout: Duration) -> Result<FetchResponse> {
        let url = request.url.clone();
        let mut builder = self
            .http
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        // Bounded until headers arrive; the body may stream for longer.
        let resp = tokio::time::timeout(timeout, builder.send())
            .await
            .map_err(|_| GravlinkError::Timeout {
                endpoint: url,
                after: timeout,
            })??;

        let status = resp.status();
        let headers = resp.headers().clone();
        let stream = resp.bytes_stream().map(|r| r.map_err(GravlinkError::from));
        Ok(FetchResponse {
            status,
            headers,
            body: ResponseBody::Stream(Box::pin(stream)),
            metadata: None,
        })
    }
}
