//! Endpoint fallback routing with a remembered preferred endpoint.
//!
//! Endpoints are tried one at a time. A retryable status or transport error
//! moves on to the next candidate, except on the last candidate where a
//! retryable response is returned as-is and a transport error is surfaced.
//! Worst-case latency is therefore `len(endpoints) × attempt_timeout`.

use arc_swap::ArcSwapOption;
use gravlink_types::{FetchResponse, GravlinkError, traits::Result};
use http::StatusCode;
use std::{future::Future, sync::Arc, time::Duration};

/// 403, 404, 429 and every 5xx are worth another endpoint.
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 403 | 404 | 429) || status.is_server_error()
}

/// Candidates in priority order, with `preferred` moved to the front when it
/// is one of them.
#[must_use]
pub fn try_order<'a>(candidates: &'a [String], preferred: Option<&str>) -> Vec<&'a str> {
    let mut order: Vec<&str> = candidates.iter().map(String::as_str).collect();
    if let Some(pos) = preferred.and_then(|p| order.iter().position(|c| *c == p)) {
        let hit = order.remove(pos);
        order.insert(0, hit);
    }
    order
}

/// The accepted attempt of a routed call.
#[derive(Debug)]
pub struct Routed<T> {
    pub endpoint: String,
    pub response: FetchResponse,
    pub context: T,
    /// Attempts made, including the accepted one.
    pub attempts: usize,
}

pub struct EndpointRouter {
    endpoints: Vec<String>,
    preferred: ArcSwapOption<String>,
    attempt_timeout: Duration,
}

impl EndpointRouter {
    #[must_use]
    pub fn new(endpoints: Vec<String>, attempt_timeout: Duration) -> Self {
        Self {
            endpoints,
            preferred: ArcSwapOption::empty(),
            attempt_timeout,
        }
    }

    #[must_use]
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// The endpoint that last produced a clean (non-retryable) response.
    #[must_use]
    pub fn preferred(&self) -> Option<String> {
        self.preferred.load_full().map(|p| p.as_ref().clone())
    }

    fn remember(&self, endpoint: &str) {
        if self.endpoints.iter().any(|e| e == endpoint) {
            self.preferred.store(Some(Arc::new(endpoint.to_string())));
        }
    }

    /// Run `attempt` against each candidate until one is accepted.
    ///
    /// `attempt` gets the endpoint and returns the backend response plus any
    /// per-attempt context the caller wants back.
    ///
    /// # Errors
    ///
    /// Returns the last candidate's transport error (including
    /// [`GravlinkError::Timeout`]), any non-transport error immediately, or
    /// [`GravlinkError::AllEndpointsFailed`] when there are no candidates.
    pub async fn route<T, F, Fut>(&self, mut attempt: F) -> Result<Routed<T>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<(FetchResponse, T)>>,
    {
        let preferred = self.preferred.load_full();
        let order = try_order(&self.endpoints, preferred.as_deref().map(String::as_str));
        let last = order.len().saturating_sub(1);
        let mut last_error = None;

        for (i, endpoint) in order.into_iter().enumerate() {
            let attempts = i + 1;
            let outcome = match tokio::time::timeout(
                self.attempt_timeout,
                attempt(endpoint.to_string()),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(GravlinkError::Timeout {
                    endpoint: endpoint.to_string(),
                    after: self.attempt_timeout,
                }),
            };

            match outcome {
                Ok((response, context)) => {
                    let retryable = is_retryable_status(response.status);
                    if retryable && i < last {
                        tracing::debug!(
                            endpoint,
                            status = response.status.as_u16(),
                            attempt = attempts,
                            "retryable status; trying next endpoint"
                        );
                        continue;
                    }
                    if retryable {
                        tracing::warn!(
                            endpoint,
                            status = response.status.as_u16(),
                            "every endpoint returned a retryable status"
                        );
                    } else {
                        self.remember(endpoint);
                    }
                    return Ok(Routed {
                        endpoint: endpoint.to_string(),
                        response,
                        context,
                        attempts,
                    });
                }
                Err(e) if e.is_transport() && i < last => {
                    tracing::debug!(endpoint, error = %e, attempt = attempts, "transport error; trying next endpoint");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(GravlinkError::AllEndpointsFailed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn endpoints() -> Vec<String> {
        vec!["https://a".into(), "https://b".into(), "https://c".into()]
    }

    fn router() -> EndpointRouter {
        EndpointRouter::new(endpoints(), Duration::from_secs(5))
    }

    fn status(code: u16) -> Result<(FetchResponse, ())> {
        Ok((
            FetchResponse::buffered(StatusCode::from_u16(code).unwrap(), ""),
            (),
        ))
    }

    /// Script per endpoint; records the call order.
    async fn run(
        router: &EndpointRouter,
        script: impl Fn(&str) -> Result<(FetchResponse, ())>,
    ) -> (Result<Routed<()>>, Vec<String>) {
        let calls = Mutex::new(Vec::new());
        let result = router
            .route(|ep| {
                calls.lock().unwrap().push(ep.clone());
                let out = script(&ep);
                async move { out }
            })
            .await;
        (result, calls.into_inner().unwrap())
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [403, 404, 429, 500, 502, 503] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200, 201, 400, 401, 409] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn test_try_order() {
        let eps = endpoints();
        assert_eq!(try_order(&eps, None), ["https://a", "https://b", "https://c"]);
        assert_eq!(
            try_order(&eps, Some("https://c")),
            ["https://c", "https://a", "https://b"]
        );
        assert_eq!(
            try_order(&eps, Some("https://elsewhere")),
            ["https://a", "https://b", "https://c"]
        );
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let r = router();
        let (res, calls) = run(&r, |_| status(200)).await;
        let routed = res.unwrap();
        assert_eq!(routed.attempts, 1);
        assert_eq!(calls, ["https://a"]);
        assert_eq!(r.preferred().as_deref(), Some("https://a"));
    }

    #[tokio::test]
    async fn test_fallback_then_preference() {
        let r = router();
        let script = |ep: &str| if ep == "https://c" { status(200) } else { status(404) };

        let (res, calls) = run(&r, script).await;
        let routed = res.unwrap();
        assert_eq!(routed.response.status, StatusCode::OK);
        assert_eq!(routed.endpoint, "https://c");
        assert_eq!(calls.len(), 3);
        assert_eq!(r.preferred().as_deref(), Some("https://c"));

        let (res, calls) = run(&r, script).await;
        assert_eq!(res.unwrap().attempts, 1);
        assert_eq!(calls, ["https://c"]);
    }

    #[tokio::test]
    async fn test_all_retryable_returns_last_response() {
        let r = router();
        let (res, calls) = run(&r, |_| status(500)).await;
        let routed = res.unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(routed.endpoint, "https://c");
        assert_eq!(routed.response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(r.preferred().is_none());
    }

    #[tokio::test]
    async fn test_final_retryable_keeps_old_preference() {
        let r = router();
        run(&r, |ep| if ep == "https://b" { status(200) } else { status(429) }).await;
        assert_eq!(r.preferred().as_deref(), Some("https://b"));

        let (res, calls) = run(&r, |_| status(503)).await;
        assert_eq!(res.unwrap().response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls, ["https://b", "https://a", "https://c"]);
        assert_eq!(r.preferred().as_deref(), Some("https://b"));
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_terminal() {
        let r = router();
        let (res, calls) = run(&r, |_| status(400)).await;
        assert_eq!(res.unwrap().response.status, StatusCode::BAD_REQUEST);
        assert_eq!(calls.len(), 1);
        assert_eq!(r.preferred().as_deref(), Some("https://a"));
    }

    #[tokio::test]
    async fn test_transport_errors_fall_through_then_surface() {
        let r = router();
        let (res, calls) = run(&r, |ep| Err(GravlinkError::Http(format!("refused {ep}")))).await;
        assert_eq!(calls.len(), 3);
        match res.unwrap_err() {
            GravlinkError::Http(msg) => assert_eq!(msg, "refused https://c"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(r.preferred().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_then_success() {
        let r = router();
        let (res, calls) = run(&r, |ep| {
            if ep == "https://a" {
                Err(GravlinkError::Http("reset".into()))
            } else {
                status(200)
            }
        })
        .await;
        assert_eq!(res.unwrap().endpoint, "https://b");
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn test_non_transport_error_is_not_retried() {
        let r = router();
        let (res, calls) = run(&r, |_| Err(GravlinkError::Translation("bad body".into()))).await;
        assert!(matches!(res.unwrap_err(), GravlinkError::Translation(_)));
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test]
    async fn test_no_endpoints() {
        let r = EndpointRouter::new(Vec::new(), Duration::from_secs(1));
        let (res, calls) = run(&r, |_| status(200)).await;
        assert!(matches!(res.unwrap_err(), GravlinkError::AllEndpointsFailed));
        assert!(calls.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_moves_on() {
        let r = EndpointRouter::new(endpoints(), Duration::from_secs(2));
        let result = r
            .route(|ep| async move {
                if ep == "https://a" {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                status(200)
            })
            .await
            .unwrap();
        assert_eq!(result.endpoint, "https://b");
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_on_last_candidate_surfaces() {
        let r = EndpointRouter::new(vec!["https://only".into()], Duration::from_secs(2));
        let err = r
            .route(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                status(200)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GravlinkError::Timeout { .. }));
    }
}
