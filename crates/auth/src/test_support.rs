use async_trait::async_trait;
use gravlink_types::{FetchRequest, FetchResponse, HttpTransport, traits::Result};
use bytes::Bytes;
use http::StatusCode;
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&FetchRequest) -> Result<FetchResponse> + Send + Sync>;

/// Scripted transport: answers every request with `responder` and records it.
pub struct StubTransport {
    responder: Responder,
    requests: Mutex<Vec<FetchRequest>>,
    delay: Option<Duration>,
}

impl StubTransport {
    pub fn new(
        responder: impl Fn(&FetchRequest) -> Result<FetchResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::new(move |_| {
            Ok(FetchResponse::buffered(
                StatusCode::from_u16(status).unwrap(),
                body.to_string(),
            ))
        })
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// A response whose headers arrive but whose body never does.
pub fn stalled_body(status: u16) -> FetchResponse {
    FetchResponse::streamed(
        StatusCode::from_u16(status).unwrap(),
        Box::pin(futures_util::stream::pending::<Result<Bytes>>()),
    )
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, request: FetchRequest, _timeout: Duration) -> Result<FetchResponse> {
        let result = (self.responder)(&request);
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}
