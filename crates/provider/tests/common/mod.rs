#![allow(dead_code)]

use async_trait::async_trait;
use gravlink_config::Config;
use gravlink_provider::Gateway;
use gravlink_store::InMemoryCredentialStore;
use gravlink_types::{
    AuthRecord, FetchRequest, FetchResponse, HttpTransport, OAuthCredential, ProviderId,
    RefreshParts, credential::epoch_millis, traits::Result,
};
use http::StatusCode;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DAILY: &str = "https://daily.test";
pub const AUTOPUSH: &str = "https://autopush.test";
pub const PROD: &str = "https://prod.test";
pub const TOKEN_URL: &str = "https://oauth.test/token";

pub const GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-pro-high:generateContent";
pub const STREAM_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-pro-high:streamGenerateContent?alt=sse";

type Responder = Box<dyn Fn(&FetchRequest) -> Result<FetchResponse> + Send + Sync>;

/// Scripted transport that records every request it is handed.
pub struct StubTransport {
    responder: Responder,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StubTransport {
    pub fn new(
        responder: impl Fn(&FetchRequest) -> Result<FetchResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// URLs of backend generative calls (token and discovery calls excluded).
    pub fn backend_calls(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains("v1internal:") && !r.url.contains("loadCodeAssist"))
            .map(|r| r.url)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, request: FetchRequest, _timeout: Duration) -> Result<FetchResponse> {
        let result = (self.responder)(&request);
        self.requests.lock().unwrap().push(request);
        result
    }
}

pub fn respond(status: u16, body: &Value) -> Result<FetchResponse> {
    Ok(FetchResponse::buffered(
        StatusCode::from_u16(status).unwrap(),
        body.to_string(),
    ))
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.endpoints = vec![DAILY.into(), AUTOPUSH.into(), PROD.into()];
    config.load_endpoints = vec![PROD.into()];
    config.oauth.token_url = Some(TOKEN_URL.into());
    config
}

pub fn valid_credential(packed: &str) -> OAuthCredential {
    OAuthCredential::new(RefreshParts::parse(packed)).with_access("access-1", epoch_millis(), 3600)
}

pub fn seeded_store(credential: OAuthCredential) -> Arc<InMemoryCredentialStore> {
    Arc::new(InMemoryCredentialStore::with_record(
        ProviderId::default(),
        AuthRecord::OAuth(credential),
    ))
}

pub fn gateway(
    transport: Arc<StubTransport>,
    store: Arc<InMemoryCredentialStore>,
) -> Gateway {
    Gateway::new(&config(), transport, store)
}

pub fn generate_request() -> FetchRequest {
    FetchRequest::post_json(
        GENERATE_URL,
        &json!({"contents": [{"role": "user", "parts": [{"text": "hello"}]}]}),
    )
}

pub fn ok_envelope(text: &str) -> Value {
    json!({"response": {"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]}})
}
