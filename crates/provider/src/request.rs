//! Request transformation: generative-language call → Code Assist envelope.
//!
//! The inbound request targets
//! `https://generativelanguage.googleapis.com/v1beta/models/{model}:{action}`.
//! The outbound request is `POST {endpoint}/v1internal:{action}` with the
//! caller's body wrapped as `{"project", "model", "request": body}`.

use crate::model::{self, ResolvedModel};
use gravlink_auth::antigravity;
use gravlink_types::{FetchRequest, GravlinkError, HeaderStyle, traits::Result};
use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, header};
use serde_json::{Map, Value, json};

/// Host of the public generative-language API this adapter intercepts.
pub const GENERATIVE_LANGUAGE_HOST: &str = "generativelanguage.googleapis.com";

const STREAM_ACTION: &str = "streamGenerateContent";

/// Appended once to the system instruction of hardened Claude requests.
pub const TOOL_HARDENING_HINT: &str = "When calling a tool, use only the parameter names declared in \
its schema. Never invent parameters. If a tool declares no parameters, call it with an empty object.";

/// Caller headers that must not reach the backend.
const DROPPED_HEADERS: [&str; 3] = ["x-goog-api-key", "content-length", "host"];

/// Returns `true` for calls in the generative-language convention.
#[must_use]
pub fn is_generative_language_request(url: &str) -> bool {
    url.contains(GENERATIVE_LANGUAGE_HOST)
}

/// Extract `(model, action)` from `…/models/{model}:{action}[?query]`.
#[must_use]
pub fn parse_model_path(url: &str) -> Option<(&str, &str)> {
    let path = url.split(['?', '#']).next()?;
    let (_, rest) = path.split_once("/models/")?;
    let (model, action) = rest.split_once(':')?;
    if model.is_empty() || action.is_empty() || action.contains('/') {
        return None;
    }
    Some((model, action))
}

/// Body-rewriting toggles.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Give every Claude function declaration a schema and add the tool hint.
    pub tool_hardening: bool,
    /// Drop thinking parts and signatures from prior model turns.
    pub force_thinking_recovery: bool,
}

/// Tool-declaration diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolDebug {
    /// Declarations that arrived without a usable `parameters` schema.
    pub missing_schemas: usize,
    /// Comma-separated declared tool names (truncated).
    pub summary: String,
}

/// Per-attempt inputs that come from auth and routing rather than the caller.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub access_token: &'a str,
    pub project_id: &'a str,
    pub endpoint: &'a str,
    /// Explicit override; `None` uses `default_style`.
    pub header_style: Option<HeaderStyle>,
    pub default_style: HeaderStyle,
}

/// A backend-ready request plus the facts the response side needs.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub request: FetchRequest,
    pub streaming: bool,
    pub requested_model: String,
    pub effective_model: String,
    pub project_id: String,
    pub endpoint: String,
    pub header_style: HeaderStyle,
    pub tool_debug: Option<ToolDebug>,
}

/// Pick the header style for `model`. Claude models only exist on the
/// primary backend.
#[must_use]
pub fn select_style(
    model: &str,
    explicit: Option<HeaderStyle>,
    default: HeaderStyle,
) -> HeaderStyle {
    if model::is_claude(model) {
        HeaderStyle::Primary
    } else {
        explicit.unwrap_or(default)
    }
}

/// Rewrite `inbound` for `ctx.endpoint`.
///
/// Pure aside from the random request id carried by the primary envelope, so
/// it is safe to call once per endpoint attempt.
///
/// # Errors
///
/// Returns [`GravlinkError::Translation`] if the URL has no
/// `/models/{model}:{action}` segment or the body is not JSON.
pub fn prepare(
    inbound: &FetchRequest,
    ctx: &CallContext<'_>,
    options: RequestOptions,
) -> Result<PreparedRequest> {
    let (raw_model, action) = parse_model_path(&inbound.url).ok_or_else(|| {
        GravlinkError::Translation(format!("no model in request path: {}", inbound.url))
    })?;
    let streaming = action == STREAM_ACTION;
    let style = select_style(raw_model, ctx.header_style, ctx.default_style);
    let resolved = model::resolve_model(raw_model, style);
    let claude = model::is_claude(&resolved.effective);

    let mut body = match inbound.body.as_ref().filter(|b| !b.is_empty()) {
        Some(bytes) => serde_json::from_slice::<Value>(bytes)
            .map_err(|e| GravlinkError::Translation(format!("request body is not JSON: {e}")))?,
        None => json!({}),
    };

    if options.force_thinking_recovery {
        strip_thinking(&mut body);
    }
    if let Some(tier) = resolved.stripped_tier {
        apply_thinking_level(&mut body, tier.as_str());
    }
    let tool_debug = inspect_tools(&body);
    if claude && options.tool_hardening {
        harden_tools(&mut body);
    }

    let envelope = wrap_envelope(body, &resolved, ctx.project_id, style);
    tracing::trace!(body = %envelope, "prepared backend request body");

    let mut url = format!("{}/v1internal:{action}", ctx.endpoint.trim_end_matches('/'));
    if streaming {
        url.push_str("?alt=sse");
    }

    let mut request = FetchRequest::new(Method::POST, url);
    request.headers = outbound_headers(inbound, ctx.access_token, style, streaming)?;
    request.body = Some(Bytes::from(envelope.to_string()));

    Ok(PreparedRequest {
        request,
        streaming,
        requested_model: resolved.requested,
        effective_model: resolved.effective,
        project_id: ctx.project_id.to_string(),
        endpoint: ctx.endpoint.to_string(),
        header_style: style,
        tool_debug,
    })
}

fn outbound_headers(
    inbound: &FetchRequest,
    access_token: &str,
    style: HeaderStyle,
    streaming: bool,
) -> Result<http::HeaderMap> {
    let mut headers = inbound.headers.clone();
    for name in DROPPED_HEADERS {
        headers.remove(name);
    }

    let bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .map_err(|e| GravlinkError::Auth(format!("access token is not a valid header: {e}")))?;
    headers.insert(header::AUTHORIZATION, bearer);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if streaming {
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
    }
    for &(name, value) in antigravity::identifying_headers(style) {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    Ok(headers)
}

fn wrap_envelope(
    body: Value,
    resolved: &ResolvedModel,
    project_id: &str,
    style: HeaderStyle,
) -> Value {
    let mut envelope = json!({
        "project": project_id,
        "model": resolved.effective,
        "request": body,
    });
    if style == HeaderStyle::Primary {
        envelope["userAgent"] = json!("antigravity");
        envelope["requestType"] = json!("agent");
        envelope["requestId"] = json!(format!("agent-{}", uuid::Uuid::new_v4()));
    }
    envelope
}

/// Set `generationConfig.thinkingConfig.thinkingLevel` unless the caller did.
fn apply_thinking_level(body: &mut Value, level: &str) {
    let Some(obj) = body.as_object_mut() else {
        return;
    };
    let thinking = obj
        .entry("generationConfig")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .map(|gc| gc.entry("thinkingConfig").or_insert_with(|| json!({})));
    if let Some(Value::Object(thinking)) = thinking {
        thinking
            .entry("thinkingLevel")
            .or_insert_with(|| Value::String(level.to_string()));
    }
}

/// Remove `thought` parts and `thoughtSignature` fields from model turns.
fn strip_thinking(body: &mut Value) {
    let Some(contents) = body.get_mut("contents").and_then(Value::as_array_mut) else {
        return;
    };
    for turn in contents {
        if turn.get("role").and_then(Value::as_str) != Some("model") {
            continue;
        }
        let Some(parts) = turn.get_mut("parts").and_then(Value::as_array_mut) else {
            continue;
        };
        parts.retain(|p| p.get("thought").and_then(Value::as_bool) != Some(true));
        for part in parts.iter_mut().filter_map(Value::as_object_mut) {
            part.remove("thoughtSignature");
        }
    }
}

fn function_declarations(body: &Value) -> impl Iterator<Item = &Value> {
    body.get("tools")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|t| t.get("functionDeclarations").and_then(Value::as_array))
        .flatten()
}

fn has_schema(decl: &Value) -> bool {
    decl.get("parameters").is_some_and(Value::is_object)
        || decl.get("parametersJsonSchema").is_some_and(Value::is_object)
}

fn inspect_tools(body: &Value) -> Option<ToolDebug> {
    const MAX_NAMES: usize = 10;
    let decls: Vec<&Value> = function_declarations(body).collect();
    if decls.is_empty() {
        return None;
    }
    let names: Vec<&str> = decls
        .iter()
        .filter_map(|d| d.get("name").and_then(Value::as_str))
        .collect();
    let mut summary = names
        .iter()
        .take(MAX_NAMES)
        .copied()
        .collect::<Vec<_>>()
        .join(",");
    if names.len() > MAX_NAMES {
        summary.push_str(&format!(",+{}", names.len() - MAX_NAMES));
    }
    Some(ToolDebug {
        missing_schemas: decls.iter().filter(|d| !has_schema(d)).count(),
        summary,
    })
}

fn harden_tools(body: &mut Value) {
    let Some(tools) = body.get_mut("tools").and_then(Value::as_array_mut) else {
        return;
    };
    let mut any = false;
    for decls in tools
        .iter_mut()
        .filter_map(|t| t.get_mut("functionDeclarations").and_then(Value::as_array_mut))
    {
        for decl in decls.iter_mut().filter_map(Value::as_object_mut) {
            any = true;
            if let Some(schema) = decl.remove("parametersJsonSchema")
                && !decl.contains_key("parameters")
            {
                decl.insert("parameters".into(), schema);
            }
            if !decl.get("parameters").is_some_and(Value::is_object) {
                decl.insert(
                    "parameters".into(),
                    json!({"type": "object", "properties": {}}),
                );
            }
        }
    }
    if any {
        append_system_hint(body, TOOL_HARDENING_HINT);
    }
}

fn append_system_hint(body: &mut Value, hint: &str) {
    let Some(obj) = body.as_object_mut() else {
        return;
    };
    let instruction = obj
        .entry("systemInstruction")
        .or_insert_with(|| json!({"role": "user", "parts": []}));
    if let Some(text) = instruction.as_str().map(str::to_string) {
        *instruction = json!({"role": "user", "parts": [{"text": text}]});
    }
    let Some(instruction) = instruction.as_object_mut() else {
        return;
    };
    let parts = instruction
        .entry("parts")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Some(parts) = parts.as_array_mut() else {
        return;
    };
    let present = parts
        .iter()
        .any(|p| p.get("text").and_then(Value::as_str) == Some(hint));
    if !present {
        let mut part = Map::new();
        part.insert("text".into(), Value::String(hint.to_string()));
        parts.push(Value::Object(part));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

    fn inbound(model_action: &str, body: &Value) -> FetchRequest {
        let mut req = FetchRequest::post_json(format!("{GL}/{model_action}"), body);
        req.headers
            .insert("x-goog-api-key", HeaderValue::from_static("AIza-ignored"));
        req
    }

    fn ctx(style: Option<HeaderStyle>) -> CallContext<'static> {
        CallContext {
            access_token: "at-123",
            project_id: "proj-1",
            endpoint: "https://daily.test",
            header_style: style,
            default_style: HeaderStyle::Primary,
        }
    }

    fn body_of(p: &PreparedRequest) -> Value {
        p.request.json_body().unwrap()
    }

    fn hello() -> Value {
        json!({"contents": [{"role": "user", "parts": [{"text": "hi"}]}]})
    }

    #[test]
    fn test_is_generative_language_request() {
        assert!(is_generative_language_request(&format!(
            "{GL}/gemini-2.5-flash:generateContent"
        )));
        assert!(!is_generative_language_request("https://example.com/v1/chat"));
    }

    #[test]
    fn test_parse_model_path() {
        assert_eq!(
            parse_model_path(&format!("{GL}/gemini-3-pro-high:streamGenerateContent?alt=sse")),
            Some(("gemini-3-pro-high", "streamGenerateContent"))
        );
        assert_eq!(parse_model_path(&format!("{GL}/gemini-2.5-flash")), None);
        assert_eq!(parse_model_path("https://generativelanguage.googleapis.com/v1beta/files"), None);
    }

    #[test]
    fn test_prepare_primary_unary() {
        let req = inbound("gemini-3-pro-high:generateContent", &hello());
        let p = prepare(&req, &ctx(None), RequestOptions::default()).unwrap();

        assert!(!p.streaming);
        assert_eq!(p.request.url, "https://daily.test/v1internal:generateContent");
        assert_eq!(p.request.method, Method::POST);
        assert_eq!(p.effective_model, "gemini-3-pro-high");
        assert_eq!(p.header_style, HeaderStyle::Primary);
        assert_eq!(p.request.headers[header::AUTHORIZATION], "Bearer at-123");
        assert_eq!(
            p.request.headers[header::USER_AGENT],
            "antigravity/1.11.5 windows/amd64"
        );
        assert!(p.request.headers.get("x-goog-api-key").is_none());

        let body = body_of(&p);
        assert_eq!(body["project"], "proj-1");
        assert_eq!(body["model"], "gemini-3-pro-high");
        assert_eq!(body["userAgent"], "antigravity");
        assert_eq!(body["requestType"], "agent");
        assert!(body["requestId"].as_str().unwrap().starts_with("agent-"));
        assert_eq!(body["request"]["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_prepare_cli_stream_with_tier() {
        let req = inbound("gemini-3-pro-high:streamGenerateContent", &hello());
        let p = prepare(&req, &ctx(Some(HeaderStyle::Cli)), RequestOptions::default()).unwrap();

        assert!(p.streaming);
        assert_eq!(
            p.request.url,
            "https://daily.test/v1internal:streamGenerateContent?alt=sse"
        );
        assert_eq!(p.requested_model, "gemini-3-pro-high");
        assert_eq!(p.effective_model, "gemini-3-pro-preview");
        assert_eq!(p.request.headers[header::ACCEPT], "text/event-stream");
        assert_eq!(p.request.headers["x-goog-api-client"], "gl-node/22.17.0");

        let body = body_of(&p);
        assert!(body.get("userAgent").is_none());
        assert_eq!(
            body["request"]["generationConfig"]["thinkingConfig"]["thinkingLevel"],
            "high"
        );
    }

    #[test]
    fn test_caller_thinking_level_wins() {
        let body = json!({
            "contents": [],
            "generationConfig": {"thinkingConfig": {"thinkingLevel": "low"}}
        });
        let req = inbound("gemini-3-flash-high:generateContent", &body);
        let p = prepare(&req, &ctx(Some(HeaderStyle::Cli)), RequestOptions::default()).unwrap();
        assert_eq!(
            body_of(&p)["request"]["generationConfig"]["thinkingConfig"]["thinkingLevel"],
            "low"
        );
    }

    #[test]
    fn test_claude_forces_primary_style() {
        let req = inbound("claude-sonnet-4-5:generateContent", &hello());
        let p = prepare(&req, &ctx(Some(HeaderStyle::Cli)), RequestOptions::default()).unwrap();
        assert_eq!(p.header_style, HeaderStyle::Primary);
        assert_eq!(body_of(&p)["userAgent"], "antigravity");
    }

    #[test]
    fn test_tool_hardening_for_claude() {
        let body = json!({
            "contents": [],
            "tools": [{"functionDeclarations": [
                {"name": "read_file", "parameters": {"type": "object", "properties": {"path": {"type": "string"}}}},
                {"name": "list_dir"},
            ]}]
        });
        let req = inbound("claude-sonnet-4-5:generateContent", &body);
        let opts = RequestOptions {
            tool_hardening: true,
            ..RequestOptions::default()
        };
        let p = prepare(&req, &ctx(None), opts).unwrap();

        let debug = p.tool_debug.clone().unwrap();
        assert_eq!(debug.missing_schemas, 1);
        assert_eq!(debug.summary, "read_file,list_dir");

        let sent = body_of(&p);
        let decls = &sent["request"]["tools"][0]["functionDeclarations"];
        assert_eq!(decls[1]["parameters"], json!({"type": "object", "properties": {}}));
        assert_eq!(decls[0]["parameters"]["properties"]["path"]["type"], "string");
        let parts = sent["request"]["systemInstruction"]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["text"], TOOL_HARDENING_HINT);
    }

    #[test]
    fn test_tool_hint_appended_once() {
        let mut body = json!({
            "systemInstruction": {"parts": [{"text": "be brief"}]},
            "tools": [{"functionDeclarations": [{"name": "t"}]}]
        });
        harden_tools(&mut body);
        harden_tools(&mut body);
        let parts = body["systemInstruction"]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["text"], "be brief");
    }

    #[test]
    fn test_no_hardening_for_gemini() {
        let body = json!({"tools": [{"functionDeclarations": [{"name": "t"}]}]});
        let req = inbound("gemini-2.5-flash:generateContent", &body);
        let opts = RequestOptions {
            tool_hardening: true,
            ..RequestOptions::default()
        };
        let p = prepare(&req, &ctx(None), opts).unwrap();
        let sent = body_of(&p);
        assert!(sent["request"]["tools"][0]["functionDeclarations"][0]
            .get("parameters")
            .is_none());
        assert!(sent["request"].get("systemInstruction").is_none());
        assert_eq!(p.tool_debug.unwrap().missing_schemas, 1);
    }

    #[test]
    fn test_force_thinking_recovery() {
        let body = json!({"contents": [
            {"role": "user", "parts": [{"text": "q", "thoughtSignature": "keep"}]},
            {"role": "model", "parts": [
                {"text": "hmm", "thought": true},
                {"text": "answer", "thoughtSignature": "sig"},
            ]},
        ]});
        let req = inbound("gemini-3-pro-high:generateContent", &body);
        let opts = RequestOptions {
            force_thinking_recovery: true,
            ..RequestOptions::default()
        };
        let p = prepare(&req, &ctx(None), opts).unwrap();
        let contents = &body_of(&p)["request"]["contents"];
        assert_eq!(contents[0]["parts"][0]["thoughtSignature"], "keep");
        let model_parts = contents[1]["parts"].as_array().unwrap();
        assert_eq!(model_parts.len(), 1);
        assert_eq!(model_parts[0], json!({"text": "answer"}));
    }

    #[test]
    fn test_prepare_rejects_non_json_body() {
        let mut req = FetchRequest::new(Method::POST, format!("{GL}/gemini-2.5-flash:generateContent"));
        req.body = Some(Bytes::from_static(b"not json"));
        let err = prepare(&req, &ctx(None), RequestOptions::default()).unwrap_err();
        assert!(matches!(err, GravlinkError::Translation(_)));
    }

    #[test]
    fn test_prepare_is_repeatable_per_endpoint() {
        let req = inbound("gemini-2.5-flash:generateContent", &hello());
        let mut c = ctx(None);
        let a = prepare(&req, &c, RequestOptions::default()).unwrap();
        c.endpoint = "https://prod.test/";
        let b = prepare(&req, &c, RequestOptions::default()).unwrap();
        assert_eq!(a.endpoint, "https://daily.test");
        assert_eq!(b.request.url, "https://prod.test/v1internal:generateContent");
        assert_eq!(body_of(&a)["request"], body_of(&b)["request"]);
    }
}
