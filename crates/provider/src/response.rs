//! Response transformation: Code Assist envelope → generative-language body.
//!
//! Successful bodies of the form `{"response": {...}}` are unwrapped to the
//! inner object. Streams are rewritten line by line so only a partial line is
//! ever held back. Error responses pass through untouched.

use crate::request::PreparedRequest;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt as _;
use gravlink_types::{ByteStream, CallMetadata, FetchResponse, ResponseBody, traits::Result};
use http::header;
use serde_json::Value;

/// Unwrap `{"response": inner}`; `None` when `payload` is not an envelope.
fn unwrap_envelope(payload: &[u8]) -> Option<Vec<u8>> {
    let mut json: Value = serde_json::from_slice(payload).ok()?;
    let inner = json.as_object_mut()?.remove("response")?;
    serde_json::to_vec(&inner).ok()
}

/// Longest partial line held back before it is forwarded unmodified.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Rewrites complete SSE `data:` lines; all other bytes are forwarded as-is.
///
/// A line longer than the limit is flushed verbatim as it arrives, up to and
/// including its newline.
#[derive(Debug)]
pub struct SseUnwrapper {
    pending: BytesMut,
    max_line: usize,
    overflowed: bool,
}

impl Default for SseUnwrapper {
    fn default() -> Self {
        Self::with_line_limit(MAX_LINE_BYTES)
    }
}

impl SseUnwrapper {
    #[must_use]
    pub fn with_line_limit(max_line: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            max_line,
            overflowed: false,
        }
    }

    /// Feed a chunk; returns the rewritten bytes of every line it completed.
    pub fn push(&mut self, mut chunk: &[u8]) -> Bytes {
        let mut out = BytesMut::new();
        if self.overflowed {
            let Some(nl) = chunk.iter().position(|&b| b == b'\n') else {
                return Bytes::copy_from_slice(chunk);
            };
            out.extend_from_slice(&chunk[..=nl]);
            chunk = &chunk[nl + 1..];
            self.overflowed = false;
        }

        self.pending.extend_from_slice(chunk);
        if let Some(end) = self.pending.iter().rposition(|&b| b == b'\n') {
            let complete = self.pending.split_to(end + 1);
            for line in complete.split_inclusive(|&b| b == b'\n') {
                rewrite_line(line, &mut out);
            }
        }
        if self.pending.len() > self.max_line {
            tracing::debug!(len = self.pending.len(), "SSE line over limit; forwarding unmodified");
            out.extend_from_slice(&self.pending.split());
            self.overflowed = true;
        }
        out.freeze()
    }

    /// Flush a trailing line that never got its newline.
    pub fn finish(&mut self) -> Bytes {
        self.overflowed = false;
        if self.pending.is_empty() {
            return Bytes::new();
        }
        let rest = self.pending.split();
        let mut out = BytesMut::with_capacity(rest.len());
        rewrite_line(&rest, &mut out);
        out.freeze()
    }
}

fn rewrite_line(line: &[u8], out: &mut BytesMut) {
    let body_len = line
        .iter()
        .rposition(|&b| b != b'\n' && b != b'\r')
        .map_or(0, |i| i + 1);
    let (content, ending) = line.split_at(body_len);
    let rewritten = content
        .strip_prefix(b"data:")
        .and_then(|payload| unwrap_envelope(payload.trim_ascii_start()));
    match rewritten {
        Some(inner) => {
            out.extend_from_slice(b"data: ");
            out.extend_from_slice(&inner);
        }
        None => out.extend_from_slice(content),
    }
    out.extend_from_slice(ending);
}

/// Wrap a backend SSE stream so each envelope line is unwrapped on the fly.
///
/// Dropping the returned stream drops the backend stream with it.
#[must_use]
pub fn unwrap_sse_stream(inner: ByteStream) -> ByteStream {
    let state = (inner, SseUnwrapper::default(), false);
    Box::pin(futures_util::stream::unfold(
        state,
        |(mut inner, mut unwrapper, done)| async move {
            if done {
                return None;
            }
            loop {
                match inner.next().await {
                    Some(Ok(chunk)) => {
                        let out = unwrapper.push(&chunk);
                        if !out.is_empty() {
                            return Some((Ok(out), (inner, unwrapper, false)));
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), (inner, unwrapper, true))),
                    None => {
                        let rest = unwrapper.finish();
                        return (!rest.is_empty()).then_some((Ok(rest), (inner, unwrapper, true)));
                    }
                }
            }
        },
    ))
}

/// Routing facts for the caller.
#[must_use]
pub fn call_metadata(prepared: &PreparedRequest) -> CallMetadata {
    CallMetadata {
        requested_model: prepared.requested_model.clone(),
        effective_model: prepared.effective_model.clone(),
        project_id: prepared.project_id.clone(),
        endpoint: prepared.endpoint.clone(),
        streaming: prepared.streaming,
    }
}

/// Normalize a backend response for the caller and attach [`CallMetadata`].
///
/// # Errors
///
/// Returns a transport error if a non-streaming body fails mid-read.
pub async fn transform(mut response: FetchResponse, prepared: &PreparedRequest) -> Result<FetchResponse> {
    response.metadata = Some(call_metadata(prepared));
    if !response.status.is_success() {
        return Ok(response);
    }
    response.headers.remove(header::CONTENT_LENGTH);

    response.body = match (response.body, prepared.streaming) {
        (ResponseBody::Stream(stream), true) => ResponseBody::Stream(unwrap_sse_stream(stream)),
        (ResponseBody::Buffered(bytes), true) => {
            let mut unwrapper = SseUnwrapper::default();
            let mut out = BytesMut::from(&unwrapper.push(&bytes)[..]);
            out.extend_from_slice(&unwrapper.finish());
            ResponseBody::Buffered(out.freeze())
        }
        (body, false) => {
            let bytes = body.collect().await?;
            tracing::trace!(len = bytes.len(), "backend response body buffered");
            ResponseBody::Buffered(unwrap_envelope(&bytes).map_or(bytes, Bytes::from))
        }
    };
    Ok(response)
}
