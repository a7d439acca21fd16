//! Classification of upstream SSE events into semantic signals.
//!
//! The search service sends JSON objects in SSE `data` lines, discriminated by
//! their `type` field, and ends the stream with a literal `[DONE]` payload.

use futures_util::{future, Stream, StreamExt};
use serde_json::Value;

use super::sse::sse_event_stream;
use super::SseEvent;
use crate::error::BridgeError;

/// Payload that marks the end of the upstream stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const APPEND_TEXT: &str = "append-text";

/// What one upstream event means for the consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamSignal {
    /// Text to append to the answer, in arrival order.
    AppendText(String),
    /// The upstream announced the end of the answer.
    StreamEnd,
    /// A payload that is not a JSON object; carries the raw payload.
    Malformed(String),
}

/// Map one parsed SSE event to a signal.
///
/// Returns `None` for events that carry nothing for the consumers: non-data
/// units (`retry:` directives) and JSON objects whose `type` is not
/// `append-text`. Unknown discriminators are skipped so that new upstream
/// event types do not break existing clients.
#[must_use]
pub fn interpret_event(event: &SseEvent) -> Option<UpstreamSignal> {
    if !event.is_data() {
        return None;
    }
    interpret_payload(&event.data)
}

/// Map one `data` payload to a signal. See [`interpret_event`].
#[must_use]
pub fn interpret_payload(data: &str) -> Option<UpstreamSignal> {
    if data.trim() == DONE_SENTINEL {
        return Some(UpstreamSignal::StreamEnd);
    }

    let Ok(Value::Object(mut payload)) = serde_json::from_str::<Value>(data) else {
        return Some(UpstreamSignal::Malformed(data.to_owned()));
    };

    if payload.get("type").and_then(Value::as_str) != Some(APPEND_TEXT) {
        return None;
    }

    let text = match payload.remove("text") {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };
    Some(UpstreamSignal::AppendText(text))
}

/// Parse an upstream byte stream all the way to signals.
///
/// Transport failures are passed through as `Err` items; the stream ends
/// after the first one.
pub fn signal_stream<S, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<UpstreamSignal, BridgeError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Into<BridgeError> + Send + 'static,
{
    sse_event_stream(byte_stream).filter_map(|item| {
        future::ready(match item {
            Ok(event) => interpret_event(&event).map(Ok),
            Err(err) => Some(Err(err)),
        })
    })
}
