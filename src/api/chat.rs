use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tracing::{info, warn};

use super::common::{ok_json_response, sse_ok_response};
use crate::error::BridgeError;
use crate::protocol::flatten::flatten_messages;
use crate::protocol::openai_chat::response_encoder::encode_openai_chat_response;
use crate::protocol::openai_chat::OpenAiChatRequest;
use crate::state::AppState;
use crate::stream::{collect_signals, signal_stream, transcode_signals};

/// `POST /v1/chat/completions`.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Response {
    match handler_inner(state, &headers, &body).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "chat completion failed");
            err.into_response()
        }
    }
}

fn parse_request(body: &[u8]) -> Result<OpenAiChatRequest, BridgeError> {
    serde_json::from_slice(body)
        .map_err(|err| BridgeError::InvalidRequest(format!("Invalid chat completion request: {err}")))
}

async fn handler_inner(
    state: Arc<AppState>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, BridgeError> {
    state.authenticate(headers)?;

    let request = parse_request(body)?;
    let prompt = flatten_messages(&request.messages)?;
    let model = state.catalog.normalize(request.model.as_deref());
    let stream = request.stream.unwrap_or(false);
    let request_id = state.next_request_id();
    info!(
        request_id = %request_id,
        model = model.visible,
        upstream_model = model.upstream,
        stream,
        prompt_bytes = prompt.len(),
        "chat completion request"
    );

    let session = state
        .client
        .acquire(state.token_cache())
        .await
        .inspect_err(|err| warn!(request_id = %request_id, error = %err, "session bootstrap failed"))?;
    let byte_stream = state
        .client
        .open_stream(&session, &prompt, model.upstream)
        .await?;
    let signals = signal_stream(byte_stream);

    let conversation_id = session.conversation_id;
    let visible_model = model.visible.to_string();

    if stream {
        let output = transcode_signals(signals, conversation_id, visible_model);
        let body = Body::from_stream(output.map(Ok::<bytes::Bytes, Infallible>));
        return Ok(sse_ok_response(body));
    }

    let result = collect_signals(signals, conversation_id, visible_model).await?;
    let response = encode_openai_chat_response(result);
    let body = serde_json::to_vec(&response)
        .map_err(|err| BridgeError::Internal(format!("Failed to encode response: {err}")))?;
    Ok(ok_json_response(bytes::Bytes::from(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_defaults() {
        let request =
            parse_request(br#"{"messages":[{"role":"user","content":"hi"}],"temperature":0.2}"#)
                .unwrap();
        assert!(request.model.is_none());
        assert!(request.stream.is_none());
        assert_eq!(request.messages.len(), 1);
        assert!(request.extra.contains_key("temperature"));
    }

    #[test]
    fn test_parse_request_rejects_bad_json() {
        assert!(matches!(
            parse_request(b"{not json"),
            Err(BridgeError::InvalidRequest(_))
        ));
        assert!(matches!(
            parse_request(br#"{"model":"search"}"#),
            Err(BridgeError::InvalidRequest(_))
        ));
    }
}
