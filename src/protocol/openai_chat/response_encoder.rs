use crate::stream::AggregatedResult;

use super::stream::FINISH_REASON_STOP;
use super::{OpenAiChatResponse, OpenAiChoice, OpenAiResponseMessage};

/// Encode a collected answer into the `OpenAI` Chat Completions wire format.
#[must_use]
pub fn encode_openai_chat_response(result: AggregatedResult) -> OpenAiChatResponse {
    OpenAiChatResponse {
        id: result.id,
        object: "chat.completion".to_string(),
        created: result.created,
        model: result.model,
        choices: vec![OpenAiChoice {
            index: 0,
            message: OpenAiResponseMessage {
                role: "assistant".to_string(),
                content: result.content,
            },
            finish_reason: FINISH_REASON_STOP.to_string(),
        }],
        usage: result.usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai_chat::OpenAiUsage;

    #[test]
    fn test_encode_aggregated_result() {
        let result = AggregatedResult {
            id: "conv-9".to_string(),
            model: "search".to_string(),
            content: "Hello".to_string(),
            created: 1_700_000_123,
            usage: OpenAiUsage::default(),
        };
        let json = serde_json::to_value(encode_openai_chat_response(result)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "conv-9",
                "object": "chat.completion",
                "created": 1_700_000_123_u64,
                "model": "search",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hello"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}
            })
        );
    }
}
