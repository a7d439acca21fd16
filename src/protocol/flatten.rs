use serde_json::Value;

use super::openai_chat::OpenAiMessage;
use crate::error::BridgeError;

/// Collapse an `OpenAI` message history into the single prompt string the
/// search service accepts.
///
/// A lone user message is sent verbatim. Anything longer is rendered as a
/// `Role: text` transcript ending with an open `Assistant:` turn.
pub fn flatten_messages(messages: &[OpenAiMessage]) -> Result<String, BridgeError> {
    if messages.is_empty() {
        return Err(BridgeError::InvalidRequest(
            "messages must contain at least one entry".to_string(),
        ));
    }

    if let [only] = messages {
        if only.role == "user" {
            return Ok(message_text(only.content.as_ref()));
        }
    }

    let mut out = String::new();
    for message in messages {
        out.push_str(role_label(&message.role));
        out.push_str(": ");
        out.push_str(&message_text(message.content.as_ref()));
        out.push_str("\n\n");
    }
    out.push_str("Assistant:");
    Ok(out)
}

fn role_label(role: &str) -> &str {
    match role {
        "system" | "developer" => "System",
        "user" => "User",
        "assistant" => "Assistant",
        "tool" | "function" => "Tool",
        other => other,
    }
}

/// Text of a message `content`: a plain string, or the `text` parts of an
/// array joined by newlines. Image and other parts are dropped.
fn message_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => {
            let mut out = String::new();
            for part in parts {
                let text = match part {
                    Value::String(text) => Some(text.as_str()),
                    Value::Object(obj) => {
                        if obj.get("type").and_then(Value::as_str).unwrap_or("text") == "text" {
                            obj.get("text").and_then(Value::as_str)
                        } else {
                            None
                        }
                    }
                    _ => None,
                };
                if let Some(text) = text {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
            }
            out
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(role: &str, content: Value) -> OpenAiMessage {
        OpenAiMessage {
            role: role.to_string(),
            content: Some(content),
            name: None,
        }
    }

    #[test]
    fn test_empty_history_is_rejected() {
        let err = flatten_messages(&[]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
    }

    #[test]
    fn test_single_user_message_is_verbatim() {
        let prompt = flatten_messages(&[msg("user", json!("what is rust?"))]).unwrap();
        assert_eq!(prompt, "what is rust?");
    }

    #[test]
    fn test_history_becomes_transcript() {
        let prompt = flatten_messages(&[
            msg("system", json!("be brief")),
            msg("user", json!("hi")),
            msg("assistant", json!("hello")),
            msg("user", json!("weather?")),
        ])
        .unwrap();
        assert_eq!(
            prompt,
            "System: be brief\n\nUser: hi\n\nAssistant: hello\n\nUser: weather?\n\nAssistant:"
        );
    }

    #[test]
    fn test_single_system_message_is_still_a_transcript() {
        let prompt = flatten_messages(&[msg("system", json!("rules"))]).unwrap();
        assert_eq!(prompt, "System: rules\n\nAssistant:");
    }

    #[test]
    fn test_content_parts_keep_only_text() {
        let prompt = flatten_messages(&[msg(
            "user",
            json!([
                {"type": "text", "text": "look at"},
                {"type": "image_url", "image_url": {"url": "http://x/y.png"}},
                {"type": "text", "text": "this"}
            ]),
        )])
        .unwrap();
        assert_eq!(prompt, "look at\nthis");
    }

    #[test]
    fn test_missing_content_is_empty_text() {
        let messages = [
            OpenAiMessage {
                role: "assistant".to_string(),
                content: None,
                name: None,
            },
            msg("user", json!("next")),
        ];
        assert_eq!(
            flatten_messages(&messages).unwrap(),
            "Assistant: \n\nUser: next\n\nAssistant:"
        );
    }
}
