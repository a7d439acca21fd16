use crate::util::{push_json_string_escaped, push_u64_decimal};

use super::OpenAiUsage;

/// Literal record that ends every streamed response.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Finish reason reported on the terminal chunk.
pub const FINISH_REASON_STOP: &str = "stop";

/// Delta payload carried by one [`OutputChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkDelta<'a> {
    /// `{"role":"assistant","content":""}`: lets clients start rendering.
    Role,
    /// `{"content":<text>}`: exactly one upstream text increment.
    Text(&'a str),
    /// `{}`: used by the terminal chunk.
    Empty,
}

/// One `chat.completion.chunk` record.
#[derive(Debug, Clone, Copy)]
pub struct OutputChunk<'a> {
    pub id: &'a str,
    pub model: &'a str,
    pub created: u64,
    pub delta: ChunkDelta<'a>,
    pub finish_reason: Option<&'static str>,
    pub usage: Option<OpenAiUsage>,
}

impl<'a> OutputChunk<'a> {
    #[must_use]
    pub fn priming(id: &'a str, model: &'a str, created: u64) -> Self {
        Self {
            id,
            model,
            created,
            delta: ChunkDelta::Role,
            finish_reason: None,
            usage: None,
        }
    }

    #[must_use]
    pub fn text(id: &'a str, model: &'a str, created: u64, text: &'a str) -> Self {
        Self {
            id,
            model,
            created,
            delta: ChunkDelta::Text(text),
            finish_reason: None,
            usage: None,
        }
    }

    #[must_use]
    pub fn terminal(id: &'a str, model: &'a str, created: u64) -> Self {
        Self {
            id,
            model,
            created,
            delta: ChunkDelta::Empty,
            finish_reason: Some(FINISH_REASON_STOP),
            usage: Some(OpenAiUsage::default()),
        }
    }

    /// Append this chunk as a `data: <json>\n\n` SSE record.
    pub fn write_frame(&self, out: &mut String) {
        out.reserve(160 + self.id.len() + self.model.len() + self.delta_len());
        out.push_str("data: {\"id\":");
        push_json_string_escaped(out, self.id);
        out.push_str(",\"object\":\"chat.completion.chunk\",\"created\":");
        push_u64_decimal(out, self.created);
        out.push_str(",\"model\":");
        push_json_string_escaped(out, self.model);
        out.push_str(",\"choices\":[{\"index\":0,\"delta\":");
        match self.delta {
            ChunkDelta::Role => out.push_str("{\"role\":\"assistant\",\"content\":\"\"}"),
            ChunkDelta::Text(text) => {
                out.push_str("{\"content\":");
                push_json_string_escaped(out, text);
                out.push('}');
            }
            ChunkDelta::Empty => out.push_str("{}"),
        }
        out.push_str(",\"finish_reason\":");
        match self.finish_reason {
            Some(reason) => push_json_string_escaped(out, reason),
            None => out.push_str("null"),
        }
        out.push_str("}]");
        if let Some(usage) = self.usage {
            out.push_str(",\"usage\":{\"prompt_tokens\":");
            push_u64_decimal(out, usage.prompt_tokens);
            out.push_str(",\"completion_tokens\":");
            push_u64_decimal(out, usage.completion_tokens);
            out.push_str(",\"total_tokens\":");
            push_u64_decimal(out, usage.total_tokens);
            out.push('}');
        }
        out.push_str("}\n\n");
    }

    #[must_use]
    pub fn to_frame(&self) -> String {
        let mut out = String::new();
        self.write_frame(&mut out);
        out
    }

    fn delta_len(&self) -> usize {
        match self.delta {
            ChunkDelta::Text(text) => text.len(),
            ChunkDelta::Role | ChunkDelta::Empty => 0,
        }
    }
}
