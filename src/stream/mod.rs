pub mod collector;
pub mod signal;
pub mod sse;
pub mod transcoder;

pub use collector::{collect_signals, AggregatedResult, AggregatingCollector, Flow};
pub use signal::{interpret_event, interpret_payload, signal_stream, UpstreamSignal};
pub use sse::{sse_event_stream, SseParser};
pub use transcoder::{transcode_signals, ChunkTranscoder, TranscoderState};

/// Kind of a parsed SSE unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SseEventKind {
    /// A dispatched record carrying `data`.
    #[default]
    Event,
    /// A `retry:` reconnect-interval directive; `data` holds the milliseconds.
    Retry,
}

/// A parsed SSE frame from the upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub kind: SseEventKind,
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    /// Unnamed data-carrying event.
    #[must_use]
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            kind: SseEventKind::Event,
            event: None,
            data: data.into(),
            id: None,
        }
    }

    #[must_use]
    pub fn is_data(&self) -> bool {
        self.kind == SseEventKind::Event
    }
}
