//! Incremental consumer: re-emits upstream text as `chat.completion.chunk`
//! SSE records as it arrives.

use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use smallvec::SmallVec;
use tracing::error;

use super::UpstreamSignal;
use crate::error::BridgeError;
use crate::observability::{log_stream_complete, StreamOutcome};
use crate::protocol::openai_chat::stream::{OutputChunk, DONE_FRAME};
use crate::util::unix_now_secs;

/// Lifecycle of one [`ChunkTranscoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscoderState {
    /// Constructed; the priming chunk is written by `start`.
    Priming,
    /// Forwarding text deltas.
    Streaming,
    /// Final bytes written. Nothing else may follow.
    Terminated,
}

/// Writes the chunk sequence for one streamed response.
///
/// The output is always: one priming chunk, zero or more text chunks, then
/// either the terminal chunk followed by `data: [DONE]`, or on failure the
/// `data: [DONE]` sentinel alone.
pub struct ChunkTranscoder {
    id: String,
    model: String,
    created: u64,
    state: TranscoderState,
    outcome: StreamOutcome,
    text_bytes: usize,
    frame: String,
}

impl ChunkTranscoder {
    /// Create the transcoder and write the priming chunk to `out`.
    pub fn start(id: impl Into<String>, model: impl Into<String>, out: &mut Vec<Bytes>) -> Self {
        Self::start_at(id, model, unix_now_secs(), out)
    }

    pub fn start_at(
        id: impl Into<String>,
        model: impl Into<String>,
        created: u64,
        out: &mut Vec<Bytes>,
    ) -> Self {
        let mut transcoder = Self {
            id: id.into(),
            model: model.into(),
            created,
            state: TranscoderState::Priming,
            outcome: StreamOutcome::Clean,
            text_bytes: 0,
            frame: String::with_capacity(256),
        };
        OutputChunk::priming(&transcoder.id, &transcoder.model, created)
            .write_frame(&mut transcoder.frame);
        out.push(Bytes::from(std::mem::take(&mut transcoder.frame)));
        transcoder.state = TranscoderState::Streaming;
        transcoder
    }

    #[must_use]
    pub fn state(&self) -> TranscoderState {
        self.state
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state == TranscoderState::Terminated
    }

    #[must_use]
    pub fn outcome(&self) -> StreamOutcome {
        self.outcome
    }

    #[must_use]
    pub fn text_bytes(&self) -> usize {
        self.text_bytes
    }

    pub fn on_signal_into(&mut self, signal: UpstreamSignal, out: &mut Vec<Bytes>) {
        if self.is_terminated() {
            return;
        }
        match signal {
            UpstreamSignal::AppendText(text) => {
                self.frame.clear();
                OutputChunk::text(&self.id, &self.model, self.created, &text)
                    .write_frame(&mut self.frame);
                out.push(Bytes::from(std::mem::take(&mut self.frame)));
                self.text_bytes += text.len();
            }
            UpstreamSignal::StreamEnd => self.on_close_into(out),
            UpstreamSignal::Malformed(raw) => {
                error!(
                    conversation_id = %self.id,
                    payload = %raw,
                    "malformed upstream event payload, ending stream"
                );
                self.outcome = StreamOutcome::Malformed;
                self.terminate_with_sentinel(out);
            }
        }
    }

    /// Clean end: terminal chunk, then the sentinel.
    pub fn on_close_into(&mut self, out: &mut Vec<Bytes>) {
        if self.is_terminated() {
            return;
        }
        self.frame.clear();
        OutputChunk::terminal(&self.id, &self.model, self.created).write_frame(&mut self.frame);
        out.push(Bytes::from(std::mem::take(&mut self.frame)));
        out.push(Bytes::from_static(DONE_FRAME.as_bytes()));
        self.state = TranscoderState::Terminated;
    }

    pub fn on_transport_error_into(&mut self, err: &BridgeError, out: &mut Vec<Bytes>) {
        if self.is_terminated() {
            return;
        }
        error!(
            conversation_id = %self.id,
            error = %err,
            "upstream transport failed, ending stream"
        );
        self.outcome = StreamOutcome::TransportError;
        self.terminate_with_sentinel(out);
    }

    fn terminate_with_sentinel(&mut self, out: &mut Vec<Bytes>) {
        out.push(Bytes::from_static(DONE_FRAME.as_bytes()));
        self.state = TranscoderState::Terminated;
    }
}

struct PendingBytes {
    chunks: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingBytes {
    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        let mut chunks = SmallVec::new();
        chunks.reserve(capacity);
        Self { chunks, head: 0 }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.chunks.len() {
            return None;
        }
        let chunk = std::mem::take(&mut self.chunks[self.head]);
        self.head += 1;
        if self.head == self.chunks.len() {
            self.chunks.clear();
            self.head = 0;
        }
        Some(chunk)
    }

    #[inline]
    fn extend_from_vec(&mut self, written: &mut Vec<Bytes>) {
        if written.is_empty() {
            return;
        }
        self.chunks.reserve(written.len());
        self.chunks.extend(written.drain(..));
    }
}

/// Drive a [`ChunkTranscoder`] over a signal stream, yielding response body
/// bytes.
///
/// The priming chunk is available before the first upstream signal is
/// polled. The upstream stream is dropped as soon as the transcoder
/// terminates.
pub fn transcode_signals<S>(
    signals: S,
    id: String,
    model: String,
) -> impl Stream<Item = Bytes> + Send
where
    S: Stream<Item = Result<UpstreamSignal, BridgeError>> + Send + 'static,
{
    let mut written = Vec::<Bytes>::with_capacity(8);
    let transcoder = ChunkTranscoder::start(id, model, &mut written);
    let mut pending = PendingBytes::with_capacity(8);
    pending.extend_from_vec(&mut written);

    futures_util::stream::unfold(
        (
            Some(Box::pin(signals)),
            transcoder,
            written,
            pending,
            Instant::now(),
        ),
        |(mut signals, mut transcoder, mut written, mut pending, started)| async move {
            loop {
                if let Some(chunk) = pending.pop_front() {
                    return Some((chunk, (signals, transcoder, written, pending, started)));
                }
                let Some(source) = signals.as_mut() else {
                    return None;
                };

                match source.as_mut().next().await {
                    Some(Ok(signal)) => transcoder.on_signal_into(signal, &mut written),
                    Some(Err(err)) => transcoder.on_transport_error_into(&err, &mut written),
                    None => transcoder.on_close_into(&mut written),
                }
                pending.extend_from_vec(&mut written);

                if transcoder.is_terminated() {
                    signals = None;
                    log_stream_complete(
                        &transcoder.id,
                        &transcoder.model,
                        transcoder.outcome(),
                        transcoder.text_bytes(),
                        started.elapsed(),
                    );
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> UpstreamSignal {
        UpstreamSignal::AppendText(s.to_string())
    }

    fn frames(out: &[Bytes]) -> Vec<String> {
        out.iter()
            .map(|b| String::from_utf8(b.to_vec()).expect("utf8 frame"))
            .collect()
    }

    fn payload(frame: &str) -> serde_json::Value {
        let body = frame
            .strip_prefix("data: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .expect("sse framing");
        serde_json::from_str(body).expect("json chunk")
    }

    fn deltas(frames: &[String]) -> String {
        frames
            .iter()
            .filter(|f| f.as_str() != DONE_FRAME)
            .filter_map(|f| {
                payload(f)["choices"][0]["delta"]["content"]
                    .as_str()
                    .map(str::to_owned)
            })
            .collect()
    }

    async fn run(items: Vec<Result<UpstreamSignal, BridgeError>>) -> Vec<String> {
        let out: Vec<Bytes> = transcode_signals(
            futures_util::stream::iter(items),
            "conv-1".to_string(),
            "search".to_string(),
        )
        .collect()
        .await;
        frames(&out)
    }

    #[test]
    fn test_start_writes_priming_chunk() {
        let mut out = Vec::new();
        let transcoder = ChunkTranscoder::start_at("conv-1", "search", 7, &mut out);
        assert_eq!(transcoder.state(), TranscoderState::Streaming);
        let frames = frames(&out);
        assert_eq!(frames.len(), 1);
        let json = payload(&frames[0]);
        assert_eq!(json["id"], "conv-1");
        assert_eq!(json["model"], "search");
        assert_eq!(json["created"], 7);
        assert_eq!(json["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(json["choices"][0]["delta"]["content"], "");
    }

    #[tokio::test]
    async fn test_hel_lo_done() {
        let frames = run(vec![
            Ok(text("Hel")),
            Ok(text("lo")),
            Ok(UpstreamSignal::StreamEnd),
        ])
        .await;
        assert_eq!(frames.len(), 5);
        assert_eq!(payload(&frames[0])["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(payload(&frames[1])["choices"][0]["delta"]["content"], "Hel");
        assert_eq!(payload(&frames[2])["choices"][0]["delta"]["content"], "lo");
        let terminal = payload(&frames[3]);
        assert_eq!(terminal["choices"][0]["finish_reason"], "stop");
        assert_eq!(terminal["choices"][0]["delta"], serde_json::json!({}));
        assert_eq!(terminal["usage"]["total_tokens"], 0);
        assert_eq!(frames[4], DONE_FRAME);
        assert_eq!(deltas(&frames), "Hello");
    }

    #[tokio::test]
    async fn test_empty_stream_emits_priming_and_terminal() {
        let frames = run(vec![]).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(payload(&frames[0])["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(payload(&frames[1])["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames[2], DONE_FRAME);
    }

    #[tokio::test]
    async fn test_close_without_done_terminates_cleanly() {
        let frames = run(vec![Ok(text("partial"))]).await;
        assert_eq!(frames.len(), 4);
        assert_eq!(payload(&frames[2])["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames[3], DONE_FRAME);
    }

    #[tokio::test]
    async fn test_malformed_emits_only_sentinel() {
        let frames = run(vec![
            Ok(text("Hel")),
            Ok(UpstreamSignal::Malformed("{oops".to_string())),
            Ok(text("lo")),
            Ok(UpstreamSignal::StreamEnd),
        ])
        .await;
        assert_eq!(frames.len(), 3);
        assert_eq!(payload(&frames[1])["choices"][0]["delta"]["content"], "Hel");
        assert_eq!(frames[2], DONE_FRAME);
        assert!(!frames.iter().any(|f| f.contains("\"finish_reason\":\"stop\"")));
    }

    #[tokio::test]
    async fn test_transport_error_after_one_append() {
        let frames = run(vec![
            Ok(text("Hel")),
            Err(BridgeError::transport("connection reset")),
        ])
        .await;
        assert_eq!(frames.len(), 3);
        assert_eq!(payload(&frames[1])["choices"][0]["delta"]["content"], "Hel");
        assert_eq!(frames[2], DONE_FRAME);
    }

    #[tokio::test]
    async fn test_signals_after_done_are_not_written() {
        let frames = run(vec![
            Ok(UpstreamSignal::StreamEnd),
            Ok(text("late")),
            Err(BridgeError::transport("late error")),
        ])
        .await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames.iter().filter(|f| f.as_str() == DONE_FRAME).count(), 1);
        assert_eq!(deltas(&frames), "");
    }

    #[test]
    fn test_entry_points_are_noops_after_termination() {
        let mut out = Vec::new();
        let mut transcoder = ChunkTranscoder::start_at("c", "m", 1, &mut out);
        transcoder.on_close_into(&mut out);
        let written = out.len();
        transcoder.on_signal_into(text("x"), &mut out);
        transcoder.on_close_into(&mut out);
        transcoder.on_transport_error_into(&BridgeError::transport("x"), &mut out);
        assert_eq!(out.len(), written);
        assert!(transcoder.is_terminated());
        assert_eq!(transcoder.outcome(), StreamOutcome::Clean);
    }
}
