//! Aggregating consumer: turns a whole upstream stream into one answer.

use std::time::Instant;

use futures_util::{Stream, StreamExt};

use super::UpstreamSignal;
use crate::error::BridgeError;
use crate::observability::{log_stream_complete, StreamOutcome};
use crate::protocol::openai_chat::OpenAiUsage;
use crate::util::unix_now_secs;

/// Final answer of a non-streaming call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedResult {
    pub id: String,
    pub model: String,
    pub content: String,
    pub created: u64,
    pub usage: OpenAiUsage,
}

/// Whether the collector wants more signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Collecting,
    Finished,
    Rejected,
}

/// Accumulates `AppendText` increments until the upstream ends.
///
/// Resolves exactly once: after `StreamEnd` or a rejection every further
/// signal is ignored.
#[derive(Debug)]
pub struct AggregatingCollector {
    id: String,
    model: String,
    content: String,
    created: u64,
    phase: Phase,
}

impl AggregatingCollector {
    #[must_use]
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new_at(id, model, unix_now_secs())
    }

    #[must_use]
    pub fn new_at(id: impl Into<String>, model: impl Into<String>, created: u64) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            content: String::new(),
            created,
            phase: Phase::Collecting,
        }
    }

    /// Apply one signal.
    ///
    /// `Malformed` rejects the whole call with `UpstreamProtocol`; the partial
    /// content is discarded.
    pub fn accept(&mut self, signal: UpstreamSignal) -> Result<Flow, BridgeError> {
        if self.phase != Phase::Collecting {
            return Ok(Flow::Finished);
        }
        match signal {
            UpstreamSignal::AppendText(text) => {
                self.content.push_str(&text);
                Ok(Flow::Continue)
            }
            UpstreamSignal::StreamEnd => {
                self.phase = Phase::Finished;
                Ok(Flow::Finished)
            }
            UpstreamSignal::Malformed(raw) => {
                self.phase = Phase::Rejected;
                self.content.clear();
                Err(BridgeError::UpstreamProtocol(raw))
            }
        }
    }

    /// Mark the call as failed by a transport error.
    pub fn reject(&mut self) {
        self.phase = Phase::Rejected;
        self.content.clear();
    }

    #[must_use]
    pub fn content_len(&self) -> usize {
        self.content.len()
    }

    /// Produce the result. `None` once the collector was rejected.
    #[must_use]
    pub fn finish(self) -> Option<AggregatedResult> {
        if self.phase == Phase::Rejected {
            return None;
        }
        Some(AggregatedResult {
            id: self.id,
            model: self.model,
            content: self.content,
            created: self.created,
            usage: OpenAiUsage::default(),
        })
    }
}

/// Drain a signal stream into one [`AggregatedResult`].
///
/// A clean close of the stream without `[DONE]` still resolves successfully.
pub async fn collect_signals<S>(
    signals: S,
    id: String,
    model: String,
) -> Result<AggregatedResult, BridgeError>
where
    S: Stream<Item = Result<UpstreamSignal, BridgeError>>,
{
    let started = Instant::now();
    let mut signals = std::pin::pin!(signals);
    let mut collector = AggregatingCollector::new(id.clone(), model.clone());

    while let Some(item) = signals.next().await {
        let outcome = match item {
            Ok(signal) => collector.accept(signal),
            Err(err) => {
                collector.reject();
                Err(err)
            }
        };
        match outcome {
            Ok(Flow::Continue) => {}
            Ok(Flow::Finished) => break,
            Err(err) => {
                let kind = if matches!(err, BridgeError::UpstreamProtocol(_)) {
                    StreamOutcome::Malformed
                } else {
                    StreamOutcome::TransportError
                };
                log_stream_complete(&id, &model, kind, 0, started.elapsed());
                return Err(err);
            }
        }
    }

    let text_bytes = collector.content_len();
    log_stream_complete(
        &id,
        &model,
        StreamOutcome::Clean,
        text_bytes,
        started.elapsed(),
    );
    collector
        .finish()
        .ok_or_else(|| BridgeError::Internal("collector finished after rejection".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(
        items: Vec<Result<UpstreamSignal, BridgeError>>,
    ) -> impl Stream<Item = Result<UpstreamSignal, BridgeError>> {
        futures_util::stream::iter(items)
    }

    fn text(s: &str) -> Result<UpstreamSignal, BridgeError> {
        Ok(UpstreamSignal::AppendText(s.to_string()))
    }

    #[tokio::test]
    async fn test_collects_hel_lo() {
        let result = collect_signals(
            signals(vec![text("Hel"), text("lo"), Ok(UpstreamSignal::StreamEnd)]),
            "conv-1".to_string(),
            "search".to_string(),
        )
        .await
        .unwrap();
        assert_eq!(result.id, "conv-1");
        assert_eq!(result.model, "search");
        assert_eq!(result.content, "Hello");
        assert_eq!(result.usage, OpenAiUsage::default());
    }

    #[tokio::test]
    async fn test_close_without_done_resolves() {
        let result = collect_signals(
            signals(vec![text("partial")]),
            "conv-2".to_string(),
            "search".to_string(),
        )
        .await
        .unwrap();
        assert_eq!(result.content, "partial");
    }

    #[tokio::test]
    async fn test_empty_stream_resolves_with_empty_content() {
        let result = collect_signals(signals(vec![]), "c".to_string(), "m".to_string())
            .await
            .unwrap();
        assert_eq!(result.content, "");
    }

    #[tokio::test]
    async fn test_signals_after_done_are_ignored() {
        let result = collect_signals(
            signals(vec![
                text("a"),
                Ok(UpstreamSignal::StreamEnd),
                text("b"),
                Ok(UpstreamSignal::Malformed("x".to_string())),
            ]),
            "c".to_string(),
            "m".to_string(),
        )
        .await
        .unwrap();
        assert_eq!(result.content, "a");
    }

    #[tokio::test]
    async fn test_malformed_rejects_with_protocol_error() {
        let err = collect_signals(
            signals(vec![
                text("Hel"),
                Ok(UpstreamSignal::Malformed("{oops".to_string())),
                text("lo"),
            ]),
            "c".to_string(),
            "m".to_string(),
        )
        .await
        .unwrap_err();
        match err {
            BridgeError::UpstreamProtocol(raw) => assert_eq!(raw, "{oops"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_error_after_one_append_rejects() {
        let err = collect_signals(
            signals(vec![text("Hel"), Err(BridgeError::transport("connection reset"))]),
            "c".to_string(),
            "m".to_string(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::Transport { .. }));
    }

    #[test]
    fn test_collector_resolves_once() {
        let mut collector = AggregatingCollector::new_at("c", "m", 42);
        assert_eq!(
            collector.accept(UpstreamSignal::AppendText("x".into())).unwrap(),
            Flow::Continue
        );
        assert_eq!(collector.accept(UpstreamSignal::StreamEnd).unwrap(), Flow::Finished);
        assert_eq!(
            collector.accept(UpstreamSignal::AppendText("y".into())).unwrap(),
            Flow::Finished
        );
        let result = collector.finish().unwrap();
        assert_eq!(result.content, "x");
        assert_eq!(result.created, 42);
    }

    #[test]
    fn test_rejected_collector_has_no_result() {
        let mut collector = AggregatingCollector::new_at("c", "m", 1);
        collector.accept(UpstreamSignal::AppendText("x".into())).unwrap();
        assert!(collector
            .accept(UpstreamSignal::Malformed("bad".into()))
            .is_err());
        assert!(collector.finish().is_none());
    }
}
