//! SSE (Server-Sent Events) frame parser and byte-stream adapter.
//!
//! Handles the low-level parsing of SSE frames from a byte stream,
//! including buffering partial lines and handling field semantics per the
//! [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html).

use super::{SseEvent, SseEventKind};
use crate::error::BridgeError;
use futures_util::Stream;
use memchr::memchr_iter;
use smallvec::SmallVec;

struct PendingEvents {
    events: SmallVec<[SseEvent; 8]>,
    head: usize,
}

impl PendingEvents {
    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        let mut events = SmallVec::new();
        events.reserve(capacity);
        Self { events, head: 0 }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<SseEvent> {
        if self.head >= self.events.len() {
            return None;
        }
        let event = std::mem::take(&mut self.events[self.head]);
        self.head += 1;
        if self.head == self.events.len() {
            self.events.clear();
            self.head = 0;
        }
        Some(event)
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<SseEvent>) {
        if parsed.is_empty() {
            return;
        }
        self.events.reserve(parsed.len());
        self.events.extend(parsed.drain(..));
    }
}

// ---------------------------------------------------------------------------
// SseParser — incremental SSE line parser
// ---------------------------------------------------------------------------

/// Incremental SSE line parser.
///
/// Feed it raw text chunks (potentially arriving in arbitrary byte
/// boundaries) and it yields fully-assembled [`SseEvent`] frames.
/// One parser serves exactly one stream.
pub struct SseParser {
    buffer: String,
    read_offset: usize,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
    last_event_id: Option<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            event_type: None,
            data_buffer: String::new(),
            has_data: false,
            last_event_id: None,
        }
    }

    /// Feed raw text and return any complete events parsed.
    ///
    /// SSE rules:
    /// - Lines starting with `event:` set the event type for the next frame
    /// - Lines starting with `data:` append to the data buffer (strip one
    ///   leading space after the colon)
    /// - Empty lines terminate a frame — emit it and reset
    /// - Lines starting with `:` are comments, ignored
    /// - `id:` sets the last event ID
    /// - `retry:` with a numeric value is surfaced as a [`SseEventKind::Retry`] unit
    /// - Multiple `data:` lines are joined with `\n`
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(
                line,
                &mut self.event_type,
                &mut self.data_buffer,
                &mut self.has_data,
                &mut self.last_event_id,
                out,
            );
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    fn process_line(
        line: &str,
        event_type: &mut Option<String>,
        data_buffer: &mut String,
        has_data: &mut bool,
        last_event_id: &mut Option<String>,
        events: &mut Vec<SseEvent>,
    ) {
        if line.is_empty() {
            if *has_data {
                events.push(SseEvent {
                    kind: SseEventKind::Event,
                    event: event_type.take(),
                    data: std::mem::take(data_buffer),
                    id: last_event_id.clone(),
                });
                *has_data = false;
            } else {
                event_type.take();
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if *has_data {
                data_buffer.push('\n');
            } else {
                *has_data = true;
            }
            data_buffer.push_str(value);
        } else if let Some(value) = line.strip_prefix("event:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            *event_type = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if !value.contains('\0') {
                *last_event_id = Some(value.to_string());
            }
        } else if let Some(value) = line.strip_prefix("retry:") {
            let value = value.trim();
            if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                events.push(SseEvent {
                    kind: SseEventKind::Retry,
                    event: None,
                    data: value.to_string(),
                    id: None,
                });
            }
        }
        // Unknown field names are ignored
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode `bytes` as UTF-8 into the parser, holding back an incomplete
/// trailing sequence in `remainder` until the next chunk completes it.
fn feed_utf8_chunk(
    parser: &mut SseParser,
    remainder: &mut Vec<u8>,
    bytes: &[u8],
    out: &mut Vec<SseEvent>,
) {
    if remainder.is_empty() {
        if let Ok(text) = std::str::from_utf8(bytes) {
            parser.feed_into(text, out);
            return;
        }
    }
    remainder.extend_from_slice(bytes);

    let mut consumed = 0usize;
    loop {
        match std::str::from_utf8(&remainder[consumed..]) {
            Ok(text) => {
                parser.feed_into(text, out);
                consumed = remainder.len();
                break;
            }
            Err(e) => {
                let valid_end = consumed + e.valid_up_to();
                let text = std::str::from_utf8(&remainder[consumed..valid_end]).unwrap_or_default();
                parser.feed_into(text, out);
                if let Some(invalid_len) = e.error_len() {
                    parser.feed_into("\u{FFFD}", out);
                    consumed = valid_end + invalid_len;
                } else {
                    consumed = valid_end;
                    break;
                }
            }
        }
    }
    remainder.drain(..consumed);
}

// ---------------------------------------------------------------------------
// Stream utility
// ---------------------------------------------------------------------------

/// Split a byte stream into SSE events using [`SseParser`].
///
/// Bytes arriving from an HTTP response body are decoded as UTF-8,
/// fed into the parser, and complete [`SseEvent`] frames are yielded in
/// arrival order. A transport error is yielded once and ends the stream.
/// A trailing record that was never terminated by a blank line is discarded.
pub fn sse_event_stream<S, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<SseEvent, BridgeError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Into<BridgeError> + Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            SseParser::new(),
            Vec::<u8>::new(),
            Vec::<SseEvent>::with_capacity(8),
            PendingEvents::with_capacity(8),
            false,
        ),
        |(mut stream, mut parser, mut remainder, mut parsed, mut pending, mut ended)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((
                        Ok(event),
                        (stream, parser, remainder, parsed, pending, ended),
                    ));
                }
                if ended {
                    return None;
                }

                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => {
                        feed_utf8_chunk(&mut parser, &mut remainder, &bytes, &mut parsed);
                        pending.extend_from_vec(&mut parsed);
                    }
                    Some(Err(err)) => {
                        ended = true;
                        return Some((
                            Err(err.into()),
                            (stream, parser, remainder, parsed, pending, ended),
                        ));
                    }
                    None => ended = true,
                }
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
