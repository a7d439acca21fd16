use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let filter = EnvFilter::try_new(tracing_level(&level)).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn tracing_level(level: &str) -> &str {
    match level {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    }
}

/// How an upstream stream ended, as seen by one of the consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// `[DONE]` observed or the transport closed normally.
    Clean,
    /// A payload could not be decoded.
    Malformed,
    /// The transport failed mid-stream.
    TransportError,
}

impl StreamOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StreamOutcome::Clean => "clean",
            StreamOutcome::Malformed => "malformed",
            StreamOutcome::TransportError => "transport_error",
        }
    }
}

/// Log the end of one upstream stream with the amount of text relayed.
pub fn log_stream_complete(
    conversation_id: &str,
    model: &str,
    outcome: StreamOutcome,
    text_bytes: usize,
    elapsed: Duration,
) {
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    if outcome == StreamOutcome::Clean {
        info!(
            conversation_id,
            model,
            outcome = outcome.as_str(),
            text_bytes,
            elapsed_ms,
            "upstream stream complete"
        );
    } else {
        warn!(
            conversation_id,
            model,
            outcome = outcome.as_str(),
            text_bytes,
            elapsed_ms,
            "upstream stream ended early"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_levels_map_to_tracing_levels() {
        assert_eq!(tracing_level("WARNING"), "WARN");
        assert_eq!(tracing_level("CRITICAL"), "ERROR");
        assert_eq!(tracing_level("DEBUG"), "DEBUG");
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(StreamOutcome::Clean.as_str(), "clean");
        assert_eq!(StreamOutcome::TransportError.as_str(), "transport_error");
    }
}
