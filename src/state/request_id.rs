use std::sync::atomic::{AtomicU64, Ordering};

use crate::util::format_request_seq_hex;

/// Per-process request id source: a random starting point plus a counter,
/// so ids from concurrent instances rarely collide.
pub(crate) struct RequestIdGenerator {
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::starting_at(fastrand::u64(..) & 0x0000_ffff_ffff_0000)
    }

    #[must_use]
    pub(crate) fn starting_at(first: u64) -> Self {
        Self {
            counter: AtomicU64::new(first),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// `chatcmpl-<16 hex digits>`.
    #[must_use]
    pub(crate) fn next_id(&self) -> String {
        format_request_seq_hex("chatcmpl-", self.next_seq())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential_and_prefixed() {
        let ids = RequestIdGenerator::starting_at(0xff);
        assert_eq!(ids.next_id(), "chatcmpl-00000000000000ff");
        assert_eq!(ids.next_id(), "chatcmpl-0000000000000100");
    }

    #[test]
    fn test_random_start_is_unique_across_calls() {
        let ids = RequestIdGenerator::new();
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
