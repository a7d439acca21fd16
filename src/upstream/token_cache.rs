use parking_lot::RwLock;

use crate::util::unix_now_secs;

/// Storage for the scraped session token.
///
/// Injected into the application state so tests and embedders can supply
/// their own (for example a pre-seeded token).
pub trait TokenCache: Send + Sync {
    /// A token that is still considered valid, if any.
    fn get(&self) -> Option<String>;
    fn put(&self, token: String);
    /// Forget the current token, e.g. after the upstream rejected it.
    fn invalidate(&self);
}

struct CachedToken {
    token: String,
    expires_at_unix: u64,
}

/// Single-slot token cache with a fixed time-to-live. A TTL of zero disables
/// caching entirely.
pub struct TtlTokenCache {
    ttl_secs: u64,
    slot: RwLock<Option<CachedToken>>,
}

impl TtlTokenCache {
    #[must_use]
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            slot: RwLock::new(None),
        }
    }

    fn get_at(&self, now: u64) -> Option<String> {
        let slot = self.slot.read();
        let cached = slot.as_ref()?;
        if now >= cached.expires_at_unix {
            return None;
        }
        Some(cached.token.clone())
    }

    fn put_at(&self, token: String, now: u64) {
        if self.ttl_secs == 0 {
            return;
        }
        *self.slot.write() = Some(CachedToken {
            token,
            expires_at_unix: now.saturating_add(self.ttl_secs),
        });
    }
}

impl TokenCache for TtlTokenCache {
    fn get(&self) -> Option<String> {
        self.get_at(unix_now_secs())
    }

    fn put(&self, token: String) {
        self.put_at(token, unix_now_secs());
    }

    fn invalidate(&self) {
        *self.slot.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expires_after_ttl() {
        let cache = TtlTokenCache::new(60);
        cache.put_at("tok".to_string(), 1_000);
        assert_eq!(cache.get_at(1_000).as_deref(), Some("tok"));
        assert_eq!(cache.get_at(1_059).as_deref(), Some("tok"));
        assert_eq!(cache.get_at(1_060), None);
    }

    #[test]
    fn test_invalidate_clears_token() {
        let cache = TtlTokenCache::new(60);
        cache.put("tok".to_string());
        assert_eq!(cache.get().as_deref(), Some("tok"));
        cache.invalidate();
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn test_zero_ttl_never_caches() {
        let cache = TtlTokenCache::new(0);
        cache.put("tok".to_string());
        assert_eq!(cache.get(), None);
    }
}
