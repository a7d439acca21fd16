use regex_lite::Regex;

use crate::error::BridgeError;

/// Compiled extractor for the session token embedded in the home page HTML.
#[derive(Debug, Clone)]
pub struct TokenScraper {
    pattern: Regex,
}

impl TokenScraper {
    pub fn new(pattern: &str) -> Result<Self, BridgeError> {
        let pattern = Regex::new(pattern)
            .map_err(|err| BridgeError::Config(format!("invalid upstream.token_pattern: {err}")))?;
        if pattern.captures_len() < 2 {
            return Err(BridgeError::Config(
                "upstream.token_pattern needs a capture group".to_string(),
            ));
        }
        Ok(Self { pattern })
    }

    /// First non-empty capture of the pattern in `html`.
    #[must_use]
    pub fn extract<'h>(&self, html: &'h str) -> Option<&'h str> {
        self.pattern
            .captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .find(|token| !token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_PATTERN: &str = r#""sessionToken"\s*:\s*"([^"]+)""#;

    #[test]
    fn test_extracts_token_from_inline_script() {
        let scraper = TokenScraper::new(DEFAULT_PATTERN).unwrap();
        let html = r#"<html><script>window.__STATE__ = {"user":null,"sessionToken" : "abc.DEF-123"};</script></html>"#;
        assert_eq!(scraper.extract(html), Some("abc.DEF-123"));
    }

    #[test]
    fn test_missing_token_is_none() {
        let scraper = TokenScraper::new(DEFAULT_PATTERN).unwrap();
        assert_eq!(scraper.extract("<html><body>login</body></html>"), None);
    }

    #[test]
    fn test_custom_pattern() {
        let scraper = TokenScraper::new(r#"name="csrf" content="([^"]*)""#).unwrap();
        let html = r#"<meta name="csrf" content=""><meta name="csrf" content="t0k">"#;
        assert_eq!(scraper.extract(html), Some("t0k"));
    }

    #[test]
    fn test_pattern_without_group_is_rejected() {
        assert!(matches!(
            TokenScraper::new("sessionToken"),
            Err(BridgeError::Config(_))
        ));
        assert!(TokenScraper::new("(unclosed").is_err());
    }
}
