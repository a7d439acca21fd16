/// Build the `Cookie` header value: `{name}={token}` followed by the
/// configured extra cookies, separated by `; `.
#[must_use]
pub fn build_cookie_header(cookie_name: &str, token: &str, extra_cookies: &[String]) -> String {
    let mut header = String::with_capacity(
        cookie_name.len() + token.len() + 1 + extra_cookies.iter().map(|c| c.len() + 2).sum::<usize>(),
    );
    header.push_str(cookie_name);
    header.push('=');
    header.push_str(token);
    for extra in extra_cookies {
        let extra = extra.trim().trim_end_matches(';');
        if extra.is_empty() {
            continue;
        }
        header.push_str("; ");
        header.push_str(extra);
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_only() {
        assert_eq!(
            build_cookie_header("session-token", "abc", &[]),
            "session-token=abc"
        );
    }

    #[test]
    fn test_extra_cookies_are_appended() {
        let extras = vec!["theme=dark".to_string(), " region=eu; ".to_string(), String::new()];
        assert_eq!(
            build_cookie_header("sid", "t", &extras),
            "sid=t; theme=dark; region=eu"
        );
    }
}
