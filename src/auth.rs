use http::header::AUTHORIZATION;
use rustc_hash::FxHashSet;

use crate::config::ClientAuthConfig;
use crate::error::BridgeError;

/// Compact index of the configured client keys.
pub enum AllowedClientKeys {
    /// No keys configured: every request is accepted.
    Disabled,
    Single { bearer: Box<str> },
    Multiple(FxHashSet<String>),
}

impl AllowedClientKeys {
    #[must_use]
    pub fn from_config(config: &ClientAuthConfig) -> Self {
        let mut allowed_set: FxHashSet<String> = config
            .allowed_keys
            .iter()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
            .collect();

        match allowed_set.len() {
            0 => AllowedClientKeys::Disabled,
            1 => match allowed_set.drain().next() {
                Some(single_key) => AllowedClientKeys::Single {
                    bearer: format!("Bearer {single_key}").into_boxed_str(),
                },
                None => AllowedClientKeys::Disabled,
            },
            _ => AllowedClientKeys::Multiple(allowed_set),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, AllowedClientKeys::Disabled)
    }
}

/// Extract the key from `Authorization: Bearer <key>`.
///
/// # Errors
///
/// Returns `BridgeError::Auth` when the header is missing or not a bearer token.
pub fn extract_bearer_key(headers: &http::HeaderMap) -> Result<&str, BridgeError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| BridgeError::Auth("Missing API key".to_string()))
}

/// Check the request's bearer key against the allowed set.
///
/// # Errors
///
/// Returns `BridgeError::Auth` when the API key is missing or invalid.
pub fn authenticate(
    headers: &http::HeaderMap,
    allowed_keys: &AllowedClientKeys,
) -> Result<(), BridgeError> {
    match allowed_keys {
        AllowedClientKeys::Disabled => Ok(()),
        AllowedClientKeys::Single { bearer } => match headers.get(AUTHORIZATION) {
            Some(value) if value.as_bytes() == bearer.as_bytes() => Ok(()),
            Some(_) => Err(BridgeError::Auth("Invalid API key".to_string())),
            None => Err(BridgeError::Auth("Missing API key".to_string())),
        },
        AllowedClientKeys::Multiple(allowed_set) => {
            let client_key = extract_bearer_key(headers)?;
            if allowed_set.contains(client_key) {
                Ok(())
            } else {
                Err(BridgeError::Auth("Invalid API key".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> AllowedClientKeys {
        AllowedClientKeys::from_config(&ClientAuthConfig {
            allowed_keys: list.iter().map(|k| (*k).to_string()).collect(),
        })
    }

    fn bearer(key: &str) -> http::HeaderMap {
        let mut headers = http::HeaderMap::new();
        headers.insert("authorization", format!("Bearer {key}").parse().unwrap());
        headers
    }

    #[test]
    fn test_empty_key_list_disables_auth() {
        let allowed = keys(&[]);
        assert!(!allowed.is_enabled());
        assert!(authenticate(&http::HeaderMap::new(), &allowed).is_ok());
        assert!(!keys(&["  "]).is_enabled());
    }

    #[test]
    fn test_single_key() {
        let allowed = keys(&["sk-one"]);
        assert!(authenticate(&bearer("sk-one"), &allowed).is_ok());
        assert!(matches!(
            authenticate(&bearer("sk-two"), &allowed),
            Err(BridgeError::Auth(_))
        ));
        assert!(matches!(
            authenticate(&http::HeaderMap::new(), &allowed),
            Err(BridgeError::Auth(msg)) if msg == "Missing API key"
        ));
    }

    #[test]
    fn test_multiple_keys() {
        let allowed = keys(&["sk-one", "sk-two"]);
        assert!(authenticate(&bearer("sk-one"), &allowed).is_ok());
        assert!(authenticate(&bearer("sk-two"), &allowed).is_ok());
        assert!(authenticate(&bearer("sk-three"), &allowed).is_err());
    }

    #[test]
    fn test_non_bearer_scheme_is_missing_key() {
        let mut headers = http::HeaderMap::new();
        headers.insert("authorization", "Basic abc".parse().unwrap());
        let err = extract_bearer_key(&headers).unwrap_err();
        assert!(matches!(err, BridgeError::Auth(_)));
    }
}
