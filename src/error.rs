use serde_json::json;

/// Error type shared by every layer of the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream authentication failed: {0}")]
    UpstreamAuth(String),
    #[error("Upstream protocol error: malformed event payload {0:?}")]
    UpstreamProtocol(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {message}")]
    Transport { message: String, timeout: bool },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        BridgeError::Transport {
            message: message.into(),
            timeout: false,
        }
    }

    /// Wrap a reqwest failure, keeping track of whether the client deadline fired.
    #[must_use]
    pub fn from_reqwest(context: &str, err: &reqwest::Error) -> Self {
        BridgeError::Transport {
            message: format!("{context}: {err}"),
            timeout: err.is_timeout(),
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            BridgeError::Auth(_) => ErrorCategory::Authentication,
            BridgeError::UpstreamAuth(_) | BridgeError::UpstreamProtocol(_) => {
                ErrorCategory::BadGateway
            }
            BridgeError::Transport { timeout: true, .. } => ErrorCategory::GatewayTimeout,
            BridgeError::Transport { .. } => ErrorCategory::BadGateway,
            BridgeError::Upstream { status, .. } => category_from_upstream_status(*status),
            BridgeError::Config(_) | BridgeError::Internal(_) => ErrorCategory::ServerError,
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::from_reqwest("upstream stream failed", &err)
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Transport {
            timeout: err.kind() == std::io::ErrorKind::TimedOut,
            message: err.to_string(),
        }
    }
}

impl From<std::convert::Infallible> for BridgeError {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    BadGateway,
    GatewayTimeout,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::BadGateway,
        _ => ErrorCategory::Unknown,
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::BadGateway => http::StatusCode::BAD_GATEWAY,
        ErrorCategory::GatewayTimeout => http::StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::ServerError | ErrorCategory::Unknown => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn openai_error_type(cat: ErrorCategory) -> (&'static str, &'static str) {
    match cat {
        ErrorCategory::InvalidRequest => ("invalid_request_error", "invalid_request"),
        ErrorCategory::Authentication => ("authentication_error", "invalid_api_key"),
        ErrorCategory::Permission => ("permission_error", "permission_denied"),
        ErrorCategory::RateLimit => ("rate_limit_error", "rate_limit_exceeded"),
        ErrorCategory::BadGateway => ("upstream_error", "bad_gateway"),
        ErrorCategory::GatewayTimeout => ("upstream_error", "upstream_timeout"),
        ErrorCategory::ServerError | ErrorCategory::Unknown => ("server_error", "internal_error"),
    }
}

/// Format an error as (`status_code`, OpenAI-shaped JSON body).
#[must_use]
pub fn format_error(err: &BridgeError) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let (error_type, code) = openai_error_type(cat);
    let body = json!({
        "error": {
            "message": err.to_string(),
            "type": error_type,
            "code": code,
        }
    });
    (http_status_for_category(cat), body)
}

impl axum::response::IntoResponse for BridgeError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_and_protocol_errors_are_bad_gateway() {
        let (status, body) = format_error(&BridgeError::UpstreamAuth("no token".into()));
        assert_eq!(status, http::StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["type"], "upstream_error");

        let (status, _) = format_error(&BridgeError::UpstreamProtocol("{oops".into()));
        assert_eq!(status, http::StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_transport_timeout_maps_to_gateway_timeout() {
        let err = BridgeError::Transport {
            message: "deadline".into(),
            timeout: true,
        };
        assert_eq!(format_error(&err).0, http::StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            format_error(&BridgeError::transport("reset")).0,
            http::StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_upstream_status_categories() {
        assert_eq!(category_from_upstream_status(429), ErrorCategory::RateLimit);
        assert_eq!(category_from_upstream_status(503), ErrorCategory::BadGateway);
        assert_eq!(category_from_upstream_status(418), ErrorCategory::Unknown);
    }

    #[test]
    fn test_error_message_is_forwarded() {
        let (status, body) = format_error(&BridgeError::InvalidRequest("messages empty".into()));
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["message"],
            "Invalid request: messages empty"
        );
    }
}
