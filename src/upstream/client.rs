use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::cookie::build_cookie_header;
use super::scrape::TokenScraper;
use super::token_cache::TokenCache;
use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::BridgeError;
use crate::util::sanitize_upstream_error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// An authenticated conversation on the search service.
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub conversation_id: String,
    cookie: String,
}

impl SearchSession {
    #[must_use]
    pub fn cookie(&self) -> &str {
        &self.cookie
    }
}

#[derive(Deserialize)]
struct ConversationCreated {
    #[serde(alias = "conversationId")]
    id: String,
}

#[derive(Serialize)]
struct ChatTurn<'a> {
    #[serde(rename = "conversationId")]
    conversation_id: &'a str,
    message: &'a str,
    model: &'a str,
}

/// HTTP client for the conversational search service.
pub struct SearchClient {
    http: reqwest::Client,
    home_url: String,
    conversation_url: String,
    chat_url: String,
    scraper: TokenScraper,
    cookie_name: String,
    extra_cookies: Vec<String>,
}

fn build_reqwest_client(
    server: &ServerConfig,
    upstream: &UpstreamConfig,
) -> Result<reqwest::Client, BridgeError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(server.http_pool_max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(server.http_pool_idle_timeout_secs))
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(Duration::from_secs(server.timeout))
        .user_agent(upstream.user_agent.as_str());

    if let Some(proxy_url) = upstream.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| BridgeError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !server.http_use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| BridgeError::Config(format!("Failed to build HTTP client: {err}")))
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

fn is_auth_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
}

impl SearchClient {
    pub fn new(server: &ServerConfig, upstream: &UpstreamConfig) -> Result<Self, BridgeError> {
        Ok(Self {
            http: build_reqwest_client(server, upstream)?,
            home_url: join_url(&upstream.base_url, &upstream.home_path),
            conversation_url: join_url(&upstream.base_url, &upstream.conversation_path),
            chat_url: join_url(&upstream.base_url, &upstream.chat_path),
            scraper: TokenScraper::new(&upstream.token_pattern)?,
            cookie_name: upstream.cookie_name.clone(),
            extra_cookies: upstream.extra_cookies.clone(),
        })
    }

    /// Obtain a session token (cached or scraped) and open a conversation.
    ///
    /// Every failure is reported as `UpstreamAuth`. A 401/403 from the
    /// conversation endpoint also drops the cached token so the next call
    /// scrapes a fresh one.
    pub async fn acquire(&self, cache: &dyn TokenCache) -> Result<SearchSession, BridgeError> {
        let token = if let Some(token) = cache.get() {
            token
        } else {
            let token = self.scrape_token().await?;
            cache.put(token.clone());
            token
        };

        let cookie = build_cookie_header(&self.cookie_name, &token, &self.extra_cookies);
        let response = self
            .http
            .post(&self.conversation_url)
            .header(http::header::COOKIE, cookie.as_str())
            .header(http::header::ACCEPT, "application/json")
            .json(&serde_json::Map::new())
            .send()
            .await
            .map_err(|err| BridgeError::UpstreamAuth(format!("conversation request failed: {err}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| BridgeError::UpstreamAuth(format!("conversation response failed: {err}")))?;

        if !status.is_success() {
            if is_auth_status(status) {
                warn!(status = status.as_u16(), "session token rejected, invalidating cache");
                cache.invalidate();
            }
            return Err(BridgeError::UpstreamAuth(format!(
                "conversation endpoint returned {}: {}",
                status.as_u16(),
                sanitize_upstream_error(&body)
            )));
        }

        let created: ConversationCreated = serde_json::from_slice(&body).map_err(|err| {
            BridgeError::UpstreamAuth(format!("conversation response is not valid JSON: {err}"))
        })?;
        if created.id.trim().is_empty() {
            return Err(BridgeError::UpstreamAuth(
                "conversation response carried an empty id".to_string(),
            ));
        }
        debug!(conversation_id = %created.id, "conversation created");

        Ok(SearchSession {
            conversation_id: created.id,
            cookie,
        })
    }

    async fn scrape_token(&self) -> Result<String, BridgeError> {
        let response = self
            .http
            .get(&self.home_url)
            .header(http::header::ACCEPT, "text/html")
            .send()
            .await
            .map_err(|err| BridgeError::UpstreamAuth(format!("home page request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::UpstreamAuth(format!(
                "home page returned status {}",
                status.as_u16()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|err| BridgeError::UpstreamAuth(format!("home page read failed: {err}")))?;
        let token = self.scraper.extract(&html).ok_or_else(|| {
            BridgeError::UpstreamAuth("session token not found in home page".to_string())
        })?;
        debug!(token_len = token.len(), "session token scraped");
        Ok(token.to_string())
    }

    /// Send one chat turn and return the upstream SSE byte stream.
    pub async fn open_stream(
        &self,
        session: &SearchSession,
        prompt: &str,
        upstream_model: &str,
    ) -> Result<impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static, BridgeError>
    {
        let response = self
            .http
            .post(&self.chat_url)
            .header(http::header::COOKIE, session.cookie())
            .header(http::header::ACCEPT, "text/event-stream")
            .json(&ChatTurn {
                conversation_id: &session.conversation_id,
                message: prompt,
                model: upstream_model,
            })
            .send()
            .await
            .map_err(|err| BridgeError::from_reqwest("chat request failed", &err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(BridgeError::Upstream {
                status: status.as_u16(),
                message: sanitize_upstream_error(&body),
            });
        }

        Ok(response.bytes_stream())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_strips_trailing_slash() {
        assert_eq!(
            join_url("https://search.example/", "/api/chat"),
            "https://search.example/api/chat"
        );
        assert_eq!(join_url("http://127.0.0.1:9", "/"), "http://127.0.0.1:9/");
    }

    #[test]
    fn test_conversation_id_alias() {
        let a: ConversationCreated = serde_json::from_str(r#"{"id":"c1"}"#).unwrap();
        let b: ConversationCreated =
            serde_json::from_str(r#"{"conversationId":"c2","title":null}"#).unwrap();
        assert_eq!(a.id, "c1");
        assert_eq!(b.id, "c2");
    }

    #[test]
    fn test_chat_turn_wire_shape() {
        let body = serde_json::to_value(ChatTurn {
            conversation_id: "c1",
            message: "hi",
            model: "pro",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"conversationId": "c1", "message": "hi", "model": "pro"})
        );
    }

    #[test]
    fn test_client_rejects_bad_token_pattern() {
        let mut upstream = UpstreamConfig::with_base_url("http://127.0.0.1:1");
        upstream.token_pattern = "no-group".to_string();
        assert!(SearchClient::new(&ServerConfig::default(), &upstream).is_err());
    }
}
