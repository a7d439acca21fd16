mod request_id;

use std::sync::Arc;

use bytes::Bytes;

use crate::auth::{authenticate, AllowedClientKeys};
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::routing::ModelCatalog;
use crate::upstream::{SearchClient, TokenCache, TtlTokenCache};

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub client: SearchClient,
    pub catalog: ModelCatalog,
    token_cache: Arc<dyn TokenCache>,
    infra: InfraState,
}

struct InfraState {
    allowed_client_keys: AllowedClientKeys,
    request_ids: RequestIdGenerator,
    models_response_body: Bytes,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, client: SearchClient, token_cache: Arc<dyn TokenCache>) -> Self {
        let catalog = ModelCatalog::new(&config.models);
        let allowed_client_keys = AllowedClientKeys::from_config(&config.client_authentication);
        let models_response_body = build_models_response_body(&catalog);
        Self {
            config,
            client,
            catalog,
            token_cache,
            infra: InfraState {
                allowed_client_keys,
                request_ids: RequestIdGenerator::new(),
                models_response_body,
            },
        }
    }

    /// Build the state with the default TTL token cache.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` when the upstream HTTP client cannot be
    /// built from the configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, BridgeError> {
        let client = SearchClient::new(&config.server, &config.upstream)?;
        let token_cache: Arc<dyn TokenCache> =
            Arc::new(TtlTokenCache::new(config.upstream.token_ttl_secs));
        Ok(Self::new(config, client, token_cache))
    }

    /// Authenticate a client request using the prebuilt key index.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Auth` when the API key is missing or invalid.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), BridgeError> {
        authenticate(headers, &self.infra.allowed_client_keys)
    }

    #[must_use]
    pub fn token_cache(&self) -> &dyn TokenCache {
        self.token_cache.as_ref()
    }

    #[must_use]
    pub fn next_request_id(&self) -> String {
        self.infra.request_ids.next_id()
    }

    #[must_use]
    pub fn models_response_body(&self) -> Bytes {
        self.infra.models_response_body.clone()
    }
}

fn build_models_response_body(catalog: &ModelCatalog) -> Bytes {
    let models: Vec<serde_json::Value> = catalog
        .visible_models()
        .map(|id| {
            serde_json::json!({
                "id": id,
                "object": "model",
                "created": 1_677_610_602,
                "owned_by": "searchbridge",
                "permission": [],
                "root": id,
                "parent": null,
            })
        })
        .collect();

    let payload = serde_json::json!({
        "object": "list",
        "data": models,
    });
    serde_json::to_vec(&payload).map_or_else(
        |_| Bytes::from_static(br#"{"object":"list","data":[]}"#),
        Bytes::from,
    )
}
