//! Token-exchange client: cache, single-flight, and response normalization.
//!
//! This sits between the reactive wrappers and the [`TokenExchange`]
//! transport. Responsibilities:
//!
//! - **Cache first**: an audience that already has a token in the session
//!   store resolves immediately without a network call, making the operation
//!   idempotent per audience.
//! - **Single-flight**: concurrent fetches for the same audience collapse
//!   into one exchange; late arrivals observe the winner's cached token.
//! - **Normalization**: both response forms (single `access_token`, and
//!   audience → token maps) resolve to `{requested_audience: token}`. A
//!   multi-token response is merged into the store in full, so a later fetch
//!   for a sibling audience is a cache hit.
//! - **Superseded-write protection**: a generation counter, bumped by
//!   [`ApiTokenClient::invalidate`] when the session ends, keeps a stale
//!   in-flight resolution from repopulating the shared token map.

use crate::error::FetchError;
use crate::providers::{ApiTokenRequest, TokenExchange, TokenResponse};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokenbroker_core::state::TokenMap;
use tokenbroker_core::store::SessionStore;

/// Broker for audience-scoped API tokens.
pub struct ApiTokenClient {
    store: Arc<SessionStore>,
    exchange: Arc<dyn TokenExchange>,
    flights: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    generation: AtomicU64,
}

impl ApiTokenClient {
    /// Create a broker writing into `store` and fetching through `exchange`.
    #[must_use]
    pub fn new(store: Arc<SessionStore>, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            store,
            exchange,
            flights: tokio::sync::Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Fetch the API token for `request.audience`.
    ///
    /// Returns `{requested_audience: token}` regardless of which response
    /// form the endpoint used. On success the store's token map has been
    /// updated before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] for transport, HTTP, and body failures, and
    /// [`FetchError::MissingAudience`] when a multi-token response carries
    /// no entry for the requested audience.
    pub async fn fetch(&self, request: ApiTokenRequest) -> Result<TokenMap, FetchError> {
        if let Some(token) = self.store.api_token(&request.audience) {
            tracing::debug!(audience = %request.audience, "api token cache hit");
            return Ok(single_entry(&request.audience, token));
        }

        // One exchange per audience at a time. The guard map entry is shared
        // by every concurrent caller for this audience.
        let flight = {
            let mut flights = self.flights.lock().await;
            Arc::clone(flights.entry(request.audience.clone()).or_default())
        };
        let _guard = flight.lock().await;

        // A caller that waited on the guard finds the winner's token here.
        if let Some(token) = self.store.api_token(&request.audience) {
            return Ok(single_entry(&request.audience, token));
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let response = self.exchange.fetch_token(&request).await?;

        let mut merged = match response {
            TokenResponse::Single { access_token } => {
                single_entry(&request.audience, access_token)
            }
            TokenResponse::Many(map) => map,
        };
        let Some(resolved) = merged.get(&request.audience).cloned() else {
            return Err(FetchError::MissingAudience {
                audience: request.audience,
            });
        };

        if self.generation.load(Ordering::SeqCst) == generation {
            self.store.add_api_tokens(&merged);
        } else {
            // The session ended while the exchange was in flight; the result
            // must not outlive it in the shared map.
            tracing::debug!(
                audience = %request.audience,
                "discarding token resolved for a superseded session"
            );
        }

        merged.clear();
        merged.insert(request.audience, resolved);
        Ok(merged)
    }

    /// Mark every in-flight exchange as superseded.
    ///
    /// Called when the session transitions to unauthorized; exchanges that
    /// resolve afterwards do not write the store.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

fn single_entry(audience: &str, token: String) -> TokenMap {
    let mut map = TokenMap::new();
    map.insert(audience.to_string(), token);
    map
}
