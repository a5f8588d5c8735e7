//! Provider trait seams.
//!
//! The engine does not implement the OIDC/OAuth2 protocol itself. Two traits
//! mark its external boundaries:
//!
//! - [`LoginProvider`]: the identity-provider client that owns redirect and
//!   callback mechanics, renewal timers, and the primary tokens. The engine
//!   consumes its operations and its event surface ([`ProviderEvent`]).
//! - [`TokenExchange`]: the transport that turns a primary access token into
//!   audience-scoped API tokens. [`HttpTokenExchange`] is the production
//!   implementation; tests use the scripted mock from the `mocks` module.
//!
//! Both traits return boxed futures so they can be used as trait objects
//! (`Arc<dyn LoginProvider>`), keeping the wiring free of generic parameters.

mod http_exchange;

pub use http_exchange::HttpTokenExchange;

use crate::error::FetchError;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokenbroker_core::state::UserProfile;

/// Boxed future returned by provider trait methods.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure reported by the identity-provider client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Human-readable description.
    pub message: String,
}

impl ProviderError {
    /// Create a provider error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Identity-provider client boundary.
///
/// Implementations wrap a concrete OIDC/OAuth2 client library. The engine
/// only drives these operations and reads the user snapshot; protocol
/// mechanics stay on the implementation's side of the seam.
pub trait LoginProvider: Send + Sync {
    /// Initialize the provider: restore an existing session or complete a
    /// login callback.
    ///
    /// Resolves with the user profile when a session exists, `None` when
    /// initialization finished without one.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when initialization fails outright.
    fn init(&self) -> ProviderFuture<'_, Result<Option<UserProfile>, ProviderError>>;

    /// Start an interactive login.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the login cannot be started.
    fn login(&self) -> ProviderFuture<'_, Result<(), ProviderError>>;

    /// End the session at the provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the logout cannot be started.
    fn logout(&self) -> ProviderFuture<'_, Result<(), ProviderError>>;

    /// Snapshot of the current user profile, if a session exists.
    fn user(&self) -> Option<UserProfile>;

    /// Current primary access token, if a session exists.
    fn access_token(&self) -> Option<String>;
}

/// Event pushed by the identity-provider client.
///
/// Applications forward these into
/// [`SessionClient::handle_provider_event`](crate::session::SessionClient::handle_provider_event),
/// which maps each one to a session-store transition or error.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// A user profile was loaded (initial login or silent renewal).
    UserLoaded {
        /// The loaded profile.
        profile: UserProfile,
        /// The primary access token accompanying it.
        access_token: String,
    },

    /// The provider dropped its user (local session removal).
    UserUnloaded,

    /// The user signed out at the provider.
    UserSignedOut,

    /// The provider's session changed underneath the client.
    UserSessionChanged,

    /// The primary access token expired.
    AccessTokenExpired,

    /// The primary access token is about to expire.
    AccessTokenExpiring,

    /// A silent renewal attempt failed.
    SilentRenewError {
        /// Failure description from the provider.
        message: String,
    },
}

/// Parameters of one token-exchange request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTokenRequest {
    /// Token-exchange endpoint URI.
    pub uri: String,

    /// Primary access token presented as the bearer credential.
    pub access_token: String,

    /// Audience the API token should be scoped to.
    pub audience: String,

    /// Optional `grant_type` form field. `None` means the field is not
    /// emitted at all.
    pub grant_type: Option<String>,

    /// Optional `permission` form field. `None` means the field is not
    /// emitted at all.
    pub permission: Option<String>,
}

/// Decoded body of a successful token-exchange response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenResponse {
    /// Single-token form: `{"access_token": "..."}`. The token is scoped to
    /// the requested audience.
    Single {
        /// The issued token.
        access_token: String,
    },

    /// Multi-token form: a map of audience → token pairs.
    Many(HashMap<String, String>),
}

impl TokenResponse {
    /// Decode a JSON value into a token response.
    ///
    /// An object with a string `access_token` member is the single-token
    /// form. Any other object is treated as the multi-token form; members
    /// whose values are not strings are skipped. Non-object values decode to
    /// an empty multi-token response (the caller surfaces that as a missing
    /// audience).
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        if let Some(token) = value.get("access_token").and_then(|v| v.as_str()) {
            return Self::Single {
                access_token: token.to_string(),
            };
        }
        let map = value
            .as_object()
            .map(|object| {
                object
                    .iter()
                    .filter_map(|(audience, token)| {
                        token
                            .as_str()
                            .map(|token| (audience.clone(), token.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self::Many(map)
    }
}

/// Token-exchange transport boundary.
///
/// Implementations perform exactly one exchange request; caching,
/// single-flight collapsing, and store write-back live above this seam in
/// [`ApiTokenClient`](crate::token_client::ApiTokenClient).
pub trait TokenExchange: Send + Sync {
    /// Perform one token-exchange request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] for transport failures, non-success HTTP
    /// statuses, and unparseable bodies.
    fn fetch_token(
        &self,
        request: &ApiTokenRequest,
    ) -> ProviderFuture<'_, Result<TokenResponse, FetchError>>;
}
