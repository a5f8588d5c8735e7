//! # Tokenbroker Client
//!
//! Client-side session and token-lifecycle engine: tracks authentication
//! status, brokers audience-scoped API access tokens by token exchange, and
//! exposes both through a small set of reactive read/fetch primitives.
//!
//! ## Architecture
//!
//! ```text
//! identity provider ──events──▶ SessionClient ──▶ SessionStore (status/user/events)
//!                                     │
//!                                     ▼ on demand
//!                              ApiTokenClient ──▶ token-exchange endpoint
//!                                     │
//!                                     ▼
//!                              ApiTokenWatcher (reactive status per audience)
//!                                     │
//!                                     ▼
//!                              AuthorizedRequests ──▶ application request fn
//! ```
//!
//! The OIDC/OAuth2 protocol itself (redirects, PKCE, renewal timers) stays
//! behind the [`providers::LoginProvider`] seam; this crate consumes its
//! operations and events only.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokenbroker_client::config::SessionConfig;
//! use tokenbroker_client::providers::HttpTokenExchange;
//! use tokenbroker_client::session::SessionClient;
//! # use tokenbroker_client::mocks::MockLoginProvider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SessionClient::new(
//!     SessionConfig::from_env("OIDC"),
//!     Arc::new(MockLoginProvider::new()),
//!     Arc::new(HttpTokenExchange::new()),
//! );
//! client.init().await?;
//!
//! let watcher = client.api_tokens("profile-api");
//! let _driver = watcher.spawn(); // fetches whenever the session allows
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod access_tokens;
pub mod config;
pub mod error;
pub mod providers;
pub mod requests;
pub mod session;
pub mod token_client;

#[cfg(feature = "test-utils")]
pub mod mocks;

// Re-export main types for convenience
pub use access_tokens::{ApiTokenWatcher, FetchStatus};
pub use config::SessionConfig;
pub use error::FetchError;
pub use requests::{AuthorizedRequest, AuthorizedRequestProps, AuthorizedRequests, RequestProps};
pub use session::SessionClient;
pub use token_client::ApiTokenClient;
