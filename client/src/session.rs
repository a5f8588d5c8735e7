//! Session client: glue between the identity provider and the state store.
//!
//! [`SessionClient`] owns the configuration, the [`SessionStore`], the
//! provider seam, and the token-exchange broker. It drives the status state
//! machine (`NONE → INITIALIZING → {AUTHORIZED, UNAUTHORIZED}`) from
//! provider operations and maps the provider's event surface onto store
//! transitions and errors.
//!
//! Clients are explicitly constructed and shared by `Arc` — two clients
//! never share state, so independent sessions (and tests) can coexist in
//! one process.

use crate::config::SessionConfig;
use crate::error::FetchError;
use crate::providers::{ApiTokenRequest, LoginProvider, ProviderEvent, TokenExchange};
use crate::token_client::ApiTokenClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokenbroker_core::error::ClientError;
use tokenbroker_core::events::{SessionEvent, SessionEventKind};
use tokenbroker_core::state::{SessionStatus, TokenMap, UserProfile};
use tokenbroker_core::store::SessionStore;

/// Client-side session and token-lifecycle engine.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tokenbroker_client::config::SessionConfig;
/// use tokenbroker_client::providers::HttpTokenExchange;
/// use tokenbroker_client::session::SessionClient;
/// # use tokenbroker_client::mocks::MockLoginProvider;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SessionConfig::from_env("OIDC");
/// let provider = Arc::new(MockLoginProvider::new());
/// let client = SessionClient::new(config, provider, Arc::new(HttpTokenExchange::new()));
///
/// client.init().await?;
/// if client.is_authenticated() {
///     let tokens = client.fetch_api_token("profile-api").await?;
///     println!("token: {}", tokens["profile-api"]);
/// }
/// # Ok(())
/// # }
/// ```
pub struct SessionClient {
    config: SessionConfig,
    store: Arc<SessionStore>,
    provider: Arc<dyn LoginProvider>,
    tokens: ApiTokenClient,
    access_token: Mutex<Option<String>>,
    logging_out: AtomicBool,
}

impl SessionClient {
    /// Create a client from a configuration and its two provider seams.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        provider: Arc<dyn LoginProvider>,
        exchange: Arc<dyn TokenExchange>,
    ) -> Arc<Self> {
        let store = Arc::new(SessionStore::new());
        Arc::new(Self {
            tokens: ApiTokenClient::new(Arc::clone(&store), exchange),
            config,
            store,
            provider,
            access_token: Mutex::new(None),
            logging_out: AtomicBool::new(false),
        })
    }

    /// The session state store owned by this client.
    #[must_use]
    pub const fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The configuration this client was built with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn lock_access_token(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        match self.access_token.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────

    /// Initialize the session: restore an existing provider session or
    /// complete a login callback.
    ///
    /// Drives `NONE → INITIALIZING → {AUTHORIZED, UNAUTHORIZED}`. Calling
    /// again after initialization returns the stored user without touching
    /// the provider.
    ///
    /// # Errors
    ///
    /// Returns an [`ClientErrorKind::Init`](tokenbroker_core::error::ClientErrorKind::Init)
    /// error when the configuration is unusable or the provider fails; the
    /// same error is stored and broadcast before returning.
    pub async fn init(&self) -> Result<Option<UserProfile>, ClientError> {
        if self.store.is_initialized() {
            return Ok(self.store.stored_user());
        }
        if !self.config.is_valid() {
            let error = ClientError::init("invalid client configuration");
            self.store.set_error(Some(error.clone()));
            self.store.set_status(SessionStatus::Unauthorized);
            return Err(error);
        }

        self.store.set_status(SessionStatus::Initializing);
        match self.provider.init().await {
            Ok(Some(profile)) => {
                *self.lock_access_token() = self.provider.access_token();
                self.store.set_stored_user(Some(profile.clone()));
                self.store.set_status(SessionStatus::Authorized);
                Ok(Some(profile))
            }
            Ok(None) => {
                self.store.set_status(SessionStatus::Unauthorized);
                Ok(None)
            }
            Err(provider_error) => {
                let error = ClientError::init(provider_error.message);
                self.store.set_error(Some(error.clone()));
                self.store.set_status(SessionStatus::Unauthorized);
                Err(error)
            }
        }
    }

    /// Return the stored user, `None` when initialization already finished
    /// without one, or run [`Self::init`] first.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::init`] errors when initialization runs.
    pub async fn get_or_load_user(&self) -> Result<Option<UserProfile>, ClientError> {
        if let Some(user) = self.store.stored_user() {
            return Ok(Some(user));
        }
        if self.store.is_initialized() {
            return Ok(None);
        }
        self.init().await
    }

    /// Start an interactive login at the provider.
    ///
    /// # Errors
    ///
    /// Returns an `Auth`-kind error when the provider refuses.
    pub async fn login(&self) -> Result<(), ClientError> {
        self.provider
            .login()
            .await
            .map_err(|e| ClientError::auth(e.message))
    }

    /// End the session: broadcast `LoggingOut`, delegate to the provider,
    /// and transition to `UNAUTHORIZED`.
    ///
    /// # Errors
    ///
    /// Returns an `Auth`-kind error when the provider refuses; the local
    /// session is terminated regardless.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.logging_out.store(true, Ordering::SeqCst);
        self.store
            .trigger(SessionEventKind::LoggingOut, SessionEvent::Empty);
        let result = self.provider.logout().await;
        self.on_auth_change(false);
        self.logging_out.store(false, Ordering::SeqCst);
        result.map_err(|e| ClientError::auth(e.message))
    }

    /// Drop the locally cached user and primary access token.
    pub fn clear_session(&self) {
        *self.lock_access_token() = None;
        self.store.set_stored_user(None);
    }

    /// Apply an authentication flip reported from outside the normal
    /// lifecycle.
    ///
    /// Returns `false` (and does nothing) when the flag already matches the
    /// current status. The unauthorized path clears the user and primary
    /// access token, invalidates in-flight exchanges, and fires
    /// `AuthorizationTerminated`; when the change was not initiated by
    /// [`Self::logout`], an `UnexpectedAuthChange` error is stored first.
    pub fn on_auth_change(&self, authenticated: bool) -> bool {
        if authenticated == self.store.is_authenticated() {
            return false;
        }
        if authenticated {
            self.store.set_status(SessionStatus::Authorized);
        } else {
            if !self.logging_out.load(Ordering::SeqCst) {
                self.store
                    .set_error(Some(ClientError::unexpected_auth_change(
                        "session ended without an explicit logout",
                    )));
            }
            *self.lock_access_token() = None;
            self.store.set_stored_user(None);
            self.tokens.invalidate();
            self.store.set_status(SessionStatus::Unauthorized);
            self.store.trigger(
                SessionEventKind::AuthorizationTerminated,
                SessionEvent::Empty,
            );
        }
        true
    }

    /// Map one provider event onto the session store.
    pub fn handle_provider_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::UserLoaded {
                profile,
                access_token,
            } => {
                *self.lock_access_token() = Some(access_token);
                self.store.set_stored_user(Some(profile.clone()));
                self.store.trigger(
                    SessionEventKind::UserChanged,
                    SessionEvent::User(Some(profile)),
                );
            }
            ProviderEvent::UserUnloaded
            | ProviderEvent::UserSignedOut
            | ProviderEvent::UserSessionChanged => {
                self.on_auth_change(false);
            }
            ProviderEvent::AccessTokenExpired => {
                self.store
                    .trigger(SessionEventKind::TokenExpired, SessionEvent::Empty);
            }
            ProviderEvent::AccessTokenExpiring => {
                self.store
                    .trigger(SessionEventKind::TokenExpiring, SessionEvent::Empty);
            }
            ProviderEvent::SilentRenewError { message } => {
                self.store
                    .set_error(Some(ClientError::auth_refresh(message)));
            }
        }
    }

    // ─── Accessors ─────────────────────────────────────────────────────

    /// Current session status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.store.status()
    }

    /// Last stored session-level error.
    #[must_use]
    pub fn error(&self) -> Option<ClientError> {
        self.store.error()
    }

    /// Whether a session is currently authorized.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    /// Whether initialization has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.store.is_initialized()
    }

    /// Cached user profile.
    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.store.stored_user()
    }

    /// Current primary access token, if held.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.lock_access_token().clone()
    }

    // ─── Token exchange ────────────────────────────────────────────────

    /// Exchange the primary access token for an API token scoped to
    /// `audience`.
    ///
    /// Cached audiences resolve without a network call; see
    /// [`ApiTokenClient`] for the full semantics.
    ///
    /// # Errors
    ///
    /// [`FetchError::Unauthorized`] when no primary access token is held;
    /// otherwise any [`FetchError`] from the exchange.
    pub async fn fetch_api_token(&self, audience: &str) -> Result<TokenMap, FetchError> {
        let access_token = self
            .access_token()
            .ok_or(FetchError::Unauthorized)?;
        let request = ApiTokenRequest {
            uri: self.config.token_uri(),
            access_token,
            audience: audience.to_string(),
            grant_type: self.config.effective_grant_type().map(str::to_string),
            permission: self.config.effective_permission().map(str::to_string),
        };
        self.tokens.fetch(request).await
    }
}
