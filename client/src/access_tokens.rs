//! Per-audience API access-token watcher.
//!
//! [`ApiTokenWatcher`] is the reactive wrapper over the session store and
//! the token-exchange client for one audience. It derives a [`FetchStatus`]
//! from the session state plus its own request state, clears stale tokens
//! the moment the session becomes unauthorized, and fetches automatically
//! whenever the derived status is exactly `Ready`.
//!
//! Recomputation is driven by store subscriptions and by every accessor
//! call. [`ApiTokenWatcher::poll`] performs one reconcile-plus-auto-fetch
//! step explicitly; [`ApiTokenWatcher::spawn`] runs that step from a
//! background task whenever the session status changes.

use crate::error::FetchError;
use crate::session::SessionClient;
use std::sync::{Arc, Mutex};
use tokenbroker_core::event_bus::Subscription;
use tokenbroker_core::events::{SessionEvent, SessionEventKind};
use tokenbroker_core::state::TokenMap;
use tokio::sync::Notify;

/// Lifecycle label of an asynchronous fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStatus {
    /// Nothing has happened yet and nothing can: a prerequisite is missing.
    Waiting,

    /// Prerequisites are met; the fetch has not started.
    Ready,

    /// A fetch is in flight.
    Loading,

    /// The last fetch failed.
    Error,

    /// Data is available.
    Loaded,

    /// The session is not authorized.
    Unauthorized,
}

impl FetchStatus {
    /// Status name as a static string, for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Ready => "ready",
            Self::Loading => "loading",
            Self::Error => "error",
            Self::Loaded => "loaded",
            Self::Unauthorized => "unauthorized",
        }
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct WatcherState {
    tokens: Option<TokenMap>,
    status: FetchStatus,
    error: Option<String>,
}

/// Reactive per-audience wrapper over the token-exchange client.
pub struct ApiTokenWatcher {
    client: Arc<SessionClient>,
    audience: String,
    state: Mutex<WatcherState>,
    notify: Arc<Notify>,
    _subscription: Subscription<SessionEventKind, SessionEvent>,
}

impl SessionClient {
    /// Create a watcher for `audience` backed by this client.
    #[must_use]
    pub fn api_tokens(self: &Arc<Self>, audience: &str) -> Arc<ApiTokenWatcher> {
        ApiTokenWatcher::new(self, audience)
    }
}

impl ApiTokenWatcher {
    /// Create a watcher for `audience`.
    ///
    /// The watcher subscribes to session status changes; the subscription
    /// lives as long as the watcher does.
    #[must_use]
    pub fn new(client: &Arc<SessionClient>, audience: &str) -> Arc<Self> {
        let initial_token = if client.is_authenticated() {
            client.store().api_token(audience)
        } else {
            None
        };
        let tokens = initial_token.map(|token| {
            let mut map = TokenMap::new();
            map.insert(audience.to_string(), token);
            map
        });
        let status = if !client.is_authenticated() {
            FetchStatus::Unauthorized
        } else if tokens.is_some() {
            FetchStatus::Loaded
        } else {
            FetchStatus::Ready
        };

        let notify = Arc::new(Notify::new());
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let listener_weak = weak.clone();
            let subscription =
                client
                    .store()
                    .subscribe(SessionEventKind::StatusChange, move |_| {
                        if let Some(watcher) = listener_weak.upgrade() {
                            watcher.reconcile();
                            watcher.notify.notify_one();
                        }
                    });
            Self {
                client: Arc::clone(client),
                audience: audience.to_string(),
                state: Mutex::new(WatcherState {
                    tokens,
                    status,
                    error: None,
                }),
                notify,
                _subscription: subscription,
            }
        })
    }

    /// The audience this watcher is scoped to.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// The session client this watcher reads from.
    #[must_use]
    pub(crate) const fn client(&self) -> &Arc<SessionClient> {
        &self.client
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WatcherState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Base status from session state and token presence only.
    fn resolve_base(&self, tokens_known: bool) -> FetchStatus {
        if !self.client.is_authenticated() {
            FetchStatus::Unauthorized
        } else if tokens_known {
            FetchStatus::Loaded
        } else {
            FetchStatus::Ready
        }
    }

    /// Reconcile the base status with the locally tracked one.
    ///
    /// When either side reports unauthorized, the base wins: it reflects the
    /// session itself, which both overrides any in-flight result and may
    /// have recovered since the local state was written.
    const fn resolve_current(base: FetchStatus, local: FetchStatus) -> FetchStatus {
        if matches!(local, FetchStatus::Unauthorized) || matches!(base, FetchStatus::Unauthorized)
        {
            base
        } else {
            local
        }
    }

    /// Synchronous derived-state update.
    ///
    /// A stale token must never be observable after logout: when the base
    /// status says unauthorized while a token is still held locally, the
    /// token is dropped and the local status forced to unauthorized.
    fn reconcile(&self) {
        let mut state = self.lock();
        let base = self.resolve_base(state.tokens.is_some());
        if base == FetchStatus::Unauthorized && state.tokens.is_some() {
            tracing::debug!(audience = %self.audience, "clearing token after logout");
            state.tokens = None;
            state.status = FetchStatus::Unauthorized;
        }
    }

    /// Current resolved fetch status.
    #[must_use]
    pub fn status(&self) -> FetchStatus {
        self.reconcile();
        let state = self.lock();
        let base = self.resolve_base(state.tokens.is_some());
        Self::resolve_current(base, state.status)
    }

    /// Message of the last fetch error, if the watcher is in error state.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.reconcile();
        self.lock().error.clone()
    }

    /// The token held for this audience, as an audience → token map.
    #[must_use]
    pub fn token(&self) -> Option<TokenMap> {
        self.reconcile();
        self.lock().tokens.clone()
    }

    /// Fetch the API token for this audience now.
    ///
    /// Errors are absorbed into the watcher's error state as well as
    /// returned; a later successful fetch clears them.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] from the exchange.
    pub async fn fetch(&self) -> Result<TokenMap, FetchError> {
        self.lock().status = FetchStatus::Loading;
        match self.client.fetch_api_token(&self.audience).await {
            Ok(tokens) => {
                let mut state = self.lock();
                state.error = None;
                state.tokens = Some(tokens.clone());
                state.status = FetchStatus::Loaded;
                drop(state);
                Ok(tokens)
            }
            Err(error) => {
                let mut state = self.lock();
                state.status = FetchStatus::Error;
                state.error = Some(error.display_message());
                drop(state);
                tracing::warn!(
                    audience = %self.audience,
                    error = %error,
                    "api token fetch failed"
                );
                Err(error)
            }
        }
    }

    /// Drop the locally held token and error so the next poll fetches
    /// again (the store entry is removed separately, if at all).
    pub fn clear(&self) {
        let mut state = self.lock();
        state.tokens = None;
        state.error = None;
        state.status = if self.client.is_authenticated() {
            FetchStatus::Ready
        } else {
            FetchStatus::Unauthorized
        };
    }

    /// One reconcile-plus-auto-fetch step.
    ///
    /// Fetches exactly when the resolved status is `Ready`: authenticated,
    /// no token yet, no fetch in flight or failed. The auto-fetch re-arms
    /// every time the status returns to `Ready` (token removed from the
    /// store, re-authentication).
    pub async fn poll(&self) {
        if self.status() == FetchStatus::Ready {
            // Errors land in the watcher state; poll itself never fails.
            let _ = self.fetch().await;
        }
    }

    /// Drive [`Self::poll`] from session status changes in a background
    /// task. The task ends when the watcher is dropped.
    #[must_use]
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let notify = Arc::clone(&self.notify);
        tokio::spawn(async move {
            loop {
                match weak.upgrade() {
                    Some(watcher) => watcher.poll().await,
                    None => break,
                }
                notify.notified().await;
            }
        })
    }
}

impl Drop for ApiTokenWatcher {
    fn drop(&mut self) {
        // Wake the spawned driver so it can observe the dropped watcher.
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::mocks::{MockLoginProvider, MockTokenExchange};
    use crate::providers::TokenExchange;
    use tokenbroker_core::state::UserProfile;

    fn profile() -> UserProfile {
        let mut profile = UserProfile::new();
        profile.insert("name".to_string(), serde_json::json!("Maija"));
        profile
    }

    fn config() -> SessionConfig {
        SessionConfig::new(
            "https://auth.example.com".to_string(),
            "test-realm".to_string(),
            "test-client".to_string(),
        )
    }

    fn wired(
        provider: MockLoginProvider,
    ) -> (Arc<SessionClient>, Arc<MockTokenExchange>) {
        let exchange = Arc::new(MockTokenExchange::new());
        let client = SessionClient::new(
            config(),
            Arc::new(provider),
            Arc::clone(&exchange) as Arc<dyn TokenExchange>,
        );
        (client, exchange)
    }

    #[tokio::test]
    async fn test_unauthenticated_watcher_is_unauthorized() {
        let (client, _exchange) = wired(MockLoginProvider::new());
        client.init().await.unwrap();

        let watcher = client.api_tokens("profile-api");
        assert_eq!(watcher.status(), FetchStatus::Unauthorized);
        assert_eq!(watcher.token(), None);

        // Auto-fetch never triggers while unauthorized.
        watcher.poll().await;
        assert_eq!(watcher.status(), FetchStatus::Unauthorized);
    }

    #[tokio::test]
    async fn test_lifecycle_unauthorized_ready_loading_loaded() {
        let (client, exchange) = wired(MockLoginProvider::new());
        client.init().await.unwrap();
        let watcher = client.api_tokens("profile-api");
        assert_eq!(watcher.status(), FetchStatus::Unauthorized);

        // The user logs in.
        client.handle_provider_event(crate::providers::ProviderEvent::UserLoaded {
            profile: profile(),
            access_token: "at-1".to_string(),
        });
        client.on_auth_change(true);
        assert_eq!(watcher.status(), FetchStatus::Ready);

        // Auto-fetch with the exchange held open: status passes through
        // loading before landing on loaded.
        exchange.push_single("profile-token");
        exchange.block_next_call();
        let poll = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.poll().await })
        };
        exchange.wait_for_blocked_call().await;
        assert_eq!(watcher.status(), FetchStatus::Loading);
        exchange.release_blocked_call();
        poll.await.unwrap();

        assert_eq!(watcher.status(), FetchStatus::Loaded);
        let tokens = watcher.token().unwrap();
        assert_eq!(tokens["profile-api"], "profile-token");

        // The user logs out: status returns to unauthorized and the token
        // is no longer observable.
        client.logout().await.unwrap();
        assert_eq!(watcher.status(), FetchStatus::Unauthorized);
        assert_eq!(watcher.token(), None);
    }

    #[tokio::test]
    async fn test_fetch_error_sets_error_state_and_later_success_clears_it() {
        let (client, exchange) = wired(MockLoginProvider::authenticated(profile(), "at-1"));
        client.init().await.unwrap();
        let watcher = client.api_tokens("profile-api");

        exchange.push_error(FetchError::Http {
            status: 403,
            status_text: "Forbidden".to_string(),
            body: "no access".to_string(),
        });
        watcher.poll().await;
        assert_eq!(watcher.status(), FetchStatus::Error);
        assert_eq!(watcher.error_message().unwrap(), "Forbidden 403");

        // Error state does not auto-retry...
        watcher.poll().await;
        assert_eq!(exchange.calls(), 1);

        // ...but a manual fetch does, and success clears the error.
        exchange.push_single("profile-token");
        watcher.fetch().await.unwrap();
        assert_eq!(watcher.status(), FetchStatus::Loaded);
        assert_eq!(watcher.error_message(), None);
    }

    #[tokio::test]
    async fn test_auto_fetch_rearms_after_token_removal() {
        let (client, exchange) = wired(MockLoginProvider::authenticated(profile(), "at-1"));
        client.init().await.unwrap();
        let watcher = client.api_tokens("profile-api");

        exchange.push_single("first-token");
        watcher.poll().await;
        assert_eq!(watcher.status(), FetchStatus::Loaded);

        // Removing the token from the store and clearing the local copy
        // returns the status to ready, which re-arms the auto-fetch.
        client.store().remove_api_token("profile-api");
        watcher.clear();
        assert_eq!(watcher.status(), FetchStatus::Ready);
        exchange.push_single("second-token");
        watcher.poll().await;
        assert_eq!(watcher.token().unwrap()["profile-api"], "second-token");
        assert_eq!(exchange.calls(), 2);
    }

    #[tokio::test]
    async fn test_watcher_picks_up_preexisting_token() {
        let (client, exchange) = wired(MockLoginProvider::authenticated(profile(), "at-1"));
        client.init().await.unwrap();

        exchange.push_single("cached-token");
        client.fetch_api_token("profile-api").await.unwrap();

        // A watcher created after the token landed starts loaded.
        let watcher = client.api_tokens("profile-api");
        assert_eq!(watcher.status(), FetchStatus::Loaded);
        assert_eq!(watcher.token().unwrap()["profile-api"], "cached-token");
    }

    #[tokio::test]
    async fn test_unauthorized_overrides_in_flight_fetch() {
        let (client, exchange) = wired(MockLoginProvider::authenticated(profile(), "at-1"));
        client.init().await.unwrap();
        let watcher = client.api_tokens("profile-api");

        exchange.push_single("too-late-token");
        exchange.block_next_call();
        let poll = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.poll().await })
        };
        exchange.wait_for_blocked_call().await;
        assert_eq!(watcher.status(), FetchStatus::Loading);

        // The session ends while the fetch is in flight: unauthorized wins
        // immediately, and keeps winning after the fetch resolves.
        client.on_auth_change(false);
        assert_eq!(watcher.status(), FetchStatus::Unauthorized);

        exchange.release_blocked_call();
        poll.await.unwrap();
        assert_eq!(watcher.status(), FetchStatus::Unauthorized);
        assert_eq!(watcher.token(), None);
    }

    #[tokio::test]
    async fn test_spawned_driver_fetches_on_login() {
        let (client, exchange) = wired(MockLoginProvider::new());
        client.init().await.unwrap();
        let watcher = client.api_tokens("profile-api");
        let driver = watcher.spawn();

        exchange.push_single("profile-token");
        client.handle_provider_event(crate::providers::ProviderEvent::UserLoaded {
            profile: profile(),
            access_token: "at-1".to_string(),
        });
        client.on_auth_change(true);

        // The driver wakes from the status change and fetches.
        let mut settled = false;
        for _ in 0..50 {
            if watcher.status() == FetchStatus::Loaded {
                settled = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(settled, "driver never fetched the token");
        assert_eq!(watcher.token().unwrap()["profile-api"], "profile-token");

        drop(watcher);
        // The driver notices the dropped watcher and exits.
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), driver)
            .await
            .unwrap();
    }
}
