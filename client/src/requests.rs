//! Authorized request orchestrator.
//!
//! [`AuthorizedRequests`] composes one audience's [`ApiTokenWatcher`] with a
//! caller-supplied async request function. The wrapped function receives the
//! audience's tokens alongside the caller's props and talks to whatever API
//! the application needs; the orchestrator tracks its lifecycle and makes
//! sure held results never outlive the session that produced them.
//!
//! # Writing a request function
//!
//! ```no_run
//! use futures::FutureExt;
//! use tokenbroker_client::requests::{AuthorizedRequest, AuthorizedRequestProps};
//!
//! #[derive(Clone, serde::Deserialize)]
//! struct PetRecord {
//!     pet_name: String,
//! }
//!
//! fn backend_request() -> AuthorizedRequest<PetRecord, ()> {
//!     std::sync::Arc::new(|props: AuthorizedRequestProps<()>| {
//!         async move {
//!             let token = props
//!                 .api_tokens
//!                 .get("example-api")
//!                 .ok_or_else(|| anyhow::anyhow!("no token for example-api"))?;
//!             let response = reqwest::Client::new()
//!                 .get("https://backend.example.com/pet")
//!                 .bearer_auth(token)
//!                 .send()
//!                 .await?
//!                 .error_for_status()?;
//!             Ok(response.json::<PetRecord>().await?)
//!         }
//!         .boxed()
//!     })
//! }
//! ```

use crate::access_tokens::{ApiTokenWatcher, FetchStatus};
use crate::session::SessionClient;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use tokenbroker_core::event_bus::Subscription;
use tokenbroker_core::events::{SessionEvent, SessionEventKind};
use tokenbroker_core::state::TokenMap;
use tokio::sync::Notify;

/// Props passed to [`AuthorizedRequests::request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestProps<P> {
    /// Caller data forwarded to the wrapped request function.
    pub data: Option<P>,
}

impl<P> Default for RequestProps<P> {
    fn default() -> Self {
        Self { data: None }
    }
}

impl<P> RequestProps<P> {
    /// Props carrying `data`.
    #[must_use]
    pub const fn with_data(data: P) -> Self {
        Self { data: Some(data) }
    }
}

/// What the wrapped request function receives on each invocation.
#[derive(Debug, Clone)]
pub struct AuthorizedRequestProps<P> {
    /// Caller data, if any was supplied.
    pub data: Option<P>,

    /// The audience's API tokens at the time of the call.
    pub api_tokens: TokenMap,
}

/// Caller-supplied async request function.
///
/// Failures use [`anyhow::Error`] so the function can surface arbitrary
/// application errors; the orchestrator absorbs them into its error state.
pub type AuthorizedRequest<R, P> =
    Arc<dyn Fn(AuthorizedRequestProps<P>) -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync>;

struct RequestState<R, P> {
    status: FetchStatus,
    result: Option<R>,
    error: Option<String>,
    auto_fetch_props: Option<RequestProps<P>>,
}

/// Orchestrator for authorized API requests against one audience.
pub struct AuthorizedRequests<R, P> {
    watcher: Arc<ApiTokenWatcher>,
    request_fn: AuthorizedRequest<R, P>,
    state: Mutex<RequestState<R, P>>,
    notify: Arc<Notify>,
    _subscription: Subscription<SessionEventKind, SessionEvent>,
}

impl SessionClient {
    /// Create an orchestrator wrapping `request_fn` for `audience`.
    ///
    /// When `auto_fetch_props` is given, the orchestrator performs exactly
    /// one automatic request with them the first time its combined status
    /// becomes `Ready`.
    #[must_use]
    pub fn authorized_requests<R, P>(
        self: &Arc<Self>,
        audience: &str,
        request_fn: AuthorizedRequest<R, P>,
        auto_fetch_props: Option<RequestProps<P>>,
    ) -> Arc<AuthorizedRequests<R, P>>
    where
        R: Clone + Send + 'static,
        P: Send + 'static,
    {
        AuthorizedRequests::new(self.api_tokens(audience), request_fn, auto_fetch_props)
    }
}

impl<R, P> AuthorizedRequests<R, P>
where
    R: Clone + Send + 'static,
    P: Send + 'static,
{
    /// Create an orchestrator over an existing watcher.
    #[must_use]
    pub fn new(
        watcher: Arc<ApiTokenWatcher>,
        request_fn: AuthorizedRequest<R, P>,
        auto_fetch_props: Option<RequestProps<P>>,
    ) -> Arc<Self> {
        let notify = Arc::new(Notify::new());
        let store = Arc::clone(watcher.client().store());
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let listener_weak = weak.clone();
            let subscription = store.subscribe(SessionEventKind::StatusChange, move |_| {
                if let Some(requests) = listener_weak.upgrade() {
                    requests.reconcile();
                    requests.notify.notify_one();
                }
            });
            Self {
                watcher,
                request_fn,
                state: Mutex::new(RequestState {
                    status: FetchStatus::Waiting,
                    result: None,
                    error: None,
                    auto_fetch_props,
                }),
                notify,
                _subscription: subscription,
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RequestState<R, P>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Combined status from the token status and the request status.
    ///
    /// A loaded token means "ready to request" unless a request is already
    /// in flight, loaded, or failed, in which case the request's own status
    /// takes precedence. A token error is a combined error. Anything else
    /// mirrors the request status, defaulting to waiting.
    const fn resolve_status(token: FetchStatus, request: FetchStatus) -> FetchStatus {
        let request_active = matches!(
            request,
            FetchStatus::Loading | FetchStatus::Loaded | FetchStatus::Error
        );
        match token {
            FetchStatus::Loaded => {
                if request_active {
                    request
                } else {
                    FetchStatus::Ready
                }
            }
            FetchStatus::Error => FetchStatus::Error,
            _ => {
                if request_active {
                    request
                } else {
                    FetchStatus::Waiting
                }
            }
        }
    }

    /// Synchronous derived-state update: held data must never outlive the
    /// session that produced it.
    fn reconcile(&self) {
        if self.watcher.status() != FetchStatus::Unauthorized {
            return;
        }
        let mut state = self.lock();
        if state.result.is_some() {
            tracing::debug!(
                audience = %self.watcher.audience(),
                "discarding request result after logout"
            );
            state.result = None;
            state.error = Some("User is unauthorized".to_string());
            state.status = FetchStatus::Error;
        }
    }

    // ─── Accessors ─────────────────────────────────────────────────────

    /// Combined status of token fetching and the wrapped request.
    #[must_use]
    pub fn status(&self) -> FetchStatus {
        self.reconcile();
        Self::resolve_status(self.watcher.status(), self.lock().status)
    }

    /// Status of the underlying API-token fetch.
    #[must_use]
    pub fn api_token_status(&self) -> FetchStatus {
        self.reconcile();
        self.watcher.status()
    }

    /// Status of the wrapped request alone.
    #[must_use]
    pub fn request_status(&self) -> FetchStatus {
        self.reconcile();
        self.lock().status
    }

    /// Error message from the API-token fetch, if any.
    #[must_use]
    pub fn api_token_error(&self) -> Option<String> {
        self.watcher.error_message()
    }

    /// Error message from the wrapped request, if any.
    #[must_use]
    pub fn request_error(&self) -> Option<String> {
        self.reconcile();
        self.lock().error.clone()
    }

    /// Result of the last successful request, if one is held.
    #[must_use]
    pub fn data(&self) -> Option<R> {
        self.reconcile();
        self.lock().result.clone()
    }

    /// The audience's tokens, as held by the underlying watcher.
    #[must_use]
    pub fn token(&self) -> Option<TokenMap> {
        self.watcher.token()
    }

    // ─── Operations ────────────────────────────────────────────────────

    /// Invoke the wrapped request function with `props`.
    ///
    /// Rejects immediately — storing a caller-misuse error and *not*
    /// invoking the function — unless the token status is exactly `Loaded`.
    /// On success the result is stored and returned; on failure the error
    /// is stored and `None` is returned. Failures never propagate as
    /// panics or early returns to the caller.
    pub async fn request(&self, props: RequestProps<P>) -> Option<R> {
        self.reconcile();
        if self.watcher.status() != FetchStatus::Loaded {
            self.lock().error = Some("Api tokens are not fetched.".to_string());
            return None;
        }
        self.execute(props).await
    }

    async fn execute(&self, props: RequestProps<P>) -> Option<R> {
        self.lock().status = FetchStatus::Loading;
        let request_props = AuthorizedRequestProps {
            data: props.data,
            api_tokens: self.watcher.token().unwrap_or_default(),
        };
        match (self.request_fn)(request_props).await {
            Ok(result) => {
                let mut state = self.lock();
                state.status = FetchStatus::Loaded;
                state.result = Some(result.clone());
                state.error = None;
                drop(state);
                Some(result)
            }
            Err(error) => {
                let mut state = self.lock();
                state.status = FetchStatus::Error;
                state.error = Some(error.to_string());
                state.result = None;
                drop(state);
                tracing::warn!(
                    audience = %self.watcher.audience(),
                    error = %error,
                    "authorized request failed"
                );
                None
            }
        }
    }

    /// Discard the stored result and error without touching any status.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.result = None;
        state.error = None;
    }

    /// One reconcile-plus-auto-fetch step for the whole pipeline.
    ///
    /// Drives the underlying watcher first (so a missing token is fetched
    /// when the session allows), then performs the configured one-shot
    /// automatic request when the combined status first becomes `Ready`
    /// (token loaded, nothing requested yet), and disarms itself. Manual
    /// requests are unaffected.
    pub async fn poll(&self) {
        self.watcher.poll().await;
        if self.status() != FetchStatus::Ready {
            return;
        }
        let props = self.lock().auto_fetch_props.take();
        if let Some(props) = props {
            self.execute(props).await;
        }
    }

    /// Drive [`Self::poll`] from session status changes in a background
    /// task. The task ends when the orchestrator is dropped.
    #[must_use]
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let notify = Arc::clone(&self.notify);
        tokio::spawn(async move {
            loop {
                match weak.upgrade() {
                    Some(requests) => requests.poll().await,
                    None => break,
                }
                notify.notified().await;
            }
        })
    }
}

impl<R, P> Drop for AuthorizedRequests<R, P> {
    fn drop(&mut self) {
        // Wake the spawned driver so it can observe the drop.
        self.notify.notify_waiters();
    }
}
