//! Session state store.
//!
//! The store is the single owner of session status, the last session-level
//! error, the cached user profile, and the audience → token map. All reads
//! and writes go through its accessors; every observable change is broadcast
//! on the embedded [`EventBus`].
//!
//! # Change detection
//!
//! - [`SessionStore::set_status`] fires events only when the status actually
//!   changes; re-setting the current status returns `false` silently.
//! - [`SessionStore::set_error`] compares error *kinds* only: a second error
//!   of the same kind is swallowed even when its message differs.
//!
//! # Ownership
//!
//! The token map is written by the token-exchange client and read by the
//! per-audience watchers. The store itself never clears tokens on logout —
//! entries survive until removed explicitly or the process ends; consumers
//! gate on [`SessionStore::is_authenticated`] instead.

use crate::error::ClientError;
use crate::event_bus::{EventBus, Subscription};
use crate::events::{SessionEvent, SessionEventKind};
use crate::state::{SessionStatus, TokenMap, UserProfile};
use std::sync::Mutex;

#[derive(Default)]
struct StoreState {
    status: SessionStatus,
    error: Option<ClientError>,
    user: Option<UserProfile>,
    tokens: TokenMap,
}

/// Session state store with event broadcasting.
///
/// Construct one per client instance and share it by `Arc`; there is no
/// global singleton.
///
/// # Examples
///
/// ```
/// use tokenbroker_core::store::SessionStore;
/// use tokenbroker_core::state::SessionStatus;
///
/// let store = SessionStore::new();
/// assert_eq!(store.status(), SessionStatus::None);
/// assert!(store.set_status(SessionStatus::Initializing));
/// assert!(!store.set_status(SessionStatus::Initializing));
/// ```
#[derive(Default)]
pub struct SessionStore {
    state: Mutex<StoreState>,
    bus: EventBus<SessionEventKind, SessionEvent>,
}

impl SessionStore {
    /// Create an empty store with status [`SessionStatus::None`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ─── Status ────────────────────────────────────────────────────────

    /// Current session status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    /// Transition to `status`.
    ///
    /// Returns `true` and fires a `StatusChange` event (plus the per-status
    /// event) iff the value changed; otherwise returns `false` and stays
    /// silent. Legality of the transition is not validated here.
    pub fn set_status(&self, status: SessionStatus) -> bool {
        {
            let mut state = self.lock();
            if state.status == status {
                return false;
            }
            tracing::debug!(from = %state.status, to = %status, "session status change");
            state.status = status;
        }
        // Events fire outside the lock: listeners may re-enter the store.
        let payload = SessionEvent::Status(status);
        self.bus.trigger(&SessionEventKind::StatusChange, &payload);
        self.bus
            .trigger(&SessionEventKind::Status(status), &payload);
        true
    }

    /// Whether the current status is [`SessionStatus::Authorized`].
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status().is_authenticated()
    }

    /// Whether initialization has completed (authorized or not).
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.status().is_initialized()
    }

    // ─── Error ─────────────────────────────────────────────────────────

    /// Last stored session-level error, if any.
    #[must_use]
    pub fn error(&self) -> Option<ClientError> {
        self.lock().error.clone()
    }

    /// Store `error` and fire an `Error` event, unless its kind matches the
    /// currently stored error's kind.
    ///
    /// Only the kind gates the no-op: two errors of the same kind with
    /// different messages still count as "same error". Passing `None` clears
    /// the stored error (and fires, if an error was present).
    pub fn set_error(&self, error: Option<ClientError>) -> bool {
        {
            let mut state = self.lock();
            let current_kind = state.error.as_ref().map(|e| e.kind);
            let new_kind = error.as_ref().map(|e| e.kind);
            if current_kind == new_kind {
                return false;
            }
            if let Some(error) = &error {
                tracing::warn!(kind = %error.kind, message = %error.message, "session error");
            }
            state.error = error.clone();
        }
        self.bus
            .trigger(&SessionEventKind::Error, &SessionEvent::Error(error));
        true
    }

    // ─── User ──────────────────────────────────────────────────────────

    /// Cached user profile, if one has been stored.
    #[must_use]
    pub fn stored_user(&self) -> Option<UserProfile> {
        self.lock().user.clone()
    }

    /// Replace the cached user profile.
    ///
    /// This is a plain write; the `UserChanged` event is fired by the
    /// integration layer, which knows whether the change is meaningful.
    pub fn set_stored_user(&self, user: Option<UserProfile>) {
        self.lock().user = user;
    }

    // ─── Token map ─────────────────────────────────────────────────────

    /// Token stored for `audience`, if any.
    #[must_use]
    pub fn api_token(&self, audience: &str) -> Option<String> {
        self.lock().tokens.get(audience).cloned()
    }

    /// Merge `tokens` into the token map, overwriting existing audiences.
    ///
    /// Returns the full updated map.
    pub fn add_api_tokens(&self, tokens: &TokenMap) -> TokenMap {
        let mut state = self.lock();
        for (audience, token) in tokens {
            state.tokens.insert(audience.clone(), token.clone());
        }
        state.tokens.clone()
    }

    /// Remove the token stored for `audience`.
    ///
    /// Removing an absent audience is a no-op. Returns the updated map.
    pub fn remove_api_token(&self, audience: &str) -> TokenMap {
        let mut state = self.lock();
        state.tokens.remove(audience);
        state.tokens.clone()
    }

    /// Snapshot of the full token map.
    #[must_use]
    pub fn api_tokens(&self) -> TokenMap {
        self.lock().tokens.clone()
    }

    // ─── Events ────────────────────────────────────────────────────────

    /// Subscribe to store events of one kind.
    #[must_use = "dropping the subscription removes the listener"]
    pub fn subscribe<F>(
        &self,
        kind: SessionEventKind,
        listener: F,
    ) -> Subscription<SessionEventKind, SessionEvent>
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.bus.add_listener(kind, listener)
    }

    /// Broadcast an event that does not originate from a state write
    /// (token expiry notices, logout markers).
    pub fn trigger(&self, kind: SessionEventKind, payload: SessionEvent) {
        self.bus.trigger(&kind, &payload);
    }
}
