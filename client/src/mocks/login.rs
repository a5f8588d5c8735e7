//! Mock identity-provider client.

use crate::providers::{LoginProvider, ProviderError, ProviderFuture};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokenbroker_core::state::UserProfile;

/// Scripted [`LoginProvider`] implementation.
///
/// The init outcome is configured up front; login/logout calls are recorded
/// so tests can assert on delegation.
pub struct MockLoginProvider {
    init_result: Mutex<Result<Option<UserProfile>, ProviderError>>,
    user: Mutex<Option<UserProfile>>,
    access_token: Mutex<Option<String>>,
    init_calls: AtomicUsize,
    login_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl Default for MockLoginProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLoginProvider {
    /// Create a provider whose `init` resolves with no user.
    #[must_use]
    pub fn new() -> Self {
        Self {
            init_result: Mutex::new(Ok(None)),
            user: Mutex::new(None),
            access_token: Mutex::new(None),
            init_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    /// Create a provider whose `init` resolves with `profile` and
    /// `access_token`, as an already-authenticated session would.
    #[must_use]
    pub fn authenticated(profile: UserProfile, access_token: &str) -> Self {
        let mock = Self::new();
        mock.set_init_user(profile, access_token);
        mock
    }

    /// Script `init` to resolve with a user.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn set_init_user(&self, profile: UserProfile, access_token: &str) {
        *self.init_result.lock().unwrap() = Ok(Some(profile.clone()));
        *self.user.lock().unwrap() = Some(profile);
        *self.access_token.lock().unwrap() = Some(access_token.to_string());
    }

    /// Script `init` to fail.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn set_init_error(&self, message: &str) {
        *self.init_result.lock().unwrap() = Err(ProviderError::new(message));
    }

    /// Number of `init` calls received.
    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Number of `login` calls received.
    #[must_use]
    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    /// Number of `logout` calls received.
    #[must_use]
    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

impl LoginProvider for MockLoginProvider {
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    fn init(&self) -> ProviderFuture<'_, Result<Option<UserProfile>, ProviderError>> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.init_result.lock().unwrap().clone();
        Box::pin(async move { result })
    }

    fn login(&self) -> ProviderFuture<'_, Result<(), ProviderError>> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    fn logout(&self) -> ProviderFuture<'_, Result<(), ProviderError>> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        *self.user.lock().unwrap() = None;
        *self.access_token.lock().unwrap() = None;
        Box::pin(async { Ok(()) })
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    fn user(&self) -> Option<UserProfile> {
        self.user.lock().unwrap().clone()
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    fn access_token(&self) -> Option<String> {
        self.access_token.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn profile(name: &str) -> UserProfile {
        let mut profile = UserProfile::new();
        profile.insert("name".to_string(), serde_json::json!(name));
        profile
    }

    #[tokio::test]
    async fn test_default_init_resolves_without_user() {
        let mock = MockLoginProvider::new();
        assert_eq!(mock.init().await.unwrap(), None);
        assert_eq!(mock.init_calls(), 1);
    }

    #[tokio::test]
    async fn test_authenticated_init_resolves_with_user() {
        let mock = MockLoginProvider::authenticated(profile("Maija"), "token-1");
        let user = mock.init().await.unwrap().unwrap();
        assert_eq!(user["name"], serde_json::json!("Maija"));
        assert_eq!(mock.access_token().unwrap(), "token-1");
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let mock = MockLoginProvider::authenticated(profile("Maija"), "token-1");
        mock.logout().await.unwrap();
        assert!(mock.user().is_none());
        assert!(mock.access_token().is_none());
        assert_eq!(mock.logout_calls(), 1);
    }
}
