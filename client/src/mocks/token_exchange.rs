//! Mock token-exchange transport.

use crate::error::FetchError;
use crate::providers::{ApiTokenRequest, ProviderFuture, TokenExchange, TokenResponse};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Scripted [`TokenExchange`] implementation.
///
/// Responses are queued with [`push_single`](Self::push_single),
/// [`push_many`](Self::push_many), and [`push_error`](Self::push_error),
/// and consumed in order; a call with an empty queue fails with a network
/// error. The mock records every request it receives and counts calls, so
/// tests can assert on single-flight and cache behavior.
#[derive(Default)]
pub struct MockTokenExchange {
    responses: Mutex<VecDeque<Result<TokenResponse, FetchError>>>,
    requests: Mutex<Vec<ApiTokenRequest>>,
    calls: AtomicUsize,
    gate: Gate,
}

/// One-shot blocking gate for holding a call "in flight".
#[derive(Default)]
struct Gate {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl MockTokenExchange {
    /// Create a mock with an empty response queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a single-token response.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn push_single(&self, token: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(TokenResponse::Single {
                access_token: token.to_string(),
            }));
    }

    /// Queue a multi-token response.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn push_many(&self, entries: &[(&str, &str)]) {
        let map: HashMap<String, String> = entries
            .iter()
            .map(|(audience, token)| ((*audience).to_string(), (*token).to_string()))
            .collect();
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(TokenResponse::Many(map)));
    }

    /// Queue a failure.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn push_error(&self, error: FetchError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request received, if any.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn last_request(&self) -> Option<ApiTokenRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Arm the gate: the next call blocks until
    /// [`release_blocked_call`](Self::release_blocked_call).
    pub fn block_next_call(&self) {
        self.gate.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until a blocked call has entered the transport.
    pub async fn wait_for_blocked_call(&self) {
        self.gate.entered.notified().await;
    }

    /// Let a blocked call proceed.
    pub fn release_blocked_call(&self) {
        self.gate.release.notify_one();
    }
}

impl TokenExchange for MockTokenExchange {
    fn fetch_token(
        &self,
        request: &ApiTokenRequest,
    ) -> ProviderFuture<'_, Result<TokenResponse, FetchError>> {
        let request = request.clone();
        Box::pin(async move { self.fetch_impl(request).await })
    }
}

impl MockTokenExchange {
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn fetch_impl(&self, request: ApiTokenRequest) -> Result<TokenResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        if self.gate.armed.swap(false, Ordering::SeqCst) {
            self.gate.entered.notify_one();
            self.gate.release.notified().await;
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(FetchError::Network {
                detail: "mock response queue is empty".to_string(),
            }))
    }
}
