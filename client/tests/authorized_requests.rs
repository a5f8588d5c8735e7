//! Integration tests for the authorized request orchestrator.

use futures::FutureExt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokenbroker_client::config::SessionConfig;
use tokenbroker_client::mocks::{MockLoginProvider, MockTokenExchange};
use tokenbroker_client::providers::TokenExchange;
use tokenbroker_client::requests::{
    AuthorizedRequest, AuthorizedRequestProps, RequestProps,
};
use tokenbroker_client::session::SessionClient;
use tokenbroker_client::{FetchError, FetchStatus};
use tokenbroker_core::state::UserProfile;

fn test_profile() -> UserProfile {
    let mut profile = UserProfile::new();
    profile.insert("name".to_string(), serde_json::json!("Maija"));
    profile
}

fn test_config() -> SessionConfig {
    SessionConfig::new(
        "https://auth.example.com".to_string(),
        "test-realm".to_string(),
        "test-client".to_string(),
    )
}

fn create_test_client(
    provider: MockLoginProvider,
) -> (Arc<SessionClient>, Arc<MockTokenExchange>) {
    let exchange = Arc::new(MockTokenExchange::new());
    let client = SessionClient::new(
        test_config(),
        Arc::new(provider),
        Arc::clone(&exchange) as Arc<dyn TokenExchange>,
    );
    (client, exchange)
}

/// Request function that records every invocation and echoes its props.
fn recording_request(
    calls: &Arc<AtomicUsize>,
    seen: &Arc<Mutex<Vec<AuthorizedRequestProps<serde_json::Value>>>>,
) -> AuthorizedRequest<String, serde_json::Value> {
    let calls = Arc::clone(calls);
    let seen = Arc::clone(seen);
    Arc::new(move |props| {
        calls.fetch_add(1, Ordering::SeqCst);
        seen.lock().unwrap().push(props);
        async { Ok("backend-data".to_string()) }.boxed()
    })
}

/// Request function that always fails.
fn failing_request() -> AuthorizedRequest<String, serde_json::Value> {
    Arc::new(|_props| async { Err(anyhow::anyhow!("backend is down")) }.boxed())
}

#[tokio::test]
async fn test_auto_fetch_invokes_request_exactly_once_with_props() {
    let (client, exchange) =
        create_test_client(MockLoginProvider::authenticated(test_profile(), "at-1"));
    client.init().await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let requests = client.authorized_requests(
        "example-api",
        recording_request(&calls, &seen),
        Some(RequestProps::with_data(serde_json::json!({ "x": 1 }))),
    );

    assert_eq!(requests.status(), FetchStatus::Waiting);

    // One poll drives the whole pipeline: token load, then the one-shot
    // request the moment the combined status reaches ready.
    exchange.push_single("example-token");
    requests.poll().await;

    assert_eq!(requests.status(), FetchStatus::Loaded);
    assert_eq!(requests.data().unwrap(), "backend-data");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let invocations = seen.lock().unwrap();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].data, Some(serde_json::json!({ "x": 1 })));
    assert_eq!(invocations[0].api_tokens["example-api"], "example-token");
    drop(invocations);

    // The auto-fetch disarmed itself: further polls change nothing.
    requests.poll().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_request_rejected_until_token_loaded() {
    let (client, _exchange) =
        create_test_client(MockLoginProvider::authenticated(test_profile(), "at-1"));
    client.init().await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let requests =
        client.authorized_requests("example-api", recording_request(&calls, &seen), None);

    // Token status is `ready`, not `loaded`: the request is rejected
    // without invoking the wrapped function.
    assert_eq!(requests.api_token_status(), FetchStatus::Ready);
    let result = requests.request(RequestProps::default()).await;

    assert_eq!(result, None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        requests.request_error().unwrap(),
        "Api tokens are not fetched."
    );
}

#[tokio::test]
async fn test_manual_request_after_token_load() {
    let (client, exchange) =
        create_test_client(MockLoginProvider::authenticated(test_profile(), "at-1"));
    client.init().await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let requests =
        client.authorized_requests("example-api", recording_request(&calls, &seen), None);

    exchange.push_single("example-token");
    requests.poll().await;
    assert_eq!(requests.status(), FetchStatus::Ready);

    let result = requests.request(RequestProps::default()).await;
    assert_eq!(result.unwrap(), "backend-data");
    assert_eq!(requests.status(), FetchStatus::Loaded);
    assert_eq!(requests.request_status(), FetchStatus::Loaded);
    assert_eq!(requests.data().unwrap(), "backend-data");
}

#[tokio::test]
async fn test_request_failure_is_absorbed_into_error_state() {
    let (client, exchange) =
        create_test_client(MockLoginProvider::authenticated(test_profile(), "at-1"));
    client.init().await.unwrap();

    let requests = client.authorized_requests("example-api", failing_request(), None);
    exchange.push_single("example-token");
    requests.poll().await;

    let result = requests.request(RequestProps::default()).await;
    assert_eq!(result, None);
    assert_eq!(requests.status(), FetchStatus::Error);
    assert_eq!(requests.request_status(), FetchStatus::Error);
    assert_eq!(requests.request_error().unwrap(), "backend is down");
    assert_eq!(requests.data(), None);
}

#[tokio::test]
async fn test_token_error_dominates_combined_status() {
    let (client, exchange) =
        create_test_client(MockLoginProvider::authenticated(test_profile(), "at-1"));
    client.init().await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let requests =
        client.authorized_requests("example-api", recording_request(&calls, &seen), None);

    exchange.push_error(FetchError::Http {
        status: 500,
        status_text: "Internal Server Error".to_string(),
        body: "exchange broke".to_string(),
    });
    requests.poll().await;

    assert_eq!(requests.api_token_status(), FetchStatus::Error);
    assert_eq!(requests.status(), FetchStatus::Error);
    assert_eq!(
        requests.api_token_error().unwrap(),
        "Internal Server Error 500"
    );
    // The request itself never ran.
    assert_eq!(requests.request_status(), FetchStatus::Waiting);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unauthorized_discards_held_result_without_network() {
    let (client, exchange) =
        create_test_client(MockLoginProvider::authenticated(test_profile(), "at-1"));
    client.init().await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let requests =
        client.authorized_requests("example-api", recording_request(&calls, &seen), None);

    exchange.push_single("example-token");
    requests.poll().await;
    requests.request(RequestProps::default()).await.unwrap();
    assert_eq!(requests.data().unwrap(), "backend-data");
    let exchange_calls = exchange.calls();
    let request_calls = calls.load(Ordering::SeqCst);

    // The session ends: held data must not outlive it.
    client.logout().await.unwrap();

    assert_eq!(requests.data(), None);
    assert_eq!(requests.request_status(), FetchStatus::Error);
    assert_eq!(requests.request_error().unwrap(), "User is unauthorized");
    // No further network or request activity happened.
    assert_eq!(exchange.calls(), exchange_calls);
    assert_eq!(calls.load(Ordering::SeqCst), request_calls);
}

#[tokio::test]
async fn test_clear_discards_result_and_error_only() {
    let (client, exchange) =
        create_test_client(MockLoginProvider::authenticated(test_profile(), "at-1"));
    client.init().await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let requests =
        client.authorized_requests("example-api", recording_request(&calls, &seen), None);

    exchange.push_single("example-token");
    requests.poll().await;
    requests.request(RequestProps::default()).await.unwrap();

    requests.clear();
    assert_eq!(requests.data(), None);
    assert_eq!(requests.request_error(), None);
    // Statuses are untouched by clear().
    assert_eq!(requests.request_status(), FetchStatus::Loaded);
    assert_eq!(requests.status(), FetchStatus::Loaded);
}

#[tokio::test]
async fn test_spawned_driver_runs_pipeline_end_to_end() {
    let (client, exchange) = create_test_client(MockLoginProvider::new());
    client.init().await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let requests = client.authorized_requests(
        "example-api",
        recording_request(&calls, &seen),
        Some(RequestProps::default()),
    );
    let _driver = requests.spawn();

    // Login arrives; the driver loads the token and fires the auto request.
    exchange.push_single("example-token");
    client.handle_provider_event(
        tokenbroker_client::providers::ProviderEvent::UserLoaded {
            profile: test_profile(),
            access_token: "at-1".to_string(),
        },
    );
    client.on_auth_change(true);

    let mut settled = false;
    for _ in 0..50 {
        if requests.status() == FetchStatus::Loaded {
            settled = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(settled, "driver never completed the pipeline");
    assert_eq!(requests.data().unwrap(), "backend-data");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
