//! HTTP token-exchange transport.

use super::{ApiTokenRequest, ProviderFuture, TokenExchange, TokenResponse};
use crate::error::FetchError;
use reqwest::Client;

/// Token-exchange transport over HTTP.
///
/// Sends a form-encoded `POST` to the configured exchange endpoint with the
/// primary access token as a bearer credential:
///
/// ```text
/// POST {token_uri}
/// Authorization: Bearer <access_token>
/// Content-Type: application/x-www-form-urlencoded
///
/// audience=<aud>[&grant_type=<gt>][&permission=<perm>]
/// ```
///
/// The optional fields are emitted only when present on the request —
/// an unconfigured `grant_type` or `permission` does not appear as an empty
/// string.
#[derive(Clone, Debug, Default)]
pub struct HttpTokenExchange {
    /// HTTP client for making requests.
    http_client: Client,
}

impl HttpTokenExchange {
    /// Create a transport with a fresh HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
        }
    }

    /// Create a transport reusing an existing HTTP client.
    #[must_use]
    pub const fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }

    async fn execute(&self, request: &ApiTokenRequest) -> Result<TokenResponse, FetchError> {
        let form = form_fields(request);
        let response = self
            .http_client
            .post(&request.uri)
            .bearer_auth(&request.access_token)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(uri = %request.uri, error = %e, "token exchange transport failure");
                FetchError::Network {
                    detail: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                uri = %request.uri,
                status = status.as_u16(),
                "token exchange rejected"
            );
            return Err(FetchError::Http {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Network {
            detail: e.to_string(),
        })?;
        let json: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| FetchError::InvalidJson {
                detail: e.to_string(),
            })?;
        Ok(TokenResponse::from_json(&json))
    }
}

impl TokenExchange for HttpTokenExchange {
    fn fetch_token(
        &self,
        request: &ApiTokenRequest,
    ) -> ProviderFuture<'_, Result<TokenResponse, FetchError>> {
        let request = request.clone();
        Box::pin(async move { self.execute(&request).await })
    }
}

/// Form fields for one exchange request. Optional fields are absent rather
/// than empty when unconfigured.
fn form_fields(request: &ApiTokenRequest) -> Vec<(&'static str, &str)> {
    let mut form: Vec<(&'static str, &str)> = vec![("audience", request.audience.as_str())];
    if let Some(grant_type) = request.grant_type.as_deref() {
        form.push(("grant_type", grant_type));
    }
    if let Some(permission) = request.permission.as_deref() {
        form.push(("permission", permission));
    }
    form
}
