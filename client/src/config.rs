//! Session client configuration.
//!
//! Configuration is an explicitly constructed value passed to
//! [`SessionClient::new`](crate::session::SessionClient::new) — there is no
//! process-wide config singleton. Applications typically build one with the
//! `with_*` methods or load one from environment variables with
//! [`SessionConfig::from_env`].

use std::env;

/// Configuration for a session client instance.
///
/// # Examples
///
/// ```
/// use tokenbroker_client::config::SessionConfig;
///
/// let config = SessionConfig::new(
///     "https://auth.example.com".to_string(),
///     "example-realm".to_string(),
///     "my-client".to_string(),
/// )
/// .with_api_grant_type("urn:ietf:params:oauth:grant-type:uma-ticket".to_string())
/// .with_api_permission("#access".to_string());
///
/// assert!(config.is_valid());
/// assert_eq!(
///     config.token_uri(),
///     "https://auth.example.com/realms/example-realm/protocol/openid-connect/token"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the identity provider (e.g. "https://auth.example.com").
    pub url: String,

    /// Realm on the identity provider. May be empty for providers without
    /// realm-scoped endpoints.
    pub realm: String,

    /// Client identifier registered with the identity provider.
    pub client_id: String,

    /// Redirect path receiving the provider's login response.
    ///
    /// Default: "/callback"
    pub callback_path: String,

    /// Redirect path after logout.
    ///
    /// Default: "/"
    pub logout_path: String,

    /// Path used for silent authentication checks.
    ///
    /// Default: "/silent-renew.html"
    pub silent_auth_path: String,

    /// Response type requested from the provider.
    ///
    /// Default: "id_token token"
    pub response_type: String,

    /// Scope requested from the provider.
    ///
    /// Default: "openid profile"
    pub scope: String,

    /// Start a sign-in automatically when no session exists.
    ///
    /// Default: true
    pub auto_sign_in: bool,

    /// Renew the session silently before it expires.
    ///
    /// Default: true
    pub automatic_silent_renew: bool,

    /// Explicit token-exchange path. When unset, the default provider token
    /// endpoint (`/realms/{realm}/protocol/openid-connect/token`) is used.
    pub token_exchange_path: Option<String>,

    /// `grant_type` form field sent with token-exchange requests. Omitted
    /// from the request entirely when unset or empty.
    pub api_grant_type: Option<String>,

    /// `permission` form field sent with token-exchange requests. Omitted
    /// from the request entirely when unset or empty.
    pub api_permission: Option<String>,
}

impl SessionConfig {
    /// Create a configuration with defaults for the optional fields.
    #[must_use]
    pub fn new(url: String, realm: String, client_id: String) -> Self {
        Self {
            url,
            realm,
            client_id,
            callback_path: "/callback".to_string(),
            logout_path: "/".to_string(),
            silent_auth_path: "/silent-renew.html".to_string(),
            response_type: "id_token token".to_string(),
            scope: "openid profile".to_string(),
            auto_sign_in: true,
            automatic_silent_renew: true,
            token_exchange_path: None,
            api_grant_type: None,
            api_permission: None,
        }
    }

    /// Set the callback path.
    #[must_use]
    pub fn with_callback_path(mut self, path: String) -> Self {
        self.callback_path = path;
        self
    }

    /// Set the post-logout path.
    #[must_use]
    pub fn with_logout_path(mut self, path: String) -> Self {
        self.logout_path = path;
        self
    }

    /// Set the requested scope.
    #[must_use]
    pub fn with_scope(mut self, scope: String) -> Self {
        self.scope = scope;
        self
    }

    /// Set an explicit token-exchange path.
    #[must_use]
    pub fn with_token_exchange_path(mut self, path: String) -> Self {
        self.token_exchange_path = Some(path);
        self
    }

    /// Set the `grant_type` sent with token-exchange requests.
    #[must_use]
    pub fn with_api_grant_type(mut self, grant_type: String) -> Self {
        self.api_grant_type = Some(grant_type);
        self
    }

    /// Set the `permission` sent with token-exchange requests.
    #[must_use]
    pub fn with_api_permission(mut self, permission: String) -> Self {
        self.api_permission = Some(permission);
        self
    }

    /// Disable automatic sign-in.
    #[must_use]
    pub const fn with_auto_sign_in(mut self, enabled: bool) -> Self {
        self.auto_sign_in = enabled;
        self
    }

    /// Enable or disable automatic silent renewal.
    #[must_use]
    pub const fn with_automatic_silent_renew(mut self, enabled: bool) -> Self {
        self.automatic_silent_renew = enabled;
        self
    }

    /// Authority URL: `{url}/realms/{realm}`, or the bare URL when no realm
    /// is configured.
    #[must_use]
    pub fn authority(&self) -> String {
        if self.realm.is_empty() {
            self.url.clone()
        } else {
            format!("{}/realms/{}", self.url, self.realm)
        }
    }

    /// Token-exchange endpoint URI.
    ///
    /// Uses the explicit [`Self::token_exchange_path`] when configured,
    /// otherwise the provider's default token endpoint.
    #[must_use]
    pub fn token_uri(&self) -> String {
        match &self.token_exchange_path {
            Some(path) if !path.is_empty() => format!("{}{path}", self.url),
            _ => format!(
                "{}/realms/{}/protocol/openid-connect/token",
                self.url, self.realm
            ),
        }
    }

    /// Whether the configuration carries the minimum needed to operate.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.url.is_empty() && !self.client_id.is_empty()
    }

    /// `grant_type` value to emit, if configured non-empty.
    #[must_use]
    pub fn effective_grant_type(&self) -> Option<&str> {
        self.api_grant_type
            .as_deref()
            .filter(|value| !value.is_empty())
    }

    /// `permission` value to emit, if configured non-empty.
    #[must_use]
    pub fn effective_permission(&self) -> Option<&str> {
        self.api_permission
            .as_deref()
            .filter(|value| !value.is_empty())
    }

    /// Load a configuration from environment variables prefixed with
    /// `source` (e.g. `OIDC_URL`, `OIDC_REALM`, `OIDC_CLIENT_ID`,
    /// `OIDC_TOKEN_EXCHANGE_PATH`, `OIDC_API_TOKEN_GRANT_TYPE`,
    /// `OIDC_API_TOKEN_PERMISSION`, `OIDC_AUTO_SIGN_IN`,
    /// `OIDC_AUTO_SILENT_RENEW`).
    ///
    /// Missing string variables default to empty; boolean variables accept
    /// `"true"`/`"1"` and `"false"`/`"0"`/`""` and fall back to their
    /// defaults otherwise.
    #[must_use]
    pub fn from_env(source: &str) -> Self {
        let var = |suffix: &str| env::var(format!("{source}_{suffix}")).unwrap_or_default();
        let opt_var = |suffix: &str| {
            let value = var(suffix);
            (!value.is_empty()).then_some(value)
        };

        let mut config = Self::new(var("URL"), var("REALM"), var("CLIENT_ID"));
        if let Some(path) = opt_var("CALLBACK_PATH") {
            config.callback_path = path;
        }
        if let Some(path) = opt_var("LOGOUT_PATH") {
            config.logout_path = path;
        }
        if let Some(path) = opt_var("SILENT_AUTH_PATH") {
            config.silent_auth_path = path;
        }
        if let Some(response_type) = opt_var("RESPONSE_TYPE") {
            config.response_type = response_type;
        }
        if let Some(scope) = opt_var("SCOPE") {
            config.scope = scope;
        }
        config.token_exchange_path = opt_var("TOKEN_EXCHANGE_PATH");
        config.api_grant_type = opt_var("API_TOKEN_GRANT_TYPE");
        config.api_permission = opt_var("API_TOKEN_PERMISSION");
        let raw_var = |suffix: &str| env::var(format!("{source}_{suffix}")).ok();
        config.auto_sign_in = env_value_to_bool(raw_var("AUTO_SIGN_IN"), true);
        config.automatic_silent_renew = env_value_to_bool(raw_var("AUTO_SILENT_RENEW"), true);
        config
    }
}

/// Coerce an environment value to a boolean.
///
/// `""`, `"false"` and `"0"` are false; `"true"` and `"1"` are true; any
/// other value (including an unset variable) yields `default`.
fn env_value_to_bool(value: Option<String>, default: bool) -> bool {
    let Some(value) = value else {
        return default;
    };
    match value.to_lowercase().as_str() {
        "" | "false" | "0" => false,
        "true" | "1" => true,
        _ => default,
    }
}
