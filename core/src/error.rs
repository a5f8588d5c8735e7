//! Session-level error taxonomy.
//!
//! These are the errors the session store holds and broadcasts. They are
//! distinct from the token-exchange fetch errors, which stay local to the
//! component that performed the fetch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a session-level error.
///
/// The store's error setter compares kinds only: storing a second error of
/// the same kind is a no-op even when the message differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientErrorKind {
    /// Provider initialization failed.
    Init,

    /// Authentication failed.
    Auth,

    /// Silent session renewal failed.
    AuthRefresh,

    /// Loading application data failed.
    Load,

    /// The session ended without an explicit logout.
    UnexpectedAuthChange,

    /// Loading or parsing user profile data failed.
    UserData,
}

impl ClientErrorKind {
    /// Kind name as a static string, for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT_ERROR",
            Self::Auth => "AUTH_ERROR",
            Self::AuthRefresh => "AUTH_REFRESH_ERROR",
            Self::Load => "LOAD_ERROR",
            Self::UnexpectedAuthChange => "UNEXPECTED_AUTH_CHANGE",
            Self::UserData => "USER_DATA_ERROR",
        }
    }
}

impl std::fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-level error: a kind from the fixed taxonomy plus a human-readable
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ClientError {
    /// Error category.
    pub kind: ClientErrorKind,

    /// Human-readable description.
    pub message: String,
}

impl ClientError {
    /// Create an error with an explicit kind.
    #[must_use]
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Provider initialization failure.
    #[must_use]
    pub fn init(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Init, message)
    }

    /// Authentication failure.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Auth, message)
    }

    /// Silent renewal failure.
    #[must_use]
    pub fn auth_refresh(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::AuthRefresh, message)
    }

    /// Data load failure.
    #[must_use]
    pub fn load(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Load, message)
    }

    /// Session ended without an explicit logout.
    #[must_use]
    pub fn unexpected_auth_change(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::UnexpectedAuthChange, message)
    }

    /// User profile data failure.
    #[must_use]
    pub fn user_data(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::UserData, message)
    }
}
