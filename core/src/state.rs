//! Session state types.
//!
//! This module defines the data model shared across the engine: the session
//! status state machine, the opaque user profile record, and the audience →
//! token map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque user profile record.
///
/// The identity provider owns the shape of this data; the engine stores and
/// forwards it without interpreting individual claims.
pub type UserProfile = serde_json::Map<String, serde_json::Value>;

/// Mapping from audience to the API access token scoped to it.
pub type TokenMap = HashMap<String, String>;

/// Session status state machine.
///
/// ```text
/// NONE → INITIALIZING → {AUTHORIZED, UNAUTHORIZED}
///                          AUTHORIZED ⇄ UNAUTHORIZED
/// ```
///
/// `None` and `Initializing` are transient; `Authorized` and `Unauthorized`
/// are stable until the next transition. The store does not validate that a
/// transition follows this graph; callers drive it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Initial state, before initialization has started.
    #[default]
    None,

    /// Provider initialization (silent login / callback handling) running.
    Initializing,

    /// A valid session exists.
    Authorized,

    /// Initialization finished without a session, or the session ended.
    Unauthorized,
}

impl SessionStatus {
    /// Whether this status represents an authenticated session.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authorized)
    }

    /// Whether initialization has completed (successfully or not).
    #[must_use]
    pub const fn is_initialized(self) -> bool {
        matches!(self, Self::Authorized | Self::Unauthorized)
    }

    /// Status name as a static string, for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Initializing => "INITIALIZING",
            Self::Authorized => "AUTHORIZED",
            Self::Unauthorized => "UNAUTHORIZED",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_none() {
        assert_eq!(SessionStatus::default(), SessionStatus::None);
    }

    #[test]
    fn test_is_authenticated() {
        assert!(SessionStatus::Authorized.is_authenticated());
        assert!(!SessionStatus::Unauthorized.is_authenticated());
        assert!(!SessionStatus::Initializing.is_authenticated());
        assert!(!SessionStatus::None.is_authenticated());
    }

    #[test]
    fn test_is_initialized() {
        assert!(SessionStatus::Authorized.is_initialized());
        assert!(SessionStatus::Unauthorized.is_initialized());
        assert!(!SessionStatus::Initializing.is_initialized());
        assert!(!SessionStatus::None.is_initialized());
    }
}
