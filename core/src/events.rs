//! Session store event surface.
//!
//! Every state transition in the store is broadcast on its event bus. The
//! event *kind* is the subscription key; the payload carries the new value.
//!
//! Status changes fire twice: once under [`SessionEventKind::StatusChange`]
//! and once under the per-status kind ([`SessionEventKind::Status`]), so a
//! listener can subscribe to "became AUTHORIZED" without filtering.

use crate::error::ClientError;
use crate::state::{SessionStatus, UserProfile};

/// Subscription key for store events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    /// The session status changed. Payload: [`SessionEvent::Status`].
    StatusChange,

    /// The session status changed to this specific status.
    Status(SessionStatus),

    /// A session-level error was stored. Payload: [`SessionEvent::Error`].
    Error,

    /// The user profile was replaced. Payload: [`SessionEvent::User`].
    UserChanged,

    /// The provider reported the primary access token as expired.
    TokenExpired,

    /// The provider reported the primary access token as about to expire.
    TokenExpiring,

    /// A logout was initiated.
    LoggingOut,

    /// The session ended (logout completed or authorization lost).
    AuthorizationTerminated,
}

/// Payload delivered with a store event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// New session status.
    Status(SessionStatus),

    /// New stored error, or `None` when the error was cleared.
    Error(Option<ClientError>),

    /// New user profile, or `None` when it was cleared.
    User(Option<UserProfile>),

    /// Event without a payload.
    Empty,
}

impl SessionEvent {
    /// The status carried by this event, if any.
    #[must_use]
    pub const fn status(&self) -> Option<SessionStatus> {
        match self {
            Self::Status(status) => Some(*status),
            _ => None,
        }
    }

    /// The error carried by this event, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ClientError> {
        match self {
            Self::Error(Some(error)) => Some(error),
            _ => None,
        }
    }
}
