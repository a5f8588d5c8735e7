//! Token-exchange and request error types.
//!
//! Every layer of the exchange path returns `Result<_, FetchError>`; the
//! reactive wrappers absorb these into their local error state instead of
//! propagating them, so application code polls for errors rather than
//! catching them.

use thiserror::Error;

/// Failure of a token-exchange or authorized-request operation.
///
/// The variants mirror the failure taxonomy of the exchange endpoint:
/// transport failure, non-success HTTP status, malformed body, a response
/// that did not contain the requested audience, and attempting an exchange
/// without an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request never produced an HTTP response.
    #[error("Network or CORS error occurred")]
    Network {
        /// Transport-level detail, for logs.
        detail: String,
    },

    /// The endpoint answered with a non-success status.
    #[error("{status_text}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Status reason phrase.
        status_text: String,
        /// Response body text.
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("Returned data is not valid json")]
    InvalidJson {
        /// Parser detail, for logs.
        detail: String,
    },

    /// The response parsed, but carried no token for the requested audience.
    #[error("response contained no token for audience \"{audience}\"")]
    MissingAudience {
        /// The audience that was requested.
        audience: String,
    },

    /// No authenticated session; there is no access token to exchange.
    #[error("no authenticated session")]
    Unauthorized,
}

impl FetchError {
    /// HTTP status code, when the failure was an HTTP-level rejection.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable message for display, with the HTTP status appended
    /// when one is available.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Http { status, .. } => format!("{self} {status}"),
            _ => self.to_string(),
        }
    }
}
