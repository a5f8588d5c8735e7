//! # Tokenbroker Core
//!
//! Core state and eventing primitives for the tokenbroker client engine.
//!
//! This crate holds the pieces with no I/O of their own:
//!
//! - **Event bus**: synchronous pub/sub keyed by event kind
//! - **Session state store**: status state machine, error slot, user
//!   profile cache, and the audience → token map
//! - **Data model**: [`state::SessionStatus`], [`error::ClientError`], and
//!   the store event surface
//!
//! Everything that talks to the network (the identity-provider seam, the
//! token-exchange client, the reactive wrappers) lives in the companion
//! `tokenbroker-client` crate and drives this one through its accessors.
//!
//! ## Example
//!
//! ```
//! use tokenbroker_core::events::SessionEventKind;
//! use tokenbroker_core::state::SessionStatus;
//! use tokenbroker_core::store::SessionStore;
//!
//! let store = SessionStore::new();
//! let _subscription = store.subscribe(SessionEventKind::StatusChange, |event| {
//!     println!("status is now {:?}", event.status());
//! });
//!
//! store.set_status(SessionStatus::Initializing);
//! store.set_status(SessionStatus::Authorized);
//! assert!(store.is_authenticated());
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod error;
pub mod event_bus;
pub mod events;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use error::{ClientError, ClientErrorKind};
pub use event_bus::{EventBus, Subscription};
pub use events::{SessionEvent, SessionEventKind};
pub use state::{SessionStatus, TokenMap, UserProfile};
pub use store::SessionStore;
