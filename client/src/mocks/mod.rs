//! Mock providers for testing.
//!
//! Available under the default-on `test-utils` feature. These run entirely
//! in memory so session and token flows can be tested at memory speed,
//! without an identity provider or a token-exchange endpoint.

mod login;
mod token_exchange;

pub use login::MockLoginProvider;
pub use token_exchange::MockTokenExchange;
