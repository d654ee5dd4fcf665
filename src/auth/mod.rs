//! Credentials consumed by the platform client.
//!
//! How tokens are minted is out of scope; this module only knows how to
//! load them, tell when they are about to expire, and hold the result of
//! a refresh-token exchange.

pub mod token;

pub use token::{CredentialsFile, TokenSet, DEFAULT_REFRESH_MARGIN};
