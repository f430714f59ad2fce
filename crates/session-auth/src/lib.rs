//! Session credential storage and renewal
//!
//! Holds the credential pair (access + refresh token) a client attaches to
//! outgoing API calls, and performs the refresh-token exchange against the
//! renewal endpoint. The crate has no knowledge of request dispatch or
//! navigation; `session-client` builds those on top.
//!
//! Credential flow:
//! 1. Login stores a pair via `CredentialStore::set_tokens()`
//! 2. Every request reads `CredentialStore::access_token()`
//! 3. On expiry the client calls `token::renew_tokens()` with the refresh token
//! 4. The renewed pair replaces the old one via `set_tokens()`
//! 5. Terminal failure clears everything via `CredentialStore::logout()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{Error, Result};
pub use token::{RenewRequest, RenewResponse, renew_tokens};
