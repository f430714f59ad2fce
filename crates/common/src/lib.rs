//! Types shared by the session client crates and the probe binary

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
