//! User-visible notifications
//!
//! Failed calls still reject with a typed error; the notifier is an extra
//! side channel for surfacing a human-readable message (a toast in a UI, a
//! log line in a CLI).

use tracing::warn;

pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);
}

/// Default notifier: emits each message as a `warn` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error(&self, message: &str) {
        warn!(target: "session_client::notify", notice = message, "request failed");
    }
}

/// Message shown once when an expired session forces a re-login.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired, please log in again";

/// Message for transport-level failures with no HTTP response.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error, please check your connection";
