//! Session-renewing API client
//!
//! Wraps an HTTP client so that callers never deal with expired sessions
//! directly. Every request carries the current bearer credential; when the
//! backend reports expiry (status 401 or an envelope with code 401), the
//! client renews the credential once per expiry episode, replays the failed
//! requests, and only sends the user back to the login view when renewal
//! itself fails.
//!
//! Request lifecycle:
//! 1. `SessionClient::get()` etc. builds a `PendingRequest` and attaches the token
//! 2. The response is classified: success, expired, rejected, or failed status
//! 3. Expired → `RenewalCoordinator::renew()` (shared by all concurrent callers)
//! 4. Renewed → the request is replayed once, marked as retried
//! 5. Not renewable → `RedirectDebouncer` logs out and navigates to login once

pub mod classify;
pub mod client;
pub mod epoch;
pub mod error;
pub mod metrics;
pub mod navigation;
pub mod notify;
pub mod redirect;
pub mod renewal;
pub mod request;

pub use classify::{Outcome, classify};
pub use client::{SessionClient, SessionClientBuilder, SessionPolicy};
pub use epoch::LogoutEpoch;
pub use error::{Error, Result};
pub use navigation::{HistoryNavigator, Location, Navigator};
pub use notify::{Notifier, TracingNotifier};
pub use redirect::RedirectDebouncer;
pub use renewal::RenewalCoordinator;
pub use request::{PendingRequest, RequestOptions};
