//! Single-flight credential renewal
//!
//! Many requests can hit an expired access token at once. The first one to
//! call `renew()` opens a renewal episode: the refresh exchange runs in its
//! own task and its outcome is wrapped in a `Shared` future kept in the
//! episode slot. Every caller arriving while the slot is occupied awaits that
//! same future, so one expiry produces exactly one call to the renewal
//! endpoint.
//!
//! Episode lifecycle:
//! 1. `renew()` with an empty slot → spawn exchange task, store episode
//! 2. `renew()` with an occupied slot → join the stored outcome
//! 3. Exchange settles → on success the pair is replaced in the store
//! 4. `grace` after settlement → slot cleared (only if it still holds this episode)
//!
//! The grace period lets callers whose 401 arrives just after settlement
//! pick up the fresh token instead of opening a second episode. The
//! coordinator never clears credentials or navigates; failure is reported
//! as `None` and the dispatcher decides what to do.
//!
//! An episode that settles after a logout (the `LogoutEpoch` moved on since
//! it opened) discards its result: nothing is written to the store and every
//! waiter gets `None`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use common::Secret;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use session_auth::{CredentialPair, CredentialStore};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::epoch::LogoutEpoch;
use crate::metrics;

/// Outcome shared by every caller attached to one episode.
type SharedOutcome = Shared<BoxFuture<'static, Option<Secret<String>>>>;

struct Episode {
    id: u64,
    outcome: SharedOutcome,
}

struct Inner {
    http: reqwest::Client,
    endpoint: String,
    store: Arc<dyn CredentialStore>,
    grace: Duration,
    epoch: LogoutEpoch,
    slot: Mutex<Option<Episode>>,
    next_episode: AtomicU64,
}

/// Coalesces concurrent renewal requests into one exchange per episode.
#[derive(Clone)]
pub struct RenewalCoordinator {
    inner: Arc<Inner>,
}

impl RenewalCoordinator {
    /// `endpoint` is the absolute renewal URL. `grace` is how long a settled
    /// outcome stays joinable before the next episode may start.
    pub fn new(
        http: reqwest::Client,
        endpoint: String,
        store: Arc<dyn CredentialStore>,
        grace: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                endpoint,
                store,
                grace,
                epoch: LogoutEpoch::new(),
                slot: Mutex::new(None),
                next_episode: AtomicU64::new(1),
            }),
        }
    }

    /// Share the logout epoch advanced by the redirect debouncer.
    ///
    /// Must be called before the coordinator is cloned.
    pub fn with_epoch(mut self, epoch: LogoutEpoch) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.epoch = epoch,
            None => warn!("coordinator already shared, logout epoch not attached"),
        }
        self
    }

    /// Renew the access credential, or join the renewal already in flight.
    ///
    /// Returns `None` without any network call when no refresh token is
    /// stored, and `None` when the exchange fails for any reason.
    pub async fn renew(&self) -> Option<Secret<String>> {
        let Some(refresh) = self.inner.store.refresh_token().await else {
            debug!("no refresh token stored, skipping renewal");
            return None;
        };

        let outcome = {
            let mut slot = self.inner.slot.lock().await;
            match slot.as_ref() {
                Some(episode) => {
                    debug!(episode = episode.id, "joining in-flight renewal");
                    episode.outcome.clone()
                }
                None => {
                    let id = self.inner.next_episode.fetch_add(1, Ordering::Relaxed);
                    let epoch = self.inner.epoch.current();
                    debug!(episode = id, epoch, "starting renewal episode");
                    let outcome = self.start_episode(id, epoch, refresh);
                    *slot = Some(Episode {
                        id,
                        outcome: outcome.clone(),
                    });
                    outcome
                }
            }
        };

        outcome.await
    }

    /// Whether an episode currently occupies the slot (in flight or in grace).
    pub async fn is_active(&self) -> bool {
        self.inner.slot.lock().await.is_some()
    }

    fn start_episode(&self, id: u64, epoch: u64, refresh: Secret<String>) -> SharedOutcome {
        let inner = Arc::clone(&self.inner);
        // The exchange runs detached so a cancelled waiter can't abort the
        // episode for everyone else.
        let task = tokio::spawn(async move {
            let outcome = inner.exchange(id, epoch, &refresh).await;
            schedule_release(Arc::downgrade(&inner), id, inner.grace);
            outcome
        });

        async move {
            task.await.unwrap_or_else(|e| {
                warn!(episode = id, error = %e, "renewal task did not complete");
                None
            })
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    async fn exchange(
        &self,
        id: u64,
        epoch: u64,
        refresh: &Secret<String>,
    ) -> Option<Secret<String>> {
        match session_auth::renew_tokens(&self.http, &self.endpoint, refresh.expose()).await {
            Ok(renewed) => {
                if !self.epoch.is_current(epoch) {
                    metrics::record_renewal("discarded");
                    info!(episode = id, "session logged out during renewal, discarding result");
                    return None;
                }
                let pair = CredentialPair::from(renewed);
                let access = pair.access.clone();
                if let Err(e) = self.store.set_tokens(pair).await {
                    warn!(episode = id, error = %e, "failed to persist renewed credentials");
                }
                // A logout racing the write above may have run before it landed
                if !self.epoch.is_current(epoch) {
                    if let Err(e) = self.store.logout().await {
                        warn!(episode = id, error = %e, "failed to clear discarded credentials");
                    }
                    metrics::record_renewal("discarded");
                    info!(episode = id, "session logged out during renewal, discarding result");
                    return None;
                }
                metrics::record_renewal("success");
                info!(episode = id, "credential renewal succeeded");
                Some(access)
            }
            Err(session_auth::Error::InvalidCredentials(msg)) => {
                metrics::record_renewal("rejected");
                warn!(episode = id, error = %msg, "refresh token rejected");
                None
            }
            Err(e) => {
                metrics::record_renewal("failure");
                warn!(episode = id, error = %e, "credential renewal failed");
                None
            }
        }
    }
}

/// Clear the slot `grace` from now, unless a newer episode replaced it.
fn schedule_release(inner: Weak<Inner>, id: u64, grace: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut slot = inner.slot.lock().await;
        if slot.as_ref().is_some_and(|episode| episode.id == id) {
            *slot = None;
            debug!(episode = id, "renewal episode released");
        }
    });
}
