//! Expired-session redirect
//!
//! When a session can't be recovered, the user is logged out and sent to
//! the login view, carrying the location they were on so they can return
//! after logging in. A burst of failing requests triggers this once: the
//! first trigger wins and later ones inside the suppression window are
//! ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use session_auth::{CredentialStore, REDIRECT_QUERY_KEY};
use tracing::{debug, info, warn};

use crate::epoch::LogoutEpoch;
use crate::metrics;
use crate::navigation::Navigator;
use crate::notify::{Notifier, SESSION_EXPIRED_MESSAGE};

struct Inner {
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    login_route: String,
    suppression: Duration,
    epoch: LogoutEpoch,
    redirecting: AtomicBool,
}

/// At-most-once-per-window logout and login redirect.
#[derive(Clone)]
pub struct RedirectDebouncer {
    inner: Arc<Inner>,
}

impl RedirectDebouncer {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
        login_route: impl Into<String>,
        suppression: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                navigator,
                notifier,
                login_route: login_route.into(),
                suppression,
                epoch: LogoutEpoch::new(),
                redirecting: AtomicBool::new(false),
            }),
        }
    }

    /// Advance `epoch` on every logout so renewals opened earlier discard
    /// their result. Must be called before the debouncer is cloned.
    pub fn with_epoch(mut self, epoch: LogoutEpoch) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.epoch = epoch,
            None => warn!("debouncer already shared, logout epoch not attached"),
        }
        self
    }

    /// Log out and navigate to the login view, unless a redirect already
    /// fired within the suppression window.
    ///
    /// Returns `true` when this call performed the redirect. Navigation is
    /// skipped when the current location is already the login route, but the
    /// credentials are still cleared and the window still starts.
    pub async fn trigger_expired_session_redirect(&self) -> bool {
        if self.inner.redirecting.swap(true, Ordering::SeqCst) {
            debug!("redirect already in progress, suppressing");
            return false;
        }

        let epoch = self.inner.epoch.advance();
        debug!(epoch, "logout epoch advanced");
        if let Err(e) = self.inner.store.logout().await {
            warn!(error = %e, "failed to clear credentials during redirect");
        }

        let current = self.inner.navigator.current_location();
        if current.route.as_deref() == Some(self.inner.login_route.as_str()) {
            debug!("already on login view, skipping navigation");
        } else {
            let query = if current.is_root() {
                Vec::new()
            } else {
                vec![(REDIRECT_QUERY_KEY.to_string(), current.full_path.clone())]
            };
            info!(
                from = %current.full_path,
                to = %self.inner.login_route,
                "session expired, redirecting to login"
            );
            self.inner.navigator.navigate_to(&self.inner.login_route, &query);
            self.inner.notifier.error(SESSION_EXPIRED_MESSAGE);
            metrics::record_redirect();
        }

        schedule_reset(Arc::downgrade(&self.inner), self.inner.suppression);
        true
    }

    /// Whether a redirect fired within the current suppression window.
    pub fn is_redirecting(&self) -> bool {
        self.inner.redirecting.load(Ordering::SeqCst)
    }
}

fn schedule_reset(inner: Weak<Inner>, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if let Some(inner) = inner.upgrade() {
            inner.redirecting.store(false, Ordering::SeqCst);
            debug!("redirect suppression window closed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::HistoryNavigator;
    use session_auth::MemoryCredentialStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn error(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    struct Harness {
        debouncer: RedirectDebouncer,
        store: Arc<MemoryCredentialStore>,
        navigator: Arc<HistoryNavigator>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(start: &str) -> Harness {
        let store = Arc::new(MemoryCredentialStore::with_tokens(
            "at_old",
            Some("rt_old".into()),
        ));
        let navigator = Arc::new(HistoryNavigator::new(start));
        let notifier = Arc::new(RecordingNotifier::default());
        let debouncer = RedirectDebouncer::new(
            store.clone(),
            navigator.clone(),
            notifier.clone(),
            session_auth::DEFAULT_LOGIN_ROUTE,
            Duration::from_millis(1000),
        );
        Harness {
            debouncer,
            store,
            navigator,
            notifier,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_carries_current_location() {
        let h = harness("/builds?page=2");

        assert!(h.debouncer.trigger_expired_session_redirect().await);

        assert!(h.store.current().await.is_none());
        let location = h.navigator.current_location();
        assert_eq!(location.route.as_deref(), Some("Login"));
        assert_eq!(location.full_path, "/login?redirect=%2Fbuilds%3Fpage%3D2");
        assert_eq!(
            *h.notifier.messages.lock().unwrap(),
            vec![SESSION_EXPIRED_MESSAGE.to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn root_location_omits_redirect_target() {
        let h = harness("/");

        h.debouncer.trigger_expired_session_redirect().await;

        assert_eq!(h.navigator.current_location().full_path, "/login");
    }

    #[tokio::test(start_paused = true)]
    async fn burst_produces_one_navigation() {
        let h = harness("/builds");

        let mut fired = 0;
        for _ in 0..5 {
            if h.debouncer.trigger_expired_session_redirect().await {
                fired += 1;
            }
        }

        assert_eq!(fired, 1);
        assert_eq!(h.navigator.navigations(), 1);
        assert_eq!(h.notifier.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_reopens_after_suppression_delay() {
        let h = harness("/builds");

        assert!(h.debouncer.trigger_expired_session_redirect().await);
        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(h.debouncer.is_redirecting());
        assert!(!h.debouncer.trigger_expired_session_redirect().await);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!h.debouncer.is_redirecting());

        // User logs back in and returns to the builds view
        h.navigator.navigate_to("Builds", &[]);
        assert!(h.debouncer.trigger_expired_session_redirect().await);

        let logins: Vec<_> = h
            .navigator
            .history()
            .into_iter()
            .filter(|location| location.route.as_deref() == Some("Login"))
            .collect();
        assert_eq!(logins.len(), 2);
        assert_eq!(logins[1].full_path, "/login?redirect=%2Fbuilds");
        assert_eq!(h.notifier.messages.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn each_logout_advances_epoch() {
        let epoch = LogoutEpoch::new();
        let h = harness("/builds");
        let debouncer = h.debouncer.with_epoch(epoch.clone());
        let before = epoch.current();

        assert!(debouncer.trigger_expired_session_redirect().await);
        assert!(!debouncer.trigger_expired_session_redirect().await);

        assert_eq!(epoch.current(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_on_login_clears_credentials_without_navigating() {
        let h = harness("/login");

        assert!(h.debouncer.trigger_expired_session_redirect().await);

        assert!(h.store.current().await.is_none());
        assert_eq!(h.navigator.navigations(), 0);
        assert!(h.notifier.messages.lock().unwrap().is_empty());
        assert!(h.debouncer.is_redirecting());
    }
}
