//! Request dispatcher
//!
//! `SessionClient` is the public surface. Each call:
//!
//! 1. Reads the access credential and attaches it as a bearer header
//! 2. Sends the request and classifies the response (see `classify`)
//! 3. On expiry, asks the renewal coordinator for a new credential and
//!    replays the request once with it
//! 4. When recovery is impossible, triggers the login redirect and fails
//!    with an auth error
//!
//! Non-auth failures are never retried: they raise a notification and
//! return a typed error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::Secret;
use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use session_auth::{CredentialStore, DEFAULT_LOGIN_ROUTE, DEFAULT_REFRESH_PATH};
use tracing::{Instrument, debug, info_span, warn};

use crate::classify::{Outcome, classify};
use crate::epoch::LogoutEpoch;
use crate::error::{Error, Result};
use crate::metrics;
use crate::navigation::Navigator;
use crate::notify::{NETWORK_ERROR_MESSAGE, Notifier, TracingNotifier};
use crate::redirect::RedirectDebouncer;
use crate::renewal::RenewalCoordinator;
use crate::request::{PendingRequest, RequestOptions, join_url};

pub const DEFAULT_RENEWAL_GRACE: Duration = Duration::from_millis(100);
pub const DEFAULT_REDIRECT_SUPPRESSION: Duration = Duration::from_millis(1000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for renewal and redirect behaviour.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Path of the renewal endpoint, relative to the base URL.
    pub refresh_path: String,
    /// Route name of the login view.
    pub login_route: String,
    /// How long a settled renewal stays joinable.
    pub renewal_grace: Duration,
    /// How long further redirects are suppressed after one fires.
    pub redirect_suppression: Duration,
    /// Per-request transport timeout. Ignored when a custom HTTP client is supplied.
    pub timeout: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            renewal_grace: DEFAULT_RENEWAL_GRACE,
            redirect_suppression: DEFAULT_REDIRECT_SUPPRESSION,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SessionPolicy {
    fn validate(&self) -> Result<()> {
        if !self.refresh_path.starts_with('/') {
            return Err(Error::Configuration(format!(
                "refresh path must start with '/', got {:?}",
                self.refresh_path
            )));
        }
        if self.login_route.is_empty() {
            return Err(Error::Configuration("login route must not be empty".into()));
        }
        if self.renewal_grace.is_zero() || self.redirect_suppression.is_zero() {
            return Err(Error::Configuration(
                "renewal grace and redirect suppression must be non-zero".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::Configuration("timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for `SessionClient`.
#[derive(Default)]
pub struct SessionClientBuilder {
    base_url: Option<String>,
    store: Option<Arc<dyn CredentialStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    notifier: Option<Arc<dyn Notifier>>,
    http: Option<reqwest::Client>,
    policy: SessionPolicy,
}

impl SessionClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Defaults to `TracingNotifier`.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Use a preconfigured HTTP client instead of building one from the policy.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<SessionClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("base URL is required".into()))?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Configuration(format!(
                "base URL must use http or https, got {base_url:?}"
            )));
        }
        let store = self
            .store
            .ok_or_else(|| Error::Configuration("credential store is required".into()))?;
        let navigator = self
            .navigator
            .ok_or_else(|| Error::Configuration("navigator is required".into()))?;
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier) as Arc<dyn Notifier>);
        self.policy.validate()?;

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(self.policy.timeout)
                .build()
                .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?,
        };

        let epoch = LogoutEpoch::new();
        let renewal = RenewalCoordinator::new(
            http.clone(),
            join_url(&base_url, &self.policy.refresh_path),
            store.clone(),
            self.policy.renewal_grace,
        )
        .with_epoch(epoch.clone());
        let redirect = RedirectDebouncer::new(
            store.clone(),
            navigator,
            notifier.clone(),
            self.policy.login_route.clone(),
            self.policy.redirect_suppression,
        )
        .with_epoch(epoch);

        Ok(SessionClient {
            inner: Arc::new(Inner {
                http,
                base_url,
                store,
                notifier,
                renewal,
                redirect,
                policy: self.policy,
            }),
        })
    }
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    renewal: RenewalCoordinator,
    redirect: RedirectDebouncer,
    policy: SessionPolicy,
}

/// API client that renews expired sessions transparently.
///
/// Cheap to clone; clones share the credential store, the renewal episode
/// and the redirect window.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl SessionClient {
    pub fn builder() -> SessionClientBuilder {
        SessionClientBuilder::default()
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.inner.policy
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        self.call(PendingRequest::new(Method::GET, path).with_options(options))
            .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call_with_body(Method::POST, path, body, options).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call_with_body(Method::PUT, path, body, options).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call_with_body(Method::PATCH, path, body, options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.call(PendingRequest::new(Method::DELETE, path).with_options(options))
            .await
    }

    /// Dispatch a request and return the unwrapped payload as JSON.
    pub async fn send(&self, request: PendingRequest) -> Result<Value> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        let span = info_span!(
            "session_request",
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
        );
        let method = request.method.to_string();
        let started = Instant::now();

        let result = self.dispatch(request).instrument(span).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        metrics::record_request(&method, outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn call_with_body<T, B>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)
            .map_err(|e| Error::Decode(format!("request body is not serializable: {e}")))?;
        self.call(
            PendingRequest::new(method, path)
                .with_body(body)
                .with_options(options),
        )
        .await
    }

    async fn call<T: DeserializeOwned>(&self, request: PendingRequest) -> Result<T> {
        let payload = self.send(request).await?;
        serde_json::from_value(payload).map_err(|e| Error::Decode(e.to_string()))
    }

    async fn dispatch(&self, mut request: PendingRequest) -> Result<Value> {
        let mut credential = self.inner.store.access_token().await;

        // At most two passes: recover() refuses a request that already replayed.
        loop {
            match self.attempt(&request, credential.as_ref()).await? {
                Outcome::Success(payload) => return Ok(payload),
                Outcome::Expired => {
                    let (retry, renewed) = self.recover(request).await?;
                    request = retry;
                    credential = Some(renewed);
                }
                Outcome::Rejected { code, message } => {
                    warn!(code, reason = %message, "application error");
                    self.inner.notifier.error(&message);
                    return Err(Error::Application { code, message });
                }
                Outcome::Status { status, message } => {
                    warn!(status, reason = %message, "request failed");
                    self.inner.notifier.error(&message);
                    return Err(Error::HttpStatus { status, message });
                }
            }
        }
    }

    /// Decide what an expired response means for this request.
    ///
    /// Returns the replay descriptor plus the credential to send it with, or
    /// the auth error after triggering the login redirect.
    async fn recover(&self, request: PendingRequest) -> Result<(PendingRequest, Secret<String>)> {
        if request.targets(&self.inner.policy.refresh_path) {
            warn!("renewal endpoint reported an expired session");
            self.inner.redirect.trigger_expired_session_redirect().await;
            return Err(Error::AuthExpired);
        }

        if request.is_retried() {
            warn!("request expired again after renewal");
            self.inner.redirect.trigger_expired_session_redirect().await;
            return Err(Error::AuthExhausted("retry already consumed".into()));
        }

        match self.inner.renewal.renew().await {
            Some(renewed) => {
                debug!("replaying request with renewed credential");
                metrics::record_retry();
                Ok((request.into_retry(), renewed))
            }
            None => {
                self.inner.redirect.trigger_expired_session_redirect().await;
                Err(Error::AuthExhausted("session renewal failed".into()))
            }
        }
    }

    async fn attempt(
        &self,
        request: &PendingRequest,
        credential: Option<&Secret<String>>,
    ) -> Result<Outcome> {
        let url = join_url(&self.inner.base_url, &request.path);
        let mut headers = request.options.headers.clone();
        if credential.is_some() {
            headers.remove(AUTHORIZATION);
        }

        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), &url)
            .headers(headers);
        if !request.options.query.is_empty() {
            builder = builder.query(&request.options.query);
        }
        if let Some(token) = credential {
            builder = builder.bearer_auth(token.expose());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        debug!(
            status,
            bytes = body.len(),
            retried = request.is_retried(),
            "response received"
        );

        Ok(classify(status, &body))
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        let timeout = e.is_timeout();
        warn!(error = %e, timeout, "transport failure");
        self.inner.notifier.error(NETWORK_ERROR_MESSAGE);
        Error::Transport {
            message: e.to_string(),
            timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::HistoryNavigator;
    use session_auth::MemoryCredentialStore;

    fn builder() -> SessionClientBuilder {
        SessionClient::builder()
            .base_url("http://127.0.0.1:9")
            .store(Arc::new(MemoryCredentialStore::new()))
            .navigator(Arc::new(HistoryNavigator::new("/")))
    }

    #[test]
    fn default_policy_values() {
        let policy = SessionPolicy::default();
        assert_eq!(policy.refresh_path, "/auth/refresh");
        assert_eq!(policy.login_route, "Login");
        assert_eq!(policy.renewal_grace, Duration::from_millis(100));
        assert_eq!(policy.redirect_suppression, Duration::from_millis(1000));
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn builds_with_required_parts() {
        let client = builder().build().unwrap();
        assert_eq!(client.policy().refresh_path, "/auth/refresh");
    }

    #[tokio::test]
    async fn missing_store_is_rejected() {
        let result = SessionClient::builder()
            .base_url("http://127.0.0.1:9")
            .navigator(Arc::new(HistoryNavigator::new("/")))
            .build();
        assert!(matches!(result, Err(Error::Configuration(msg)) if msg.contains("store")));
    }

    #[tokio::test]
    async fn missing_navigator_is_rejected() {
        let result = SessionClient::builder()
            .base_url("http://127.0.0.1:9")
            .store(Arc::new(MemoryCredentialStore::new()))
            .build();
        assert!(matches!(result, Err(Error::Configuration(msg)) if msg.contains("navigator")));
    }

    #[tokio::test]
    async fn non_http_base_url_is_rejected() {
        let result = builder().base_url("ftp://example.com").build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn relative_refresh_path_is_rejected() {
        let policy = SessionPolicy {
            refresh_path: "auth/refresh".into(),
            ..SessionPolicy::default()
        };
        let result = builder().policy(policy).build();
        assert!(matches!(result, Err(Error::Configuration(msg)) if msg.contains("refresh path")));
    }

    #[tokio::test]
    async fn zero_delays_are_rejected() {
        let policy = SessionPolicy {
            renewal_grace: Duration::ZERO,
            ..SessionPolicy::default()
        };
        assert!(builder().policy(policy).build().is_err());

        let policy = SessionPolicy {
            timeout: Duration::ZERO,
            ..SessionPolicy::default()
        };
        assert!(builder().policy(policy).build().is_err());
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        // Port 9 (discard) is closed on loopback in test environments.
        let client = builder().build().unwrap();
        let err = client
            .get::<Value>("/builds", RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { timeout: false, .. }));
    }
}
