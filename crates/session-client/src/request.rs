//! Outgoing request descriptors
//!
//! A `PendingRequest` is an owned copy of everything needed to send (and
//! resend) a call. Replaying after a renewal builds a fresh HTTP request
//! from the descriptor, so nothing mutable is shared between attempts.

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

/// Per-call options: query parameters and extra headers.
///
/// Query parameters keep insertion order and repeat keys for multi-valued
/// parameters, so `tags = ["a", "b"]` goes out as `tags=a&tags=b`.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: HeaderMap,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a multi-valued query parameter as repeated keys.
    pub fn query_all<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let key = key.into();
        self.query
            .extend(values.into_iter().map(|v| (key.clone(), v.to_string())));
        self
    }

    /// Add a query parameter only when a value is present.
    pub fn query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    /// Add an extra header. `Authorization` is managed by the client and
    /// always overwritten when a credential is present.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }
}

/// Immutable description of one API call plus its retry marker.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) body: Option<Value>,
    pub(crate) options: RequestOptions,
    pub(crate) retried: bool,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            options: RequestOptions::default(),
            retried: false,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this descriptor already consumed its renewal-triggered replay.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Descriptor for the single replay after a successful renewal.
    pub(crate) fn into_retry(self) -> Self {
        Self {
            retried: true,
            ..self
        }
    }

    /// Whether this request targets the renewal endpoint itself.
    ///
    /// Compares paths without query string or trailing slash.
    pub(crate) fn targets(&self, refresh_path: &str) -> bool {
        normalize_path(&self.path) == normalize_path(refresh_path)
    }
}

fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Join the API base URL and a request path with exactly one slash.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
