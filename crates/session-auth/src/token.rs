//! Refresh-token exchange against the renewal endpoint
//!
//! POSTs `{"refresh_token": ...}` and expects `{"token", "refresh_token"}`
//! back. The backend may wrap that body in the standard
//! `{code, message, data}` envelope; both shapes are accepted. Anything else
//! (transport error, non-2xx, non-200 envelope code, malformed body) is an
//! error, which callers treat as "renewal failed".

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{EXPIRED_CODE, SUCCESS_CODE};
use crate::credentials::CredentialPair;
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
pub struct RenewRequest<'a> {
    pub refresh_token: &'a str,
}

/// Renewed credential pair as returned by the endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct RenewResponse {
    pub token: String,
    pub refresh_token: String,
}

impl From<RenewResponse> for CredentialPair {
    fn from(response: RenewResponse) -> Self {
        CredentialPair::new(response.token, Some(response.refresh_token))
    }
}

/// Exchange a refresh token for a new credential pair.
///
/// `endpoint` is the absolute renewal URL. The request goes out on the raw
/// client with no bearer header, so it can never re-enter the client's own
/// expiry handling.
pub async fn renew_tokens(
    client: &reqwest::Client,
    endpoint: &str,
    refresh: &str,
) -> Result<RenewResponse> {
    let response = client
        .post(endpoint)
        .json(&RenewRequest {
            refresh_token: refresh,
        })
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Error::Http(format!("token renewal timed out: {e}"))
            } else {
                Error::Http(format!("token renewal request failed: {e}"))
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "renewal endpoint returned {status}: {body}"
            )));
        }

        return Err(Error::Renewal(format!(
            "renewal endpoint returned {status}: {body}"
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| Error::Renewal(format!("invalid renewal response: {e}")))?;

    parse_renewal_body(body)
}

/// Unwrap the optional envelope and decode the pair.
fn parse_renewal_body(body: Value) -> Result<RenewResponse> {
    let payload = match body.get("code").and_then(Value::as_i64) {
        Some(SUCCESS_CODE) => body.get("data").cloned().unwrap_or(Value::Null),
        Some(code) => {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("renewal rejected")
                .to_string();
            return Err(if code == EXPIRED_CODE {
                Error::InvalidCredentials(message)
            } else {
                Error::Renewal(format!("code {code}: {message}"))
            });
        }
        None => body,
    };

    serde_json::from_value(payload)
        .map_err(|e| Error::Renewal(format!("invalid renewal response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use tokio::net::TcpListener;

    /// Serve a fixed status and body on `/auth/refresh`, echoing nothing.
    async fn start_renewal_server(status: StatusCode, body: Value) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = axum::Router::new().route(
                "/auth/refresh",
                post(move |axum::Json(req): axum::Json<Value>| {
                    let body = body.clone();
                    async move {
                        assert!(req["refresh_token"].is_string());
                        (status, axum::Json(body))
                    }
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/auth/refresh")
    }

    #[test]
    fn parses_bare_body() {
        let body = serde_json::json!({"token": "at_new", "refresh_token": "rt_new"});
        let renewed = parse_renewal_body(body).unwrap();
        assert_eq!(renewed.token, "at_new");
        assert_eq!(renewed.refresh_token, "rt_new");
    }

    #[test]
    fn parses_enveloped_body() {
        let body = serde_json::json!({
            "code": 200,
            "message": "ok",
            "data": {"token": "at_new", "refresh_token": "rt_new"}
        });
        let renewed = parse_renewal_body(body).unwrap();
        assert_eq!(renewed.token, "at_new");
    }

    #[test]
    fn envelope_401_is_invalid_credentials() {
        let body = serde_json::json!({"code": 401, "message": "refresh token expired"});
        let err = parse_renewal_body(body).unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(ref m) if m == "refresh token expired"));
    }

    #[test]
    fn missing_fields_are_rejected() {
        let body = serde_json::json!({"token": "at_new"});
        assert!(matches!(parse_renewal_body(body), Err(Error::Renewal(_))));
    }

    #[test]
    fn renewed_pair_keeps_refresh_token() {
        let pair: CredentialPair = RenewResponse {
            token: "at".into(),
            refresh_token: "rt".into(),
        }
        .into();
        assert_eq!(pair.refresh.unwrap().expose(), "rt");
    }

    #[tokio::test]
    async fn renew_tokens_returns_new_pair() {
        let url = start_renewal_server(
            StatusCode::OK,
            serde_json::json!({"token": "at_2", "refresh_token": "rt_2"}),
        )
        .await;

        let renewed = renew_tokens(&reqwest::Client::new(), &url, "rt_1")
            .await
            .unwrap();
        assert_eq!(renewed.token, "at_2");
        assert_eq!(renewed.refresh_token, "rt_2");
    }

    #[tokio::test]
    async fn renew_tokens_maps_401_to_invalid_credentials() {
        let url = start_renewal_server(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({"message": "expired"}),
        )
        .await;

        let err = renew_tokens(&reqwest::Client::new(), &url, "rt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err}");
    }

    #[tokio::test]
    async fn renew_tokens_maps_5xx_to_renewal_error() {
        let url = start_renewal_server(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"message": "db down"}),
        )
        .await;

        let err = renew_tokens(&reqwest::Client::new(), &url, "rt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Renewal(_)), "got: {err}");
    }

    #[tokio::test]
    async fn renew_tokens_reports_unreachable_endpoint() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = renew_tokens(
            &reqwest::Client::new(),
            &format!("http://{addr}/auth/refresh"),
            "rt_1",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got: {err}");
    }
}
