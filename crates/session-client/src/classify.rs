//! Response classification
//!
//! The backend signals credential expiry two ways: a transport-level 401, or
//! a 2xx response whose `{code, message, data}` envelope carries code 401.
//! Both collapse into `Outcome::Expired` here, so the dispatcher has a single
//! branch for expiry no matter how it arrived.

use serde_json::Value;
use session_auth::{EXPIRED_CODE, SUCCESS_CODE};

/// Classified result of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Unwrapped `data` from a success envelope, or the raw body.
    Success(Value),
    /// Access credential expired (transport 401 or envelope code 401).
    Expired,
    /// Envelope with any other code. Non-numeric codes read as 0.
    Rejected { code: i64, message: String },
    /// Non-2xx transport status other than 401.
    Status { status: u16, message: String },
}

/// Classify a response by transport status and body bytes.
pub fn classify(status: u16, body: &[u8]) -> Outcome {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let envelope_code = parsed.as_ref().and_then(|v| v.get("code")).map(code_value);
    let server_message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    if status == 401 || envelope_code == Some(EXPIRED_CODE) {
        return Outcome::Expired;
    }

    if !(200..300).contains(&status) {
        return Outcome::Status {
            status,
            message: status_message(status, server_message.as_deref()),
        };
    }

    match (envelope_code, parsed) {
        (Some(SUCCESS_CODE), Some(mut envelope)) => Outcome::Success(
            envelope
                .get_mut("data")
                .map(Value::take)
                .unwrap_or(Value::Null),
        ),
        (Some(code), _) => Outcome::Rejected {
            code,
            message: server_message.unwrap_or_else(|| "Request failed".to_string()),
        },
        (None, Some(raw)) => Outcome::Success(raw),
        (None, None) if body.is_empty() => Outcome::Success(Value::Null),
        (None, None) => Outcome::Success(Value::String(String::from_utf8_lossy(body).into_owned())),
    }
}

/// Any `code` key makes the body an envelope. Integral numbers keep their
/// value; anything else reads as 0 so it can never pass as success.
fn code_value(code: &Value) -> i64 {
    code.as_i64()
        .or_else(|| {
            code.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        })
        .unwrap_or(0)
}

/// User-visible message for a failed transport status.
///
/// 403/404/500 have fixed wording; other statuses prefer the server's
/// message when it sent one.
pub fn status_message(status: u16, server_message: Option<&str>) -> String {
    match status {
        403 => "You do not have permission to access this resource".to_string(),
        404 => "The requested resource does not exist".to_string(),
        500 => "Internal server error".to_string(),
        _ => server_message
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Request failed: {status}")),
    }
}
