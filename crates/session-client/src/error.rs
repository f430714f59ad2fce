//! Error types for dispatched requests
//!
//! Every non-success path of the dispatcher ends in exactly one of these.
//! Authentication-class errors only surface after the one allowed renewal
//! and retry have been spent.

/// Errors returned to callers of `SessionClient`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network unreachable, connection reset, or the transport timeout fired.
    #[error("transport error: {message}")]
    Transport { message: String, timeout: bool },

    /// The access credential expired and no renewal was attempted
    /// (the failing request was the renewal call itself).
    #[error("session expired")]
    AuthExpired,

    /// Renewal was attempted and failed, or the single retry was already used.
    #[error("session renewal exhausted: {0}")]
    AuthExhausted(String),

    /// Envelope carried a code other than success or expiry.
    #[error("application error {code}: {message}")]
    Application { code: i64, message: String },

    /// Non-2xx transport status other than 401.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Payload did not decode into the requested type.
    #[error("invalid response payload: {0}")]
    Decode(String),

    #[error("invalid client configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// True for errors that ended in a redirect to the login view.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::AuthExpired | Error::AuthExhausted(_))
    }

    /// Label used for the `outcome` metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            Error::Transport { timeout: true, .. } => "timeout",
            Error::Transport { .. } => "transport",
            Error::AuthExpired => "auth_expired",
            Error::AuthExhausted(_) => "auth_exhausted",
            Error::Application { .. } => "application",
            Error::HttpStatus { .. } => "http_status",
            Error::Decode(_) => "decode",
            Error::Configuration(_) => "configuration",
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_flagged() {
        assert!(Error::AuthExpired.is_auth());
        assert!(Error::AuthExhausted("renewal failed".into()).is_auth());
        assert!(
            !Error::HttpStatus {
                status: 403,
                message: "forbidden".into()
            }
            .is_auth()
        );
    }

    #[test]
    fn display_includes_server_message() {
        let err = Error::Application {
            code: 422,
            message: "build number already exists".into(),
        };
        assert_eq!(
            err.to_string(),
            "application error 422: build number already exists"
        );
    }

    #[test]
    fn timeout_has_its_own_label() {
        let err = Error::Transport {
            message: "deadline elapsed".into(),
            timeout: true,
        };
        assert_eq!(err.label(), "timeout");
    }
}
