//! Defaults for the session renewal contract
//!
//! These match the backend routes the client talks to. Deployments override
//! them through `SessionPolicy` or the probe's TOML config.

/// Renewal endpoint path, relative to the API base URL
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Route name of the login view
pub const DEFAULT_LOGIN_ROUTE: &str = "Login";

/// Query key carrying the post-login redirect target
pub const REDIRECT_QUERY_KEY: &str = "redirect";

/// Envelope code for success
pub const SUCCESS_CODE: i64 = 200;

/// Envelope code meaning the access credential expired
pub const EXPIRED_CODE: i64 = 401;
