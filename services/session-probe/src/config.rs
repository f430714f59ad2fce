//! Configuration types and loading
//!
//! Config precedence: CLI `--config` > `CONFIG_PATH` env > `session-probe.toml`.
//! `API_BASE_URL` overrides `[api] base_url` from the file.

use serde::Deserialize;
use session_client::SessionPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
}

/// Remote API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Credential storage, renewal and redirect settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// JSON file holding the credential pair.
    pub credentials_file: PathBuf,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_route")]
    pub login_route: String,
    #[serde(default = "default_renewal_grace_ms")]
    pub renewal_grace_ms: u64,
    #[serde(default = "default_redirect_suppression_ms")]
    pub redirect_suppression_ms: u64,
    /// Location the probe pretends to be on, carried into login redirects.
    #[serde(default = "default_location")]
    pub location: String,
}

fn default_timeout() -> u64 {
    30
}

fn default_refresh_path() -> String {
    session_auth::DEFAULT_REFRESH_PATH.to_string()
}

fn default_login_route() -> String {
    session_auth::DEFAULT_LOGIN_ROUTE.to_string()
}

fn default_renewal_grace_ms() -> u64 {
    100
}

fn default_redirect_suppression_ms() -> u64 {
    1000
}

fn default_location() -> String {
    "/".to_string()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("API_BASE_URL") {
            config.api.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.session.renewal_grace_ms == 0 {
            return Err(common::Error::Config(
                "renewal_grace_ms must be greater than 0".into(),
            ));
        }

        if self.session.redirect_suppression_ms == 0 {
            return Err(common::Error::Config(
                "redirect_suppression_ms must be greater than 0".into(),
            ));
        }

        if !self.session.refresh_path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "refresh_path must start with '/', got: {}",
                self.session.refresh_path
            )));
        }

        Ok(())
    }

    /// Session policy for the client builder.
    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            refresh_path: self.session.refresh_path.clone(),
            login_route: self.session.login_route.clone(),
            renewal_grace: Duration::from_millis(self.session.renewal_grace_ms),
            redirect_suppression: Duration::from_millis(self.session.redirect_suppression_ms),
            timeout: Duration::from_secs(self.api.timeout_secs),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-probe.toml")
    }
}
