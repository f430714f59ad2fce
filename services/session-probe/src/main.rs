//! Session probe
//!
//! Command-line driver for the session client:
//! 1. Loads configuration and the credential file
//! 2. Stores or clears credentials (`login` / `logout`), or
//! 3. Dispatches one request, renewing the session if it expired
//! 4. Prints the unwrapped payload as JSON on stdout

mod args;
mod config;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use session_auth::{CredentialPair, CredentialStore, FileCredentialStore};
use session_client::{HistoryNavigator, Navigator, PendingRequest, RequestOptions, SessionClient};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::args::{Cli, Command};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr so stdout carries only the payload
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args = Cli::parse();
    let prometheus = metrics::install_recorder()?;

    let config_path = Config::resolve_path(args.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        base_url = %config.api.base_url,
        credentials_file = %config.session.credentials_file.display(),
        refresh_path = %config.session.refresh_path,
        "configuration loaded"
    );

    let outcome = run(&config, args.command).await;

    if args.print_metrics {
        print!("{}", prometheus.render());
    }

    if let Some(payload) = outcome? {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}

/// Execute one command. Returns the payload for requests, `None` otherwise.
async fn run(config: &Config, command: Command) -> Result<Option<Value>> {
    let store = Arc::new(
        FileCredentialStore::load(config.session.credentials_file.clone())
            .await
            .with_context(|| {
                format!(
                    "failed to open credentials file {}",
                    config.session.credentials_file.display()
                )
            })?,
    );

    match command {
        Command::Login { access, refresh } => {
            store
                .set_tokens(CredentialPair::new(access, refresh))
                .await
                .context("failed to store credentials")?;
            info!("credentials stored");
            Ok(None)
        }
        Command::Logout => {
            store.logout().await.context("failed to clear credentials")?;
            info!("credentials cleared");
            Ok(None)
        }
        Command::Request {
            method,
            path,
            query,
            body,
        } => {
            let navigator = Arc::new(HistoryNavigator::new(config.session.location.clone()));
            let client = SessionClient::builder()
                .base_url(config.api.base_url.clone())
                .store(store)
                .navigator(navigator.clone())
                .policy(config.policy())
                .build()
                .context("failed to build session client")?;

            let options = query
                .into_iter()
                .fold(RequestOptions::new(), |options, (key, value)| {
                    options.query(key, value)
                });
            let mut request = PendingRequest::new(method, path).with_options(options);
            if let Some(body) = body {
                request = request.with_body(body);
            }

            match client.send(request).await {
                Ok(payload) => Ok(Some(payload)),
                Err(e) => {
                    if e.is_auth() {
                        warn!(
                            location = %navigator.current_location().full_path,
                            "session ended, log in again with `session-probe login`"
                        );
                    }
                    Err(e).context("request failed")
                }
            }
        }
    }
}
