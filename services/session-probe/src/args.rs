//! Command-line parsing
//!
//! ```text
//! session-probe [--config PATH] [--metrics] login ACCESS [REFRESH]
//! session-probe [--config PATH] logout
//! session-probe [--config PATH] [--metrics] request METHOD PATH [key=value ...] [--body JSON]
//! ```
//!
//! Repeated `key=value` pairs with the same key become a multi-valued query
//! parameter.

use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "session-probe")]
#[command(about = "Drive the session-renewing API client from the command line")]
#[command(version)]
pub struct Cli {
    /// Config file path (falls back to CONFIG_PATH, then session-probe.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Print Prometheus metrics after the command finishes
    #[arg(long = "metrics", global = true)]
    pub print_metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Store a credential pair, as a completed login would
    Login {
        /// Access token
        access: String,

        /// Refresh token
        refresh: Option<String>,
    },

    /// Clear stored credentials
    Logout,

    /// Dispatch one request through the session client
    Request {
        /// HTTP method (case-insensitive)
        #[arg(value_parser = parse_method)]
        method: Method,

        /// Path relative to the API base URL
        path: String,

        /// Query parameters as key=value
        #[arg(value_parser = parse_query_pair)]
        query: Vec<(String, String)>,

        /// JSON request body
        #[arg(long, value_parser = parse_json)]
        body: Option<Value>,
    },
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid method: {raw}"))
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("query parameter must be key=value, got: {raw}"))
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("not valid JSON: {e}"))
}
