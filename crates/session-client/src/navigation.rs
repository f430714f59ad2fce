//! Navigation seam used to send the user back to the login view
//!
//! Navigation is fire-and-forget: `navigate_to` returns immediately and the
//! caller never waits on it. `HistoryNavigator` is an in-process router
//! with named routes and a location history, used by the probe binary and
//! the tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use reqwest::Url;
use tracing::debug;

/// Where the application currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Route name, when the path matches a named route.
    pub route: Option<String>,
    /// Path plus query string, e.g. `/builds?page=2`.
    pub full_path: String,
}

impl Location {
    pub fn is_root(&self) -> bool {
        self.full_path == "/" || self.full_path.is_empty()
    }
}

pub trait Navigator: Send + Sync {
    /// Navigate to a named route with query parameters.
    fn navigate_to(&self, route: &str, query: &[(String, String)]);

    /// Current location.
    fn current_location(&self) -> Location;
}

/// In-process navigator keeping every visited location.
pub struct HistoryNavigator {
    routes: HashMap<String, String>,
    history: Mutex<Vec<Location>>,
}

impl HistoryNavigator {
    /// Navigator starting at `full_path`, with `Login` mapped to `/login`.
    pub fn new(full_path: impl Into<String>) -> Self {
        let mut routes = HashMap::new();
        routes.insert(
            session_auth::DEFAULT_LOGIN_ROUTE.to_string(),
            "/login".to_string(),
        );
        let start = Self::resolve_with(&routes, &full_path.into());
        Self {
            routes,
            history: Mutex::new(vec![start]),
        }
    }

    /// Register a named route.
    pub fn with_route(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.routes.insert(name.into(), path.into());
        let history = self
            .history
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for location in history.iter_mut() {
            let full_path = std::mem::take(&mut location.full_path);
            *location = Self::resolve_with(&self.routes, &full_path);
        }
        self
    }

    /// Every location visited, oldest first.
    pub fn history(&self) -> Vec<Location> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of navigations performed since construction.
    pub fn navigations(&self) -> usize {
        self.history().len().saturating_sub(1)
    }

    fn resolve_with(routes: &HashMap<String, String>, full_path: &str) -> Location {
        let path = full_path.split('?').next().unwrap_or(full_path);
        let route = routes
            .iter()
            .find(|(_, route_path)| route_path.as_str() == path)
            .map(|(name, _)| name.clone());
        Location {
            route,
            full_path: full_path.to_string(),
        }
    }
}

impl Navigator for HistoryNavigator {
    fn navigate_to(&self, route: &str, query: &[(String, String)]) {
        let path = self
            .routes
            .get(route)
            .cloned()
            .unwrap_or_else(|| format!("/{}", route.to_lowercase()));
        let full_path = with_query(&path, query);
        debug!(route, full_path = %full_path, "navigating");

        let location = Location {
            route: Some(route.to_string()),
            full_path,
        };
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(location);
    }

    fn current_location(&self) -> Location {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
            .unwrap_or(Location {
                route: None,
                full_path: "/".to_string(),
            })
    }
}

/// Append form-encoded query pairs to a path.
fn with_query(path: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    match Url::parse("http://navigation.local/") {
        Ok(mut url) => {
            url.set_path(path);
            url.query_pairs_mut().extend_pairs(query);
            match url.query() {
                Some(q) => format!("{}?{q}", url.path()),
                None => url.path().to_string(),
            }
        }
        Err(_) => path.to_string(),
    }
}
