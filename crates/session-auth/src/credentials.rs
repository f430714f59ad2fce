//! Credential storage for the session token pair
//!
//! `CredentialStore` is the seam the client reads from on every request and
//! writes to after a renewal. Two implementations ship here:
//!
//! - `MemoryCredentialStore`: process-local, for embedding and tests
//! - `FileCredentialStore`: a JSON file written atomically (temp file +
//!   rename, 0600), so a crash mid-write never leaves a torn token pair
//!
//! Writes are serialized by a tokio Mutex. A pair is always replaced as a
//! whole; there is no way to update the access token without the refresh
//! token.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Access credential plus the optional refresh credential it was issued with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: Secret<String>,
    pub refresh: Option<Secret<String>>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: refresh.map(Secret::new),
        }
    }
}

/// Source of truth for the current credential pair.
///
/// Uses `Pin<Box<dyn Future>>` return types so the store can be shared as
/// `Arc<dyn CredentialStore>` between the dispatcher, the renewal coordinator
/// and the redirect debouncer.
pub trait CredentialStore: Send + Sync {
    /// Current access credential, if logged in.
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Option<Secret<String>>> + Send + '_>>;

    /// Current refresh credential, if one was issued.
    fn refresh_token(&self) -> Pin<Box<dyn Future<Output = Option<Secret<String>>> + Send + '_>>;

    /// Replace the stored pair as a single unit.
    fn set_tokens(&self, pair: CredentialPair) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Clear all credentials.
    fn logout(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<Option<CredentialPair>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a pair (e.g. from a completed login).
    pub fn with_tokens(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            state: Mutex::new(Some(CredentialPair::new(access, refresh))),
        }
    }

    /// Snapshot of the stored pair.
    pub async fn current(&self) -> Option<CredentialPair> {
        self.state.lock().await.clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Option<Secret<String>>> + Send + '_>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .as_ref()
                .map(|pair| pair.access.clone())
        })
    }

    fn refresh_token(&self) -> Pin<Box<dyn Future<Output = Option<Secret<String>>> + Send + '_>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .as_ref()
                .and_then(|pair| pair.refresh.clone())
        })
    }

    fn set_tokens(&self, pair: CredentialPair) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            *self.state.lock().await = Some(pair);
            debug!("replaced in-memory credential pair");
            Ok(())
        })
    }

    fn logout(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            *self.state.lock().await = None;
            debug!("cleared in-memory credentials");
            Ok(())
        })
    }
}

/// On-disk shape of the credential file. `null` means logged out.
#[derive(Debug, Serialize, Deserialize)]
struct StoredPair {
    access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
}

impl From<&CredentialPair> for StoredPair {
    fn from(pair: &CredentialPair) -> Self {
        Self {
            access: pair.access.expose().clone(),
            refresh: pair.refresh.as_ref().map(|r| r.expose().clone()),
        }
    }
}

impl From<StoredPair> for CredentialPair {
    fn from(stored: StoredPair) -> Self {
        CredentialPair::new(stored.access, stored.refresh)
    }
}

/// Credential store backed by a JSON file.
///
/// Reads are served from memory; every write persists the whole file before
/// returning.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<Option<CredentialPair>>,
}

impl FileCredentialStore {
    /// Load credentials from the given file path.
    ///
    /// A missing file is a cold start: the store begins logged out and writes
    /// `null` so later loads take the normal path.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let stored: Option<StoredPair> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), logged_in = stored.is_some(), "loaded credentials");
            stored.map(CredentialPair::from)
        } else {
            info!(path = %path.display(), "credential file not found, starting logged out");
            write_atomic(&path, None).await?;
            None
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Option<Secret<String>>> + Send + '_>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .as_ref()
                .map(|pair| pair.access.clone())
        })
    }

    fn refresh_token(&self) -> Pin<Box<dyn Future<Output = Option<Secret<String>>> + Send + '_>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .as_ref()
                .and_then(|pair| pair.refresh.clone())
        })
    }

    fn set_tokens(&self, pair: CredentialPair) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            write_atomic(&self.path, Some(&StoredPair::from(&pair))).await?;
            *state = Some(pair);
            debug!("replaced credential pair");
            Ok(())
        })
    }

    fn logout(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            *state = None;
            write_atomic(&self.path, None).await?;
            debug!("cleared credentials");
            Ok(())
        })
    }
}

/// Write the credential file atomically.
///
/// Writes a temp file in the same directory and renames it over the target.
/// Permissions are 0600 since the file holds bearer tokens.
async fn write_atomic(path: &Path, data: Option<&StoredPair>) -> Result<()> {
    let json = serde_json::to_string_pretty(&data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
