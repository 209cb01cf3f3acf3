//! Credential persistence.
//!
//! The guard only ever talks to [`CredentialStore`]. Two implementations ship
//! with the crate: [`MemoryCredentialStore`] for tests and ephemeral sessions,
//! and [`FileCredentialStore`], a small JSON file written atomically with
//! owner-only permissions.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use evote_types::{AuthToken, CachedUser, Credential};
use evote_utils::{FileVisibility, atomic_write, ensure_private_dir, remove_if_exists};

pub type StoreFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access credential store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("credential store at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted sign-in state.
///
/// Every method may fail; callers that only need "is there a token" treat a
/// failure the same as absence.
pub trait CredentialStore: Send + Sync {
    fn get_token(&self) -> StoreFut<'_, Option<AuthToken>>;
    fn get_cached_user(&self) -> StoreFut<'_, Option<CachedUser>>;
    fn set_token(&self, token: AuthToken) -> StoreFut<'_, ()>;
    fn set_cached_user(&self, user: Option<CachedUser>) -> StoreFut<'_, ()>;
    fn clear(&self) -> StoreFut<'_, ()>;

    /// Persist a full sign-in. The token is written first.
    fn save(&self, credential: Credential) -> StoreFut<'_, ()> {
        Box::pin(async move {
            self.set_token(credential.token).await?;
            self.set_cached_user(credential.user).await
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<AuthToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<CachedUser>,
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<StoredCredentials>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store, e.g. to simulate a returning user.
    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            inner: Mutex::new(StoredCredentials {
                token: Some(credential.token),
                user: credential.user,
            }),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut StoredCredentials) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_token(&self) -> StoreFut<'_, Option<AuthToken>> {
        let token = self.with_inner(|c| c.token.clone());
        Box::pin(async move { Ok(token) })
    }

    fn get_cached_user(&self) -> StoreFut<'_, Option<CachedUser>> {
        let user = self.with_inner(|c| c.user.clone());
        Box::pin(async move { Ok(user) })
    }

    fn set_token(&self, token: AuthToken) -> StoreFut<'_, ()> {
        self.with_inner(|c| c.token = Some(token));
        Box::pin(async { Ok(()) })
    }

    fn set_cached_user(&self, user: Option<CachedUser>) -> StoreFut<'_, ()> {
        self.with_inner(|c| c.user = user);
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> StoreFut<'_, ()> {
        self.with_inner(|c| *c = StoredCredentials::default());
        Box::pin(async { Ok(()) })
    }
}

/// JSON file store (`{"token": ..., "user": ...}`), mode 0600.
///
/// Writes are read-modify-write under an async mutex so a concurrent
/// `set_token` and `set_cached_user` cannot lose each other's update.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<StoredCredentials, StoreError> {
        let path = self.path.clone();
        run_blocking(move || read_file(&path)).await
    }

    async fn update(
        &self,
        edit: impl FnOnce(&mut StoredCredentials) + Send + 'static,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        run_blocking(move || {
            // A corrupt file is overwritten rather than blocking sign-in forever.
            // Anything else we could not read is left alone.
            let mut stored = match read_file(&path) {
                Ok(stored) => stored,
                Err(e @ StoreError::Corrupt { .. }) => {
                    tracing::warn!("Discarding corrupt credential file: {e}");
                    StoredCredentials::default()
                }
                Err(e) => return Err(e),
            };
            edit(&mut stored);
            write_file(&path, &stored)
        })
        .await
    }
}

async fn run_blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, StoreError> + Send + 'static,
) -> Result<T, StoreError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
}

fn read_file(path: &Path) -> Result<StoredCredentials, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoredCredentials::default()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, stored: &StoredCredentials) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if stored == &StoredCredentials::default() {
        return remove_if_exists(path).map_err(io_err);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_private_dir(parent).map_err(io_err)?;
    }
    let json = serde_json::to_vec_pretty(stored).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, &json, FileVisibility::OwnerOnly).map_err(io_err)
}

impl CredentialStore for FileCredentialStore {
    fn get_token(&self) -> StoreFut<'_, Option<AuthToken>> {
        Box::pin(async move { Ok(self.read().await?.token) })
    }

    fn get_cached_user(&self) -> StoreFut<'_, Option<CachedUser>> {
        Box::pin(async move { Ok(self.read().await?.user) })
    }

    fn set_token(&self, token: AuthToken) -> StoreFut<'_, ()> {
        Box::pin(self.update(move |c| c.token = Some(token)))
    }

    fn set_cached_user(&self, user: Option<CachedUser>) -> StoreFut<'_, ()> {
        Box::pin(self.update(move |c| c.user = user))
    }

    fn clear(&self) -> StoreFut<'_, ()> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let path = self.path.clone();
            run_blocking(move || {
                remove_if_exists(&path).map_err(|source| StoreError::Io { path, source })
            })
            .await
        })
    }
}
