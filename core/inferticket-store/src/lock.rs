//! Named exclusive locks guarding read-modify-write on the partitions.
//!
//! - [`InProcessLock`]: a tokio mutex per name. Correct for one process only.
//! - [`FileLock`]: an exclusive lock file per name, shared by every process
//!   that points at the same directory. Lock files older than `stale_after`
//!   belong to a crashed holder and are broken. Each file carries its
//!   holder's token, so a holder whose lock was broken never removes the
//!   next holder's file.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Held lock; released on drop.
pub struct LockGuard {
    _inner: Box<dyn Send + Sync>,
}

impl LockGuard {
    fn new(inner: impl Send + Sync + 'static) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LockGuard")
    }
}

/// Provider of named exclusive locks.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Waits until the lock `name` is held exclusively by the caller.
    async fn acquire(&self, name: &str) -> StoreResult<LockGuard>;
}

/// In-process lock: serializes callers sharing this provider.
#[derive(Default)]
pub struct InProcessLock {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InProcessLock {
    /// Creates a provider with no locks held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockProvider for InProcessLock {
    async fn acquire(&self, name: &str) -> StoreResult<LockGuard> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        Ok(LockGuard::new(mutex.lock_owned().await))
    }
}

/// Timing for [`FileLock`].
#[derive(Debug, Clone)]
pub struct FileLockConfig {
    /// Give up after waiting this long.
    pub acquire_timeout: Duration,
    /// Delay between attempts while another holder owns the lock.
    pub poll_interval: Duration,
    /// A lock file older than this is treated as abandoned. Keep it well
    /// below `acquire_timeout` so waiters outlast a crashed holder.
    pub stale_after: Duration,
}

impl Default for FileLockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(25),
            stale_after: Duration::from_secs(3),
        }
    }
}

/// Cross-process lock backed by `<dir>/<name>.lock`.
pub struct FileLock {
    dir: PathBuf,
    config: FileLockConfig,
}

impl FileLock {
    /// Creates a provider placing lock files in `dir`.
    pub fn new(dir: impl AsRef<Path>, config: FileLockConfig) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            config,
        }
    }

    fn is_stale(&self, path: &Path) -> bool {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > self.config.stale_after)
    }

    /// Moves a stale lock file aside, then re-checks the moved file.
    ///
    /// Only one waiter can win the rename. If what it moved turns out to be
    /// a fresh lock (another waiter broke the stale one first), it is
    /// linked back without overwriting anything at `path`.
    async fn break_stale(&self, path: &Path) -> StoreResult<()> {
        let parked = path.with_extension(format!("lock.{}.stale", Uuid::new_v4().simple()));
        match tokio::fs::rename(path, &parked).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        if self.is_stale(&parked) {
            warn!("Broke stale lock {}", path.display());
        } else {
            match tokio::fs::hard_link(&parked, path).await {
                Ok(()) => debug!("Restored live lock {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    warn!("Live lock {} was replaced while being restored", path.display());
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&parked).await;
                    return Err(e.into());
                }
            }
        }

        match tokio::fs::remove_file(&parked).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

struct LockFile {
    path: PathBuf,
    token: String,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        match std::fs::read_to_string(&self.path) {
            Ok(current) if current == self.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!("Failed to remove lock file {}: {}", self.path.display(), e);
                }
            }
            Ok(_) => warn!(
                "Lock {} was broken while held; leaving the new holder's file",
                self.path.display()
            ),
            Err(e) => warn!("Lock file {} unreadable on release: {}", self.path.display(), e),
        }
    }
}

#[async_trait]
impl LockProvider for FileLock {
    async fn acquire(&self, name: &str) -> StoreResult<LockGuard> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{name}.lock"));
        let started = tokio::time::Instant::now();

        loop {
            let attempt = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match attempt {
                Ok(mut file) => {
                    let token = Uuid::new_v4().to_string();
                    let written = async {
                        file.write_all(token.as_bytes()).await?;
                        file.flush().await
                    }
                    .await;
                    if let Err(e) = written {
                        let _ = tokio::fs::remove_file(&path).await;
                        return Err(e.into());
                    }
                    debug!("Acquired lock {}", path.display());
                    return Ok(LockGuard::new(LockFile { path, token }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.is_stale(&path) {
                        self.break_stale(&path).await?;
                        continue;
                    }
                    if started.elapsed() >= self.config.acquire_timeout {
                        return Err(StoreError::LockTimeout(name.to_string()));
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
