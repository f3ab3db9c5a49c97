//! Advisory lock files for single-writer access to persisted state.
//!
//! A lock is a sibling file created with `create_new`; whoever creates it owns
//! the resource until the guard drops. A lock file older than the stale
//! threshold is assumed abandoned by a crashed process and taken over.
//!
//! Takeover moves the stale file aside under a unique name before checking it
//! again, so two waiters racing for the same stale lock cannot delete the
//! lock the faster one has just created.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use crate::error::{AppError, Result};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Guard for an acquired lock file. Dropping it releases the lock.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Lock `target` by creating `<target>.lock`.
    ///
    /// Waits up to `wait` for a live holder to release it.
    pub async fn acquire(target: &Path, stale_after: Duration, wait: Duration) -> Result<Self> {
        let path = lock_path(target);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let deadline = Instant::now() + wait;

        loop {
            let attempt = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match attempt {
                Ok(mut file) => {
                    file.write_all(std::process::id().to_string().as_bytes())
                        .await?;
                    file.flush().await?;
                    log::debug!("Acquired lock {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&path, stale_after).await {
                        break_stale(&path, stale_after).await?;
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(AppError::lock(format!(
                            "{} is held by another writer",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => return Err(AppError::Io(e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

fn lock_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    target.with_file_name(name)
}

/// Remove the lock at `path` if the file found there is still stale.
///
/// A fresh lock moved aside by mistake is linked back; `hard_link` never
/// replaces a lock created in the meantime.
async fn break_stale(path: &Path, stale_after: Duration) -> Result<()> {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".stale.{}.{}", std::process::id(), nanos));
    let moved = path.with_file_name(name);

    match tokio::fs::rename(path, &moved).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(AppError::Io(e)),
    }

    if is_stale(&moved, stale_after).await {
        log::warn!("Took over stale lock {}", path.display());
    } else if let Err(e) = tokio::fs::hard_link(&moved, path).await {
        log::warn!("Could not restore live lock {}: {}", path.display(), e);
    } else {
        log::debug!("Lock {} was renewed by another writer", path.display());
    }
    tokio::fs::remove_file(&moved).await?;
    Ok(())
}

async fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return false;
    };
    meta.modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > stale_after)
}
