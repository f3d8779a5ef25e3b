use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

use crate::core::{CacheError, Result, now_millis};

/// Atomic write configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtomicWriteConfig {
    /// Read the temp file back and compare checksums before renaming
    pub verify_after_write: bool,
    /// Snapshot an existing target before overwriting, restore it if all
    /// retries fail
    pub keep_backup: bool,
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries
    pub retry_base_delay_ms: u64,
}

impl Default for AtomicWriteConfig {
    fn default() -> Self {
        Self {
            verify_after_write: true,
            keep_backup: true,
            max_retries: 3,
            retry_base_delay_ms: 50,
        }
    }
}

/// Crash-safe file operations.
///
/// Writes go to `path.tmp.<ts>.<rand>` and are renamed onto the final path,
/// so a reader in the same process never observes a partially written file.
pub struct AtomicFile {
    config: AtomicWriteConfig,
    #[cfg(test)]
    fail_before_rename: std::sync::atomic::AtomicBool,
}

impl AtomicFile {
    pub fn new(config: AtomicWriteConfig) -> Self {
        Self {
            config,
            #[cfg(test)]
            fail_before_rename: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn suffix() -> String {
        format!("{}.{:08x}", now_millis(), rand::random::<u32>())
    }

    fn sibling(path: &Path, tag: &str) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!("{}.{}.{}", name, tag, Self::suffix()))
    }

    /// Write `data` to `path` atomically, retrying with exponential backoff.
    /// On exhaustion the pre-write backup (if any) is restored before the
    /// error is reported.
    pub async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let backup = if self.config.keep_backup && fs::try_exists(path).await.unwrap_or(false) {
            let backup_path = Self::sibling(path, "backup");
            match fs::copy(path, &backup_path).await {
                Ok(_) => Some(backup_path),
                Err(e) => {
                    warn!("Backup snapshot of {:?} failed: {}", path, e);
                    None
                }
            }
        } else {
            None
        };

        let expected_crc = crc32fast::hash(data);
        let mut last_err: Option<CacheError> = None;

        for attempt in 1..=self.config.max_retries.max(1) {
            let tmp = Self::sibling(path, "tmp");
            match self.attempt_write(path, &tmp, data, expected_crc).await {
                Ok(()) => {
                    if let Some(backup_path) = backup {
                        let _ = fs::remove_file(&backup_path).await;
                    }
                    return Ok(());
                }
                Err(e) => {
                    let _ = fs::remove_file(&tmp).await;
                    warn!(
                        "Atomic write to {:?} failed (attempt {}/{}): {}",
                        path, attempt, self.config.max_retries, e
                    );
                    last_err = Some(e);
                    if attempt < self.config.max_retries {
                        let delay = self.config.retry_base_delay_ms << (attempt - 1);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        if let Some(backup_path) = backup {
            match fs::rename(&backup_path, path).await {
                Ok(()) => debug!("Restored backup over {:?} after failed write", path),
                Err(e) => warn!("Backup restore for {:?} failed: {}", path, e),
            }
        }

        Err(CacheError::WriteExhausted {
            attempts: self.config.max_retries.max(1),
            reason: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn attempt_write(
        &self,
        path: &Path,
        tmp: &Path,
        data: &[u8],
        expected_crc: u32,
    ) -> Result<()> {
        fs::write(tmp, data).await?;

        if self.config.verify_after_write {
            let written = fs::read(tmp).await?;
            let actual_crc = crc32fast::hash(&written);
            if actual_crc != expected_crc {
                return Err(CacheError::ChecksumMismatch(format!(
                    "read-back of {:?}: expected crc {:08x}, got {:08x}",
                    tmp, expected_crc, actual_crc
                )));
            }
        }

        #[cfg(test)]
        if self
            .fail_before_rename
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(CacheError::Internal("injected failure before rename".into()));
        }

        fs::rename(tmp, path).await?;
        Ok(())
    }

    /// Remove a file. Returns `Ok(false)` when it did not exist.
    pub async fn delete(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove orphaned temp files and expired backups from one directory.
    /// Returns the number of files removed.
    pub async fn sweep_stale(&self, dir: &Path, backup_grace_ms: u64) -> Result<usize> {
        let mut removed = 0;
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = now_millis();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let stale = if name.contains(".tmp.") {
                true
            } else if let Some(rest) = name.split(".backup.").nth(1) {
                // backup suffix is `<ts>.<rand>`
                rest.split('.')
                    .next()
                    .and_then(|ts| ts.parse::<u64>().ok())
                    .is_some_and(|ts| now.saturating_sub(ts) > backup_grace_ms)
            } else {
                false
            };

            if stale && fs::remove_file(entry.path()).await.is_ok() {
                debug!("Swept stale file {:?}", entry.path());
                removed += 1;
            }
        }
        Ok(removed)
    }

    #[cfg(test)]
    fn inject_failure_before_rename(&self, on: bool) {
        self.fail_before_rename
            .store(on, std::sync::atomic::Ordering::SeqCst);
    }
}
