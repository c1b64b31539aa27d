//! Interval-driven sweep that keeps total cache disk usage and file
//! count under their configured limits.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::info::Info;
use crate::CacheError;

/// Limits a [`Purge`] sweep enforces.
#[derive(Debug, Clone)]
pub struct PurgeConfig {
    /// Root directory the cache lives under; walked recursively for
    /// `.data` files each sweep.
    pub cache_root: PathBuf,
    /// Sweeps when total bytes exceed this. `0` disables the disk-based
    /// trigger.
    pub disk_high_water_mark: u64,
    /// Target total bytes to purge down to once triggered.
    pub disk_low_water_mark: u64,
    /// Sweeps when the cached file count exceeds this, independent of
    /// the disk water marks.
    pub max_file_count: Option<u64>,
    /// How often the background task re-evaluates the triggers.
    pub interval: Duration,
}

/// Background cache eviction: walks [`PurgeConfig::cache_root`], orders
/// cached files oldest-access-first, and deletes from the front until
/// whichever of the disk or file-count excess triggered the sweep is
/// satisfied (capped at 125% of the computed excess so one sweep can't
/// run away and evict everything). Anything with an open read in flight
/// or explicitly protected is skipped regardless of age.
pub struct Purge {
    config: PurgeConfig,
    active: Arc<Mutex<HashSet<PathBuf>>>,
    protected: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Purge {
    /// Builds a purge sweep under `config`, starting with no active or
    /// protected files.
    #[must_use]
    pub fn new(config: PurgeConfig) -> Self {
        Self {
            config,
            active: Arc::new(Mutex::new(HashSet::new())),
            protected: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Marks `path` as having an open IO reference; a sweep will never
    /// unlink it while it stays registered.
    pub fn register_active(&self, path: PathBuf) {
        self.active.lock().unwrap().insert(path);
    }

    /// Clears a prior [`Self::register_active`] call once the last
    /// reader of `path` has closed it.
    pub fn unregister_active(&self, path: &Path) {
        self.active.lock().unwrap().remove(path);
    }

    /// Marks `path` as exempt from purging regardless of age or
    /// reference count, until [`Self::unprotect`] is called.
    pub fn protect(&self, path: PathBuf) {
        self.protected.lock().unwrap().insert(path);
    }

    /// Clears a prior [`Self::protect`] call.
    pub fn unprotect(&self, path: &Path) {
        self.protected.lock().unwrap().remove(path);
    }

    /// Schedules periodic sweeps on `tasks`, starting after one interval
    /// has elapsed. Each tick spawns the sweep as its own task so a slow
    /// directory walk never stalls the shared scheduler.
    pub fn spawn(self: Arc<Self>, tasks: &xrd_task::TaskManager) -> xrd_task::TaskId {
        let interval = self.config.interval;
        tasks.schedule_after(interval, move |now: Instant| {
            let purge = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = purge.sweep_once().await {
                    tracing::warn!(error = %err, "cache purge sweep failed");
                }
            });
            Some(now + interval)
        })
    }

    /// Runs one sweep immediately, synchronously with respect to the
    /// caller (useful for tests and for a manual "purge now" trigger).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if walking `cache_root` fails.
    pub async fn sweep_once(&self) -> Result<(), CacheError> {
        let entries = self.scan().await?;
        let total_bytes: u64 = entries.values().map(|e| e.size).sum();
        let file_count = entries.len() as u64;

        let disk_hwm_excess = if self.config.disk_high_water_mark > 0 && total_bytes > self.config.disk_high_water_mark {
            total_bytes.saturating_sub(self.config.disk_low_water_mark)
        } else {
            0
        };
        let file_count_excess = match self.config.max_file_count {
            Some(max) if file_count > max && file_count > 0 => {
                let avg_size = total_bytes / file_count;
                (file_count - max) * avg_size
            }
            _ => 0,
        };
        let bytes_to_remove = disk_hwm_excess.max(file_count_excess);
        if bytes_to_remove == 0 {
            return Ok(());
        }
        let budget_cap = bytes_to_remove.saturating_add(bytes_to_remove / 4);

        let active = self.active.lock().unwrap().clone();
        let protected = self.protected.lock().unwrap().clone();

        let mut removed = 0u64;
        let mut skipped = 0usize;
        for entry in entries.into_values() {
            if removed >= budget_cap {
                break;
            }
            if active.contains(&entry.data_path) || protected.contains(&entry.data_path) {
                skipped += 1;
                continue;
            }
            match tokio::fs::remove_file(&entry.data_path).await {
                Ok(()) => {
                    removed += entry.size;
                    let _ = tokio::fs::remove_file(entry.data_path.with_extension("cinfo")).await;
                }
                Err(err) => tracing::warn!(path = %entry.data_path.display(), error = %err, "failed to purge cache file"),
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, "purge sweep left active/protected files in place");
        }
        Ok(())
    }

    async fn scan(&self) -> Result<BTreeMap<(i64, PathBuf), CacheEntry>, CacheError> {
        let mut by_access_time = BTreeMap::new();
        let mut stack = vec![self.config.cache_root.clone()];

        while let Some(dir) = stack.pop() {
            let mut read_dir = match tokio::fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    stack.push(path);
                    continue;
                }
                if path.extension().and_then(|ext| ext.to_str()) != Some("data") {
                    continue;
                }
                let info_path = path.with_extension("cinfo");
                let access_time = tokio::task::spawn_blocking(move || Info::read_from(&info_path).ok().and_then(|info| info.latest_attach_time()))
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(0);
                by_access_time.insert(
                    (access_time, path.clone()),
                    CacheEntry { data_path: path, size: metadata.len() },
                );
            }
        }
        Ok(by_access_time)
    }
}

struct CacheEntry {
    data_path: PathBuf,
    size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_removes_oldest_files_first_until_under_low_water_mark() {
        let dir = tempfile::tempdir().unwrap();
        for (name, age, size) in [("a", 300, 10), ("b", 200, 10), ("c", 100, 10)] {
            let data_path = dir.path().join(format!("{name}.data"));
            tokio::fs::write(&data_path, vec![0u8; size]).await.unwrap();
            let mut info = Info::new(size as u64, 4);
            info.append_access(crate::info::AStat {
                append_time: age,
                detach_time: age,
                bytes_read: size as i64,
                hits: 1,
                miss: 0,
            });
            info.write_to(&dir.path().join(format!("{name}.cinfo"))).unwrap();
        }

        let purge = Purge::new(PurgeConfig {
            cache_root: dir.path().to_path_buf(),
            disk_high_water_mark: 20,
            disk_low_water_mark: 10,
            max_file_count: None,
            interval: Duration::from_secs(60),
        });
        purge.sweep_once().await.unwrap();

        assert!(!dir.path().join("a.data").exists(), "oldest file should be purged first");
        assert!(dir.path().join("c.data").exists(), "newest file should survive");
    }

    #[tokio::test]
    async fn active_files_are_never_removed() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("a.data");
        tokio::fs::write(&data_path, vec![0u8; 10]).await.unwrap();
        let mut info = Info::new(10, 4);
        info.append_access(crate::info::AStat { append_time: 1, detach_time: 1, bytes_read: 10, hits: 0, miss: 1 });
        info.write_to(&dir.path().join("a.cinfo")).unwrap();

        let purge = Purge::new(PurgeConfig {
            cache_root: dir.path().to_path_buf(),
            disk_high_water_mark: 1,
            disk_low_water_mark: 0,
            max_file_count: None,
            interval: Duration::from_secs(60),
        });
        purge.register_active(data_path.clone());
        purge.sweep_once().await.unwrap();

        assert!(data_path.exists());
    }
}
