//! Store directory management and process-exclusive locking.
//!
//! File system layout under the store's path:
//!
//! ```text
//! <path>/
//! ├─ db.json                        # current snapshot
//! ├─ db.next.json                   # in-progress write (transient)
//! ├─ db.previous.json               # crash marker (transient)
//! ├─ db_<ISO-8601 timestamp>.json   # archives
//! └─ LOCK                           # advisory lock marker
//! ```
//!
//! The lock lives in a dedicated marker file rather than on a data file,
//! so embedding projects never have to gitignore the snapshot itself.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// File names within the store directory.
pub(crate) const CURRENT_FILE: &str = "db.json";
pub(crate) const NEXT_FILE: &str = "db.next.json";
pub(crate) const PREVIOUS_FILE: &str = "db.previous.json";
const LOCK_FILE: &str = "LOCK";
const ARCHIVE_PREFIX: &str = "db_";
const ARCHIVE_SUFFIX: &str = ".json";

/// Poll interval while waiting for a contended lock.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Manages the store directory and holds its exclusive lock.
///
/// Only one `StoreDir` can exist per directory at a time, across
/// processes. The lock is released exactly once, when the value drops.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl StoreDir {
    /// Opens (creating if missing) the store directory and acquires its
    /// exclusive lock **before any data file is read**.
    ///
    /// `lock_timeout` of `None` means immediate mode: a lock held by
    /// another process fails fast with `AlreadyLocked`. With `Some(d)` the
    /// acquisition polls until the deadline, then fails the same way.
    pub fn open(path: &Path, lock_timeout: Option<Duration>) -> CoreResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_snapshot(format!(
                "store path is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        let deadline = lock_timeout.map(|t| Instant::now() + t);
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => break,
                Err(source) => {
                    let expired = match deadline {
                        None => true,
                        Some(deadline) => Instant::now() >= deadline,
                    };
                    if expired {
                        return Err(CoreError::AlreadyLocked {
                            path: path.display().to_string(),
                            source,
                        });
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// The store directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the current snapshot.
    #[must_use]
    pub fn current_path(&self) -> PathBuf {
        self.path.join(CURRENT_FILE)
    }

    /// Path of the in-progress write file.
    #[must_use]
    pub fn next_path(&self) -> PathBuf {
        self.path.join(NEXT_FILE)
    }

    /// Path of the transient crash-marker file.
    #[must_use]
    pub fn previous_path(&self) -> PathBuf {
        self.path.join(PREVIOUS_FILE)
    }

    /// Archive path for a snapshot whose creation instant is `stamp`.
    #[must_use]
    pub fn archive_path(&self, stamp: DateTime<Utc>) -> PathBuf {
        let name = format!(
            "{ARCHIVE_PREFIX}{}{ARCHIVE_SUFFIX}",
            stamp.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        self.path.join(name)
    }

    /// Lists the archive files with the creation instant recovered from
    /// each filename. Files whose name does not parse are ignored.
    pub fn list_archives(&self) -> CoreResult<Vec<(PathBuf, DateTime<Utc>)>> {
        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(stamp) = name
                .strip_prefix(ARCHIVE_PREFIX)
                .and_then(|rest| rest.strip_suffix(ARCHIVE_SUFFIX))
            else {
                continue;
            };
            // "db.json" and friends also start with the prefix; only a
            // parseable timestamp makes an archive.
            let Ok(parsed) = DateTime::parse_from_rfc3339(stamp) else {
                continue;
            };
            archives.push((entry.path(), parsed.with_timezone(&Utc)));
        }
        Ok(archives)
    }

    /// Syncs the store directory so renames and deletes are durable.
    #[cfg(unix)]
    pub(crate) fn sync_directory(&self) -> CoreResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub(crate) fn sync_directory(&self) -> CoreResult<()> {
        // Windows NTFS journaling covers metadata durability; directory
        // fsync is not supported there.
        Ok(())
    }
}
