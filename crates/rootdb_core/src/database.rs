//! The database handle: open, mutate in place, notify, close.

use crate::codec::GraphCodec;
use crate::config::Config;
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::registry::ClassRegistry;
use crate::retention::{self, BackupPolicy};
use crate::scheduler::{ChangePlan, ThreadTimer, Timer, TimerJob, WriteScheduler};
use crate::swap;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rootdb_graph::{structural_eq, Node, NodeRef};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(60);

/// Lifecycle state of an open store.
#[derive(Debug)]
enum DbState {
    Open,
    Closed,
    /// The final flush failed; the in-memory graph may be newer than disk.
    Fatal(String),
}

/// An open object-graph store.
///
/// The handle is cheap to clone and safe to share across threads. All
/// reads and mutations go through the [`root`](Self::root) node graph;
/// after mutating, call [`notify_changed`](Self::notify_changed) to
/// schedule persistence.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DbInner>,
}

struct DbInner {
    path: PathBuf,
    /// `None` once the store is closed and the lock released.
    dir: Mutex<Option<StoreDir>>,
    codec: GraphCodec,
    root: RwLock<NodeRef>,
    state: Mutex<DbState>,
    scheduler: WriteScheduler,
    timer: Box<dyn Timer>,
    write_wait: Duration,
    verify: bool,
    backups: Option<BackupPolicy>,
    /// Serializes whole write cycles so snapshots never interleave.
    write_serial: Mutex<()>,
}

impl Database {
    /// Opens the store at `path`, creating it if missing.
    ///
    /// Acquires the directory lock, repairs any interrupted write, loads
    /// and revives the current snapshot (or installs the configured
    /// initial root when none exists) and thins archives per the backup
    /// policy.
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        Self::open_with_timer(path, config, Box::new(ThreadTimer))
    }

    /// Like [`open`](Self::open), with a caller-supplied timer driving
    /// deferred writes.
    pub fn open_with_timer(
        path: impl AsRef<Path>,
        config: Config,
        timer: Box<dyn Timer>,
    ) -> CoreResult<Self> {
        let path = path.as_ref();
        let registry = Arc::new(ClassRegistry::with_classes(config.classes)?);
        let codec = GraphCodec::new(
            registry,
            config.serializer.build(),
            config.pretty.unwrap_or(true),
        );

        let dir = StoreDir::open(path, config.lock_timeout)?;
        swap::recover(&dir)?;

        let current = dir.current_path();
        let root = if current.exists() {
            let text = fs::read_to_string(&current)?;
            let root = codec.decode(&text)?;
            require_object(&root)?;
            root
        } else {
            let root = config
                .initial_root
                .unwrap_or_else(|| Node::map(Vec::new()));
            require_object(&root)?;
            root
        };

        if let Some(policy) = &config.backups {
            let deleted = retention::consolidate(&dir, policy, Utc::now())?;
            if deleted > 0 {
                debug!(deleted, "thinned archives at open");
            }
        }

        info!(
            path = %path.display(),
            serializer = codec.serializer_name(),
            "store opened"
        );

        Ok(Self {
            inner: Arc::new(DbInner {
                path: path.to_path_buf(),
                dir: Mutex::new(Some(dir)),
                codec,
                root: RwLock::new(root),
                state: Mutex::new(DbState::Open),
                scheduler: WriteScheduler::new(),
                timer,
                write_wait: config.write_wait.unwrap_or(DEFAULT_WRITE_WAIT),
                verify: config.verify.unwrap_or(true),
                backups: config.backups,
                write_serial: Mutex::new(()),
            }),
        })
    }

    /// The store directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The root of the object graph. Mutate it in place through its
    /// locks, then call [`notify_changed`](Self::notify_changed).
    #[must_use]
    pub fn root(&self) -> NodeRef {
        self.inner.root.read().clone()
    }

    /// Signals that the graph changed and persistence is due.
    ///
    /// The first notification (and every one while the debounce window is
    /// zero, or after a failed write) writes synchronously and surfaces
    /// any error here. Otherwise the write is deferred by the window and
    /// further notifications coalesce into it.
    pub fn notify_changed(&self) -> CoreResult<()> {
        self.inner.ensure_open()?;
        let weak = Arc::downgrade(&self.inner);
        let job: TimerJob = Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match inner.persist() {
                Ok(()) | Err(CoreError::DatabaseClosed) => {}
                Err(e) => error!(error = %e, "deferred write failed"),
            }
        });
        let plan = self.inner.scheduler.on_change(
            self.inner.write_wait,
            self.inner.timer.as_ref(),
            job,
        );
        match plan {
            ChangePlan::WriteNow => self.inner.persist(),
            ChangePlan::Arm | ChangePlan::Coalesce => Ok(()),
        }
    }

    /// Writes the current graph to disk now, cancelling any deferred
    /// write.
    pub fn flush(&self) -> CoreResult<()> {
        self.inner.ensure_open()?;
        self.inner.scheduler.cancel_pending();
        self.inner.persist()
    }

    /// The cause of the last failed write, if the store is waiting to
    /// retry one.
    #[must_use]
    pub fn last_write_error(&self) -> Option<String> {
        self.inner.scheduler.last_error()
    }

    /// Flushes the graph one final time and releases the directory lock.
    ///
    /// Idempotent. If the final flush fails the store enters a fatal
    /// state: the lock is still released, but the error is returned and
    /// the on-disk snapshot may be older than the in-memory graph.
    pub fn close(&self) -> CoreResult<()> {
        self.inner.close()
    }
}

impl DbInner {
    fn ensure_open(&self) -> CoreResult<()> {
        match &*self.state.lock() {
            DbState::Open => Ok(()),
            DbState::Closed => Err(CoreError::DatabaseClosed),
            DbState::Fatal(cause) => Err(CoreError::Fatal {
                cause: cause.clone(),
            }),
        }
    }

    /// One full write cycle, with the outcome recorded on the scheduler.
    fn persist(&self) -> CoreResult<()> {
        let result = self.write_to_disk();
        self.scheduler.record_result(&result);
        result
    }

    fn write_to_disk(&self) -> CoreResult<()> {
        let _serial = self.write_serial.lock();

        let root = self.root.read().clone();
        let text = self.codec.encode(&root)?;
        if self.verify {
            self.verify_written_text(&root, &text)?;
        }

        let dir_guard = self.dir.lock();
        let dir = dir_guard.as_ref().ok_or(CoreError::DatabaseClosed)?;
        swap::commit(dir, &text, self.backups.is_some())?;
        if let Some(policy) = &self.backups {
            retention::consolidate(dir, policy, Utc::now())?;
        }
        debug!(bytes = text.len(), "snapshot written");
        Ok(())
    }

    /// Confirms the written text revives to the same persistent state and
    /// re-encodes byte-for-byte, before the snapshot is committed.
    fn verify_written_text(&self, root: &NodeRef, text: &str) -> CoreResult<()> {
        let reloaded = self.codec.decode(text)?;

        let expected = self.codec.filtered_view(root)?;
        let actual = self.codec.filtered_view(&reloaded)?;
        if !structural_eq(&expected, &actual) {
            return Err(CoreError::RoundtripMismatch);
        }

        let reencoded = self.codec.encode(&reloaded)?;
        if reencoded != text {
            return Err(CoreError::NonDeterministicEncoding);
        }
        Ok(())
    }

    fn close(&self) -> CoreResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                DbState::Open => *state = DbState::Closed,
                _ => return Ok(()),
            }
        }
        self.scheduler.cancel_pending();

        let result = self.write_to_disk();
        if let Err(e) = &result {
            error!(error = %e, "final flush failed; disk may be stale");
            *self.state.lock() = DbState::Fatal(e.to_string());
        } else {
            info!(path = %self.path.display(), "store closed");
        }

        // Releases the directory lock exactly once.
        drop(self.dir.lock().take());
        result
    }
}

impl Drop for DbInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "flush on drop failed");
        }
    }
}

/// Snapshot roots must be mappings or class instances, never scalars or
/// sequences.
fn require_object(root: &NodeRef) -> CoreResult<()> {
    match &*root.read() {
        Node::Map(_) | Node::Instance { .. } => Ok(()),
        _ => Err(CoreError::invalid_snapshot(
            "content of db.json is not an object",
        )),
    }
}
