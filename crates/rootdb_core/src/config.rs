//! Database configuration.

use crate::registry::ClassSpec;
use crate::retention::BackupPolicy;
use rootdb_graph::{GraphSerializer, NodeRef, RefSerializer, TreeSerializer};
use std::time::Duration;

/// Which snapshot format the store uses.
///
/// The format is a per-store commitment: snapshots written by one
/// serializer are not readable by the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializerKind {
    /// Plain nested JSON. Readable and diffable, but rejects cycles and
    /// duplicates shared references.
    #[default]
    Tree,
    /// Flat node-table JSON. Preserves sharing and cycles exactly.
    Refs,
}

impl SerializerKind {
    pub(crate) fn build(self) -> Box<dyn GraphSerializer> {
        match self {
            Self::Tree => Box::new(TreeSerializer),
            Self::Refs => Box::new(RefSerializer),
        }
    }
}

/// Configuration for opening a [`Database`](crate::Database).
///
/// The defaults persist a pretty-printed tree snapshot, verify every
/// write, debounce writes by one minute, keep no backups and fail fast
/// on a contended lock.
#[must_use]
#[derive(Default)]
pub struct Config {
    pub(crate) initial_root: Option<NodeRef>,
    pub(crate) classes: Vec<ClassSpec>,
    pub(crate) serializer: SerializerKind,
    pub(crate) pretty: Option<bool>,
    pub(crate) verify: Option<bool>,
    pub(crate) write_wait: Option<Duration>,
    pub(crate) backups: Option<BackupPolicy>,
    pub(crate) lock_timeout: Option<Duration>,
}

impl Config {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Root graph used when the store directory holds no snapshot yet.
    /// Defaults to an empty mapping.
    pub fn initial_root(mut self, root: NodeRef) -> Self {
        self.initial_root = Some(root);
        self
    }

    /// Registers an application class for tagging and revival.
    pub fn register(mut self, class: ClassSpec) -> Self {
        self.classes.push(class);
        self
    }

    /// Registers several application classes at once.
    pub fn register_all(mut self, classes: impl IntoIterator<Item = ClassSpec>) -> Self {
        self.classes.extend(classes);
        self
    }

    /// Selects the snapshot format.
    pub fn serializer(mut self, kind: SerializerKind) -> Self {
        self.serializer = kind;
        self
    }

    /// Whether snapshots are pretty-printed (default true).
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = Some(pretty);
        self
    }

    /// Whether every write is verified by reloading and re-encoding the
    /// written text (default true).
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    /// Debounce window between a change notification and the disk write
    /// (default 60 seconds). Zero makes every notification write
    /// synchronously.
    pub fn write_wait(mut self, wait: Duration) -> Self {
        self.write_wait = Some(wait);
        self
    }

    /// Enables archival of superseded snapshots under the given retention
    /// policy. Without a policy no archives are created and any existing
    /// ones are left untouched.
    pub fn backups(mut self, policy: BackupPolicy) -> Self {
        self.backups = Some(policy);
        self
    }

    /// How long to wait for a contended store lock. `None` (the default)
    /// fails immediately.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }
}
