//! Error types for the RootDB core.

use rootdb_graph::SerializerError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in RootDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Another process holds the store's lock.
    #[error("cannot open store at {path}: it is locked by another process: {source}")]
    AlreadyLocked {
        /// The locked store path.
        path: String,
        /// The lock primitive's error.
        #[source]
        source: io::Error,
    },

    /// A class name was registered twice (or clashes with a built-in name).
    #[error("class {class:?} is registered more than once")]
    DuplicateRegistration {
        /// The offending class name.
        class: String,
    },

    /// A live class instance whose class is not registered was found while
    /// encoding.
    #[error(
        "class {class:?} is not registered; found at {path}. The store can only restore \
         class instances when every used class is listed in Config::classes"
    )]
    UnregisteredClass {
        /// The unregistered class name.
        class: String,
        /// The traversal path to the offending instance.
        path: String,
    },

    /// A snapshot carries a type tag that does not resolve in the registry.
    #[error(
        "cannot load snapshot: class {class:?} is not registered; found at {path}. \
         List it in Config::classes"
    )]
    UnknownClass {
        /// The unresolvable class name.
        class: String,
        /// The path within the snapshot graph.
        path: String,
    },

    /// The active serializer cannot represent the graph's shape.
    #[error(
        "the {serializer} serializer cannot represent this graph shape; \
         switch to the {suggestion} serializer (SerializerKind::Refs)"
    )]
    UnsupportedGraphShape {
        /// The active serializer's name.
        serializer: &'static str,
        /// The serializer that would handle the shape.
        suggestion: &'static str,
    },

    /// The written snapshot does not decode back to the live root.
    #[error("snapshot does not reload to the same value as the live root")]
    RoundtripMismatch,

    /// Re-encoding the reloaded snapshot produced different bytes.
    #[error("re-encoding the reloaded snapshot produced different bytes; please report this as a bug")]
    NonDeterministicEncoding,

    /// The snapshot file's content is not usable.
    #[error("invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Description of the problem.
        message: String,
    },

    /// The database has been closed.
    #[error("database has been closed")]
    DatabaseClosed,

    /// The database failed fatally and refuses further operations.
    #[error("database failed fatally: {cause}")]
    Fatal {
        /// The stored failure cause.
        cause: String,
    },

    /// Serializer error.
    #[error("serializer error: {0}")]
    Serializer(#[from] SerializerError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates an invalid snapshot error.
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }
}
