//! # RootDB
//!
//! An embedded, single-process object-graph store. The whole dataset
//! lives in memory as a typed graph that the application mutates
//! directly; the store persists it as human-readable JSON snapshots with
//! crash-safe atomic swaps, debounced writes, write verification and
//! timestamped backups thinned on a geometric schedule.
//!
//! ## Example
//!
//! ```no_run
//! use rootdb_core::{Config, Database, Node};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), rootdb_core::CoreError> {
//! let db = Database::open(
//!     "my_app_data",
//!     Config::new().write_wait(Duration::from_secs(10)),
//! )?;
//!
//! let root = db.root();
//! if let Node::Map(entries) = &mut *root.write() {
//!     entries.insert("counter".to_string(), Node::int(1));
//! }
//! db.notify_changed()?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Application classes participate through [`ClassSpec`]: a registered
//! zero-argument constructor plus a transient-field set lets instances
//! round-trip through snapshots with their class identity intact.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod database;
mod dir;
mod error;
mod registry;
mod retention;
mod scheduler;
mod swap;

pub use codec::{GraphCodec, CLASS_TAG};
pub use config::{Config, SerializerKind};
pub use database::Database;
pub use dir::StoreDir;
pub use error::{CoreError, CoreResult};
pub use registry::{ClassRegistry, ClassSpec, Constructor};
pub use retention::BackupPolicy;
pub use scheduler::{ManualTimer, ThreadTimer, Timer, TimerGuard, TimerJob};

pub use rootdb_graph::{
    deep_copy, node_id, structural_eq, Fields, GraphSerializer, Node, NodeRef, RefSerializer,
    SerializerError, TreeSerializer,
};
