//! # RootDB Graph
//!
//! The in-memory graph model and snapshot serializers for RootDB.
//!
//! This crate provides:
//! - [`Node`] / [`NodeRef`]: the typed object graph an application
//!   mutates directly (primitives, sequences, mappings, class instances),
//!   with shared references and cycles
//! - [`GraphSerializer`]: the pluggable snapshot text capability
//! - [`TreeSerializer`]: readable plain JSON, tree shapes only
//! - [`RefSerializer`]: flat node-table JSON that preserves shared
//!   references and cycles
//!
//! Serializers never see class instances: the graph codec in
//! `rootdb_core` tags them into plain mappings first and revives them on
//! load.
//!
//! ## Example
//!
//! ```
//! use rootdb_graph::{GraphSerializer, Node, TreeSerializer, structural_eq};
//!
//! let root = Node::map(vec![("answer", Node::int(42))]);
//! let text = TreeSerializer.serialize(&root, false).unwrap();
//! let reloaded = TreeSerializer.deserialize(&text).unwrap();
//! assert!(structural_eq(&root, &reloaded));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod node;
mod refs;
mod serializer;
mod tree;

pub use error::{SerializerError, SerializerResult};
pub use node::{deep_copy, node_id, structural_eq, Fields, Node, NodeRef};
pub use refs::RefSerializer;
pub use serializer::GraphSerializer;
pub use tree::TreeSerializer;
