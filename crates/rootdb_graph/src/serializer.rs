//! The pluggable snapshot serializer capability.

use crate::error::SerializerResult;
use crate::node::NodeRef;

/// Encodes and decodes a graph to/from a textual snapshot.
///
/// Serializers are **shape-agnostic byte producers**: they see only
/// primitives, sequences and mappings. Class instances are tagged into
/// plain mappings by the graph codec before they reach a serializer, and
/// revived from the tag afterwards.
///
/// Implementations differ in which graph shapes they can represent:
/// tree-only serializers duplicate shared references and reject cycles,
/// reference-capable ones preserve sharing exactly.
pub trait GraphSerializer: Send + Sync {
    /// A short name for diagnostics, e.g. `"tree-json"`.
    fn name(&self) -> &'static str;

    /// Whether shared references and cycles survive a round trip.
    fn supports_references(&self) -> bool;

    /// Encodes the graph to snapshot text.
    fn serialize(&self, root: &NodeRef, pretty: bool) -> SerializerResult<String>;

    /// Decodes snapshot text back into a graph.
    fn deserialize(&self, text: &str) -> SerializerResult<NodeRef>;
}
