//! Graph codec: class-identity tagging, field filtering and typed revival.
//!
//! On encode the codec walks the live graph once, producing a codec-owned
//! copy in which every class instance has become a plain mapping carrying
//! the reserved tag key and transient fields have been stripped. The copy
//! is what reaches the serializer, so the serializer stays shape-agnostic.
//! On decode the codec reverses the pass: every mapping carrying the tag
//! is revived through the registry's zero-argument constructor with the
//! decoded fields copied over the defaults.

use crate::error::{CoreError, CoreResult};
use crate::registry::ClassRegistry;
use rootdb_graph::{node_id, Fields, GraphSerializer, Node, NodeRef, SerializerError};
use std::collections::HashMap;
use std::sync::Arc;

/// The reserved mapping key identifying a tagged class instance.
pub const CLASS_TAG: &str = "__class";

/// Encodes and decodes the root graph to/from snapshot text.
pub struct GraphCodec {
    registry: Arc<ClassRegistry>,
    serializer: Box<dyn GraphSerializer>,
    pretty: bool,
}

impl GraphCodec {
    /// Creates a codec over the given registry and serializer.
    pub fn new(
        registry: Arc<ClassRegistry>,
        serializer: Box<dyn GraphSerializer>,
        pretty: bool,
    ) -> Self {
        Self {
            registry,
            serializer,
            pretty,
        }
    }

    /// The active serializer's diagnostic name.
    #[must_use]
    pub fn serializer_name(&self) -> &'static str {
        self.serializer.name()
    }

    /// Encodes the graph to snapshot text.
    pub fn encode(&self, root: &NodeRef) -> CoreResult<String> {
        let tagged = self.filtered_view(root)?;
        self.serializer
            .serialize(&tagged, self.pretty)
            .map_err(|e| match e {
                SerializerError::Cycle => CoreError::UnsupportedGraphShape {
                    serializer: self.serializer.name(),
                    suggestion: "ref-json",
                },
                other => other.into(),
            })
    }

    /// Decodes snapshot text back into a typed graph.
    pub fn decode(&self, text: &str) -> CoreResult<NodeRef> {
        let raw = self.serializer.deserialize(text)?;
        let mut revived = HashMap::new();
        let mut path = String::from("root");
        self.revive_node(&raw, &mut revived, &mut path)
    }

    /// Produces the codec-owned tagged, persistence-filtered copy of the
    /// graph: instances become mappings carrying [`CLASS_TAG`], transient
    /// fields are dropped. Sharing and cycles are preserved in the copy.
    ///
    /// This is also the normal form used by write verification: two graphs
    /// persist identically exactly when their filtered views are
    /// structurally equal.
    pub fn filtered_view(&self, root: &NodeRef) -> CoreResult<NodeRef> {
        let mut visited = HashMap::new();
        let mut path = String::from("root");
        self.tag_node(root, &mut visited, &mut path)
    }

    fn tag_node(
        &self,
        node: &NodeRef,
        visited: &mut HashMap<usize, NodeRef>,
        path: &mut String,
    ) -> CoreResult<NodeRef> {
        if let Some(copy) = visited.get(&node_id(node)) {
            return Ok(copy.clone());
        }

        let copy = Node::null();
        visited.insert(node_id(node), copy.clone());

        let replacement = match &*node.read() {
            Node::Null => Node::Null,
            Node::Bool(b) => Node::Bool(*b),
            Node::Int(i) => Node::Int(*i),
            Node::Float(f) => Node::Float(*f),
            Node::Text(s) => Node::Text(s.clone()),
            Node::Seq(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let len = path.len();
                    path.push_str(&format!("[{index}]"));
                    out.push(self.tag_node(item, visited, path)?);
                    path.truncate(len);
                }
                Node::Seq(out)
            }
            Node::Map(entries) => {
                if entries.contains_key(CLASS_TAG) {
                    return Err(CoreError::invalid_snapshot(format!(
                        "reserved key {CLASS_TAG:?} used in a plain mapping at {path}"
                    )));
                }
                let mut out = Fields::new();
                for (key, value) in entries {
                    let len = path.len();
                    path.push('.');
                    path.push_str(key);
                    out.insert(key.clone(), self.tag_node(value, visited, path)?);
                    path.truncate(len);
                }
                Node::Map(out)
            }
            Node::Instance { class, fields } => {
                let spec =
                    self.registry
                        .get(class)
                        .ok_or_else(|| CoreError::UnregisteredClass {
                            class: class.clone(),
                            path: path.clone(),
                        })?;
                let mut out = Fields::new();
                out.insert(CLASS_TAG.to_string(), Node::text(class.clone()));
                for (key, value) in fields {
                    if key == CLASS_TAG {
                        return Err(CoreError::invalid_snapshot(format!(
                            "reserved key {CLASS_TAG:?} used as a field of class {class:?} at {path}"
                        )));
                    }
                    if !spec.is_persistent(key) {
                        continue;
                    }
                    let len = path.len();
                    path.push('.');
                    path.push_str(key);
                    out.insert(key.clone(), self.tag_node(value, visited, path)?);
                    path.truncate(len);
                }
                Node::Map(out)
            }
        };

        *copy.write() = replacement;
        Ok(copy)
    }

    fn revive_node(
        &self,
        node: &NodeRef,
        revived: &mut HashMap<usize, NodeRef>,
        path: &mut String,
    ) -> CoreResult<NodeRef> {
        // Keyed by the parsed node's identity: two references to the same
        // parsed node revive to one shared instance, not two copies.
        if let Some(out) = revived.get(&node_id(node)) {
            return Ok(out.clone());
        }

        let out = Node::null();
        revived.insert(node_id(node), out.clone());

        let replacement = match &*node.read() {
            Node::Null => Node::Null,
            Node::Bool(b) => Node::Bool(*b),
            Node::Int(i) => Node::Int(*i),
            Node::Float(f) => Node::Float(*f),
            Node::Text(s) => Node::Text(s.clone()),
            Node::Seq(items) => {
                let mut seq = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let len = path.len();
                    path.push_str(&format!("[{index}]"));
                    seq.push(self.revive_node(item, revived, path)?);
                    path.truncate(len);
                }
                Node::Seq(seq)
            }
            Node::Map(entries) => match entries.get(CLASS_TAG) {
                Some(tag) => {
                    let class = match &*tag.read() {
                        Node::Text(name) => name.clone(),
                        _ => {
                            return Err(CoreError::invalid_snapshot(format!(
                                "type tag at {path} is not a string"
                            )));
                        }
                    };
                    let spec =
                        self.registry
                            .get(&class)
                            .ok_or_else(|| CoreError::UnknownClass {
                                class: class.clone(),
                                path: path.clone(),
                            })?;

                    // Constructor defaults first, decoded fields on top;
                    // transient fields are absent from the snapshot and so
                    // keep their defaults.
                    let mut fields = spec.instantiate();
                    for (key, value) in entries {
                        if key == CLASS_TAG {
                            continue;
                        }
                        let len = path.len();
                        path.push('.');
                        path.push_str(key);
                        fields.insert(key.clone(), self.revive_node(value, revived, path)?);
                        path.truncate(len);
                    }
                    Node::Instance { class, fields }
                }
                None => {
                    let mut map = Fields::new();
                    for (key, value) in entries {
                        let len = path.len();
                        path.push('.');
                        path.push_str(key);
                        map.insert(key.clone(), self.revive_node(value, revived, path)?);
                        path.truncate(len);
                    }
                    Node::Map(map)
                }
            },
            // Serializers only produce plain shapes; an instance here means
            // the caller fed a live graph through decode's revival pass.
            Node::Instance { class, fields } => {
                let mut out_fields = Fields::new();
                for (key, value) in fields {
                    out_fields.insert(key.clone(), self.revive_node(value, revived, path)?);
                }
                Node::Instance {
                    class: class.clone(),
                    fields: out_fields,
                }
            }
        };

        *out.write() = replacement;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClassSpec;
    use rootdb_graph::{structural_eq, RefSerializer, TreeSerializer};

    fn user_defaults() -> Fields {
        [
            ("id".to_string(), Node::int(0)),
            ("name".to_string(), Node::text("")),
            ("cache".to_string(), Node::int(123)),
        ]
        .into_iter()
        .collect()
    }

    fn codec(classes: Vec<ClassSpec>, refs: bool) -> GraphCodec {
        let registry = Arc::new(ClassRegistry::with_classes(classes).unwrap());
        let serializer: Box<dyn GraphSerializer> = if refs {
            Box::new(RefSerializer)
        } else {
            Box::new(TreeSerializer)
        };
        GraphCodec::new(registry, serializer, false)
    }

    fn user_class() -> ClassSpec {
        ClassSpec::new("User", user_defaults).transient(&["cache"])
    }

    #[test]
    fn round_trips_typed_instances() {
        let codec = codec(vec![user_class()], false);
        let root = Node::map(vec![(
            "owner",
            Node::instance("User", vec![("id", Node::int(7)), ("name", Node::text("Bob"))]),
        )]);

        let text = codec.encode(&root).unwrap();
        assert!(text.contains("__class"));

        let reloaded = codec.decode(&text).unwrap();
        let guard = reloaded.read();
        let Node::Map(entries) = &*guard else {
            panic!("expected Map");
        };
        let owner = entries["owner"].read();
        let Node::Instance { class, fields } = &*owner else {
            panic!("expected Instance");
        };
        assert_eq!(class, "User");
        assert!(matches!(*fields["id"].read(), Node::Int(7)));
        // Transient field came back as the constructor default.
        assert!(matches!(*fields["cache"].read(), Node::Int(123)));
    }

    #[test]
    fn strips_transient_fields_on_encode() {
        let codec = codec(vec![user_class()], false);
        let root = Node::instance("User", vec![("id", Node::int(1)), ("cache", Node::int(999))]);

        let text = codec.encode(&root).unwrap();
        assert!(!text.contains("cache"));
        assert!(!text.contains("999"));
    }

    #[test]
    fn unregistered_class_reports_traversal_path() {
        let codec = codec(vec![], false);
        let root = Node::map(vec![(
            "users",
            Node::seq(vec![
                Node::map(vec![]),
                Node::map(vec![]),
                Node::map(vec![("profile", Node::instance("Profile", vec![]))]),
            ]),
        )]);

        let err = codec.encode(&root).unwrap_err();
        match err {
            CoreError::UnregisteredClass { class, path } => {
                assert_eq!(class, "Profile");
                assert_eq!(path, "root.users[2].profile");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_tag_fails_to_load() {
        let codec = codec(vec![], false);
        let err = codec
            .decode(r#"{"thing":{"__class":"Ghost"}}"#)
            .unwrap_err();
        match err {
            CoreError::UnknownClass { class, path } => {
                assert_eq!(class, "Ghost");
                assert_eq!(path, "root.thing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cycles_under_tree_serializer_name_the_remedy() {
        let codec = codec(vec![], false);
        let root = Node::map(vec![]);
        if let Node::Map(entries) = &mut *root.write() {
            entries.insert("me".to_string(), root.clone());
        }

        let err = codec.encode(&root).unwrap_err();
        match err {
            CoreError::UnsupportedGraphShape {
                serializer,
                suggestion,
            } => {
                assert_eq!(serializer, "tree-json");
                assert_eq!(suggestion, "ref-json");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn shared_instances_revive_as_one_object() {
        let codec = codec(vec![user_class()], true);
        let shared = Node::instance("User", vec![("id", Node::int(1))]);
        let root = Node::map(vec![("a", shared.clone()), ("b", shared)]);

        let text = codec.encode(&root).unwrap();
        let reloaded = codec.decode(&text).unwrap();

        let guard = reloaded.read();
        let Node::Map(entries) = &*guard else {
            panic!("expected Map");
        };
        assert!(Arc::ptr_eq(&entries["a"], &entries["b"]));
    }

    #[test]
    fn encoding_is_idempotent() {
        let codec = codec(vec![user_class()], false);
        let root = Node::map(vec![
            ("n", Node::int(3)),
            (
                "u",
                Node::instance(
                    "User",
                    vec![
                        ("id", Node::int(2)),
                        ("name", Node::text("Ann")),
                        ("cache", Node::int(123)),
                    ],
                ),
            ),
        ]);

        let text = codec.encode(&root).unwrap();
        let reloaded = codec.decode(&text).unwrap();
        let reencoded = codec.encode(&reloaded).unwrap();
        assert_eq!(text, reencoded);
    }

    #[test]
    fn reserved_tag_key_in_plain_mapping_is_rejected() {
        let codec = codec(vec![], false);
        let root = Node::map(vec![("__class", Node::text("crafted"))]);
        assert!(matches!(
            codec.encode(&root),
            Err(CoreError::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn reserved_tag_key_in_instance_fields_is_rejected() {
        // An instance field named like the tag would overwrite the class
        // identity in the encoded mapping.
        let codec = codec(vec![user_class()], false);
        let root = Node::instance("User", vec![("__class", Node::int(5))]);
        assert!(matches!(
            codec.encode(&root),
            Err(CoreError::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn filtered_views_of_equal_graphs_match() {
        let codec = codec(vec![user_class()], false);
        let make = || {
            Node::map(vec![(
                "u",
                Node::instance("User", vec![("id", Node::int(5)), ("cache", Node::int(1))]),
            )])
        };
        let a = codec.filtered_view(&make()).unwrap();
        let b = codec.filtered_view(&make()).unwrap();
        assert!(structural_eq(&a, &b));
    }
}
