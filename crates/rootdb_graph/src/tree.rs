//! Plain JSON serializer for tree-shaped graphs.

use crate::error::{SerializerError, SerializerResult};
use crate::node::{node_id, Node, NodeRef};
use crate::serializer::GraphSerializer;
use serde_json::Value as Json;
use std::collections::HashSet;

/// Serializes a graph as ordinary JSON.
///
/// The output is exactly as readable as the graph: a shared node appears
/// once per path that reaches it (sharing is not preserved across a round
/// trip), and a cycle fails with [`SerializerError::Cycle`] because JSON
/// has no way to express it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSerializer;

impl GraphSerializer for TreeSerializer {
    fn name(&self) -> &'static str {
        "tree-json"
    }

    fn supports_references(&self) -> bool {
        false
    }

    fn serialize(&self, root: &NodeRef, pretty: bool) -> SerializerResult<String> {
        let mut on_stack = HashSet::new();
        let json = to_json(root, &mut on_stack)?;
        let text = if pretty {
            serde_json::to_string_pretty(&json)?
        } else {
            serde_json::to_string(&json)?
        };
        Ok(text)
    }

    fn deserialize(&self, text: &str) -> SerializerResult<NodeRef> {
        let json: Json = serde_json::from_str(text)?;
        from_json(&json)
    }
}

fn to_json(node: &NodeRef, on_stack: &mut HashSet<usize>) -> SerializerResult<Json> {
    // A node already on the traversal stack means we looped back into it.
    if !on_stack.insert(node_id(node)) {
        return Err(SerializerError::Cycle);
    }

    let json = match &*node.read() {
        Node::Null => Json::Null,
        Node::Bool(b) => Json::Bool(*b),
        Node::Int(i) => Json::from(*i),
        Node::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| SerializerError::invalid_structure("non-finite float"))?,
        Node::Text(s) => Json::String(s.clone()),
        Node::Seq(items) => Json::Array(
            items
                .iter()
                .map(|item| to_json(item, on_stack))
                .collect::<SerializerResult<_>>()?,
        ),
        Node::Map(entries) => {
            let mut object = serde_json::Map::new();
            for (key, value) in entries {
                object.insert(key.clone(), to_json(value, on_stack)?);
            }
            Json::Object(object)
        }
        Node::Instance { class, .. } => {
            return Err(SerializerError::invalid_structure(format!(
                "untagged class instance of {class:?} reached the serializer"
            )));
        }
    };

    on_stack.remove(&node_id(node));
    Ok(json)
}

fn from_json(json: &Json) -> SerializerResult<NodeRef> {
    let node = match json {
        Json::Null => Node::null(),
        Json::Bool(b) => Node::bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Node::int(i)
            } else if let Some(f) = n.as_f64() {
                Node::float(f)
            } else {
                return Err(SerializerError::invalid_structure(format!(
                    "number out of range: {n}"
                )));
            }
        }
        Json::String(s) => Node::text(s.clone()),
        Json::Array(items) => Node::seq(
            items
                .iter()
                .map(from_json)
                .collect::<SerializerResult<_>>()?,
        ),
        Json::Object(object) => Node::Map(
            object
                .iter()
                .map(|(k, v)| Ok((k.clone(), from_json(v)?)))
                .collect::<SerializerResult<_>>()?,
        )
        .into_ref(),
    };
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::structural_eq;

    #[test]
    fn round_trip_preserves_structure() {
        let root = Node::map(vec![
            ("appName", Node::text("HelloApp")),
            (
                "users",
                Node::seq(vec![Node::map(vec![
                    ("id", Node::int(1)),
                    ("name", Node::text("Bob")),
                    ("active", Node::bool(true)),
                ])]),
            ),
            ("nullable", Node::null()),
        ]);

        let serializer = TreeSerializer;
        let text = serializer.serialize(&root, false).unwrap();
        let reloaded = serializer.deserialize(&text).unwrap();
        assert!(structural_eq(&root, &reloaded));
    }

    #[test]
    fn output_is_deterministic() {
        let root = Node::map(vec![("b", Node::int(2)), ("a", Node::int(1))]);
        let serializer = TreeSerializer;
        let first = serializer.serialize(&root, false).unwrap();
        let second = serializer.serialize(&root, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn shared_references_are_duplicated() {
        let shared = Node::map(vec![("n", Node::int(1))]);
        let root = Node::seq(vec![shared.clone(), shared]);

        let serializer = TreeSerializer;
        let text = serializer.serialize(&root, false).unwrap();
        assert_eq!(text, r#"[{"n":1},{"n":1}]"#);
    }

    #[test]
    fn cycles_are_rejected() {
        let root = Node::map(vec![]);
        if let Node::Map(entries) = &mut *root.write() {
            entries.insert("me".to_string(), root.clone());
        }

        let result = TreeSerializer.serialize(&root, false);
        assert!(matches!(result, Err(SerializerError::Cycle)));
    }

    #[test]
    fn floats_and_ints_stay_distinct() {
        let root = Node::seq(vec![Node::int(1), Node::float(1.5)]);
        let serializer = TreeSerializer;
        let text = serializer.serialize(&root, false).unwrap();
        let reloaded = serializer.deserialize(&text).unwrap();
        let guard = reloaded.read();
        if let Node::Seq(items) = &*guard {
            assert!(matches!(*items[0].read(), Node::Int(1)));
            assert!(matches!(*items[1].read(), Node::Float(f) if f == 1.5));
        } else {
            panic!("expected Seq");
        }
    }
}
