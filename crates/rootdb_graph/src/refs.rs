//! Reference-capable serializer using a flat node table.
//!
//! The snapshot is a JSON array of node records; element 0 is the root.
//! Sequences are arrays of node indices and mappings are objects whose
//! values are node indices, so a node that is shared in memory occupies
//! one table slot no matter how many parents point at it. Cycles are just
//! indices that point backwards. The result is less readable than plain
//! JSON, which is why this serializer is opt-in.

use crate::error::{SerializerError, SerializerResult};
use crate::node::{node_id, Node, NodeRef};
use crate::serializer::GraphSerializer;
use serde_json::Value as Json;
use std::collections::HashMap;

/// Serializes a graph as a flat node table, preserving shared references
/// and cycles exactly.
#[derive(Debug, Default, Clone, Copy)]
pub struct RefSerializer;

impl GraphSerializer for RefSerializer {
    fn name(&self) -> &'static str {
        "ref-json"
    }

    fn supports_references(&self) -> bool {
        true
    }

    fn serialize(&self, root: &NodeRef, pretty: bool) -> SerializerResult<String> {
        let mut index = HashMap::new();
        let mut table: Vec<Option<Json>> = Vec::new();
        intern(root, &mut index, &mut table)?;

        let nodes: Vec<Json> = table
            .into_iter()
            .map(|slot| slot.unwrap_or(Json::Null))
            .collect();
        let json = Json::Array(nodes);
        let text = if pretty {
            serde_json::to_string_pretty(&json)?
        } else {
            serde_json::to_string(&json)?
        };
        Ok(text)
    }

    fn deserialize(&self, text: &str) -> SerializerResult<NodeRef> {
        let json: Json = serde_json::from_str(text)?;
        let Json::Array(records) = json else {
            return Err(SerializerError::invalid_structure(
                "expected a top-level node table array",
            ));
        };
        if records.is_empty() {
            return Err(SerializerError::invalid_structure("empty node table"));
        }

        let mut built = vec![None; records.len()];
        revive(&records, 0, &mut built)
    }
}

/// Assigns the node a table slot (first visit wins) and encodes it.
fn intern(
    node: &NodeRef,
    index: &mut HashMap<usize, usize>,
    table: &mut Vec<Option<Json>>,
) -> SerializerResult<usize> {
    if let Some(&slot) = index.get(&node_id(node)) {
        return Ok(slot);
    }

    let slot = table.len();
    index.insert(node_id(node), slot);
    table.push(None);

    let record = match &*node.read() {
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
                .map(|item| Ok(Json::from(intern(item, index, table)? as u64)))
                .collect::<SerializerResult<_>>()?,
        ),
        Node::Map(entries) => {
            let mut object = serde_json::Map::new();
            for (key, value) in entries {
                let child = intern(value, index, table)?;
                object.insert(key.clone(), Json::from(child as u64));
            }
            Json::Object(object)
        }
        Node::Instance { class, .. } => {
            return Err(SerializerError::invalid_structure(format!(
                "untagged class instance of {class:?} reached the serializer"
            )));
        }
    };

    table[slot] = Some(record);
    Ok(slot)
}

fn revive(
    records: &[Json],
    idx: usize,
    built: &mut Vec<Option<NodeRef>>,
) -> SerializerResult<NodeRef> {
    let Some(record) = records.get(idx) else {
        return Err(SerializerError::invalid_structure(format!(
            "node index {idx} out of range"
        )));
    };
    if let Some(node) = &built[idx] {
        return Ok(node.clone());
    }

    // Register a placeholder first so back references resolve during
    // construction of the node itself.
    let node = Node::null();
    built[idx] = Some(node.clone());

    let value = match record {
        Json::Null => Node::Null,
        Json::Bool(b) => Node::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Node::Int(i)
            } else if let Some(f) = n.as_f64() {
                Node::Float(f)
            } else {
                return Err(SerializerError::invalid_structure(format!(
                    "number out of range: {n}"
                )));
            }
        }
        Json::String(s) => Node::Text(s.clone()),
        Json::Array(items) => Node::Seq(
            items
                .iter()
                .map(|item| revive(records, child_index(item)?, built))
                .collect::<SerializerResult<_>>()?,
        ),
        Json::Object(object) => Node::Map(
            object
                .iter()
                .map(|(k, v)| Ok((k.clone(), revive(records, child_index(v)?, built)?)))
                .collect::<SerializerResult<_>>()?,
        ),
    };

    *node.write() = value;
    Ok(node)
}

fn child_index(value: &Json) -> SerializerResult<usize> {
    value
        .as_u64()
        .map(|i| i as usize)
        .ok_or_else(|| SerializerError::invalid_structure("child reference is not a node index"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::structural_eq;
    use std::sync::Arc;

    #[test]
    fn round_trip_preserves_structure() {
        let root = Node::map(vec![
            ("title", Node::text("notes")),
            ("tags", Node::seq(vec![Node::text("a"), Node::text("b")])),
            ("count", Node::int(2)),
        ]);

        let serializer = RefSerializer;
        let text = serializer.serialize(&root, false).unwrap();
        let reloaded = serializer.deserialize(&text).unwrap();
        assert!(structural_eq(&root, &reloaded));
    }

    #[test]
    fn shared_references_survive_round_trip() {
        let shared = Node::map(vec![("n", Node::int(7))]);
        let root = Node::seq(vec![shared.clone(), shared]);

        let serializer = RefSerializer;
        let text = serializer.serialize(&root, false).unwrap();
        let reloaded = serializer.deserialize(&text).unwrap();

        let guard = reloaded.read();
        if let Node::Seq(items) = &*guard {
            assert!(Arc::ptr_eq(&items[0], &items[1]));
        } else {
            panic!("expected Seq");
        }
    }

    #[test]
    fn cycles_survive_round_trip() {
        let root = Node::map(vec![("name", Node::text("loop"))]);
        if let Node::Map(entries) = &mut *root.write() {
            entries.insert("me".to_string(), root.clone());
        }

        let serializer = RefSerializer;
        let text = serializer.serialize(&root, false).unwrap();
        let reloaded = serializer.deserialize(&text).unwrap();

        let guard = reloaded.read();
        if let Node::Map(entries) = &*guard {
            assert!(Arc::ptr_eq(&entries["me"], &reloaded));
        } else {
            panic!("expected Map");
        }
    }

    #[test]
    fn encoding_is_idempotent() {
        let shared = Node::seq(vec![Node::int(1)]);
        let root = Node::map(vec![("a", shared.clone()), ("b", shared)]);

        let serializer = RefSerializer;
        let text = serializer.serialize(&root, false).unwrap();
        let reloaded = serializer.deserialize(&text).unwrap();
        let reencoded = serializer.serialize(&reloaded, false).unwrap();
        assert_eq!(text, reencoded);
    }

    #[test]
    fn rejects_malformed_tables() {
        let serializer = RefSerializer;
        assert!(serializer.deserialize("{}").is_err());
        assert!(serializer.deserialize("[]").is_err());
        // Index out of range.
        assert!(serializer.deserialize("[[5]]").is_err());
    }
}
