//! The in-memory graph node model.
//!
//! Every node in the live graph is explicitly one of: primitive, sequence,
//! mapping, or registered class instance. Nodes are shared by reference
//! ([`NodeRef`]), so the same node can be reachable via two paths, and a
//! graph may contain cycles. Two `NodeRef`s are "the same object" exactly
//! when their `Arc`s point at the same allocation.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// A shared, mutable reference to a graph node.
pub type NodeRef = Arc<RwLock<Node>>;

/// The field map of a mapping or class instance. Keys are kept sorted so
/// equal graphs serialize to identical bytes.
pub type Fields = BTreeMap<String, NodeRef>;

/// A single node in the object graph.
#[derive(Debug)]
pub enum Node {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Text string.
    Text(String),
    /// Ordered sequence of nodes.
    Seq(Vec<NodeRef>),
    /// Unordered keyed mapping (plain, anonymous aggregate).
    Map(Fields),
    /// An instance of a registered class, distinguished from a plain
    /// mapping at construction time by its class name.
    Instance {
        /// The registered class name.
        class: String,
        /// The instance's fields.
        fields: Fields,
    },
}

impl Node {
    /// Wraps this node into a shared reference.
    pub fn into_ref(self) -> NodeRef {
        Arc::new(RwLock::new(self))
    }

    /// Creates a null node.
    pub fn null() -> NodeRef {
        Node::Null.into_ref()
    }

    /// Creates a boolean node.
    pub fn bool(value: bool) -> NodeRef {
        Node::Bool(value).into_ref()
    }

    /// Creates an integer node.
    pub fn int(value: i64) -> NodeRef {
        Node::Int(value).into_ref()
    }

    /// Creates a float node.
    pub fn float(value: f64) -> NodeRef {
        Node::Float(value).into_ref()
    }

    /// Creates a text node.
    pub fn text(value: impl Into<String>) -> NodeRef {
        Node::Text(value.into()).into_ref()
    }

    /// Creates a sequence node.
    pub fn seq(items: Vec<NodeRef>) -> NodeRef {
        Node::Seq(items).into_ref()
    }

    /// Creates a mapping node from `(key, value)` entries.
    pub fn map(entries: Vec<(&str, NodeRef)>) -> NodeRef {
        Node::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
        .into_ref()
    }

    /// Creates a class instance node from `(key, value)` entries.
    pub fn instance(class: &str, fields: Vec<(&str, NodeRef)>) -> NodeRef {
        Node::Instance {
            class: class.to_string(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
        .into_ref()
    }
}

/// Returns the identity key of a node (its allocation address).
#[must_use]
pub fn node_id(node: &NodeRef) -> usize {
    Arc::as_ptr(node) as usize
}

/// Deep-copies a graph, preserving sharing and cycles.
///
/// If the same node is reachable via two paths in the input, both paths
/// point at one shared node in the copy.
#[must_use]
pub fn deep_copy(root: &NodeRef) -> NodeRef {
    let mut memo = HashMap::new();
    copy_node(root, &mut memo)
}

fn copy_node(node: &NodeRef, memo: &mut HashMap<usize, NodeRef>) -> NodeRef {
    if let Some(copy) = memo.get(&node_id(node)) {
        return copy.clone();
    }

    // Register a placeholder first so cycles resolve to the copy.
    let copy = Node::null();
    memo.insert(node_id(node), copy.clone());

    let replacement = match &*node.read() {
        Node::Null => Node::Null,
        Node::Bool(b) => Node::Bool(*b),
        Node::Int(i) => Node::Int(*i),
        Node::Float(f) => Node::Float(*f),
        Node::Text(s) => Node::Text(s.clone()),
        Node::Seq(items) => Node::Seq(items.iter().map(|i| copy_node(i, memo)).collect()),
        Node::Map(entries) => Node::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), copy_node(v, memo)))
                .collect(),
        ),
        Node::Instance { class, fields } => Node::Instance {
            class: class.clone(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.clone(), copy_node(v, memo)))
                .collect(),
        },
    };

    *copy.write() = replacement;
    copy
}

/// Compares two graphs structurally, field for field, ignoring node
/// identity. Cycle-safe: a node pair already under comparison is assumed
/// equal, which terminates recursion through cycles.
#[must_use]
pub fn structural_eq(a: &NodeRef, b: &NodeRef) -> bool {
    let mut in_progress = HashSet::new();
    eq_node(a, b, &mut in_progress)
}

fn eq_node(a: &NodeRef, b: &NodeRef, in_progress: &mut HashSet<(usize, usize)>) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    if !in_progress.insert((node_id(a), node_id(b))) {
        return true;
    }

    let ga = a.read();
    let gb = b.read();
    match (&*ga, &*gb) {
        (Node::Null, Node::Null) => true,
        (Node::Bool(x), Node::Bool(y)) => x == y,
        (Node::Int(x), Node::Int(y)) => x == y,
        (Node::Float(x), Node::Float(y)) => x == y,
        (Node::Text(x), Node::Text(y)) => x == y,
        (Node::Seq(x), Node::Seq(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|(xi, yi)| eq_node(xi, yi, in_progress))
        }
        (Node::Map(x), Node::Map(y)) => eq_fields(x, y, in_progress),
        (
            Node::Instance {
                class: cx,
                fields: fx,
            },
            Node::Instance {
                class: cy,
                fields: fy,
            },
        ) => cx == cy && eq_fields(fx, fy, in_progress),
        _ => false,
    }
}

fn eq_fields(x: &Fields, y: &Fields, in_progress: &mut HashSet<(usize, usize)>) -> bool {
    x.len() == y.len()
        && x.iter().zip(y.iter()).all(|((kx, vx), (ky, vy))| {
            kx == ky && eq_node(vx, vy, in_progress)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_eq_ignores_identity() {
        let a = Node::map(vec![("x", Node::int(1)), ("y", Node::text("hi"))]);
        let b = Node::map(vec![("y", Node::text("hi")), ("x", Node::int(1))]);
        assert!(structural_eq(&a, &b));
    }

    #[test]
    fn structural_eq_detects_differences() {
        let a = Node::map(vec![("x", Node::int(1))]);
        let b = Node::map(vec![("x", Node::int(2))]);
        assert!(!structural_eq(&a, &b));

        let c = Node::map(vec![("x", Node::int(1)), ("y", Node::null())]);
        assert!(!structural_eq(&a, &c));
    }

    #[test]
    fn instance_and_map_are_distinct() {
        let a = Node::instance("User", vec![("id", Node::int(1))]);
        let b = Node::map(vec![("id", Node::int(1))]);
        assert!(!structural_eq(&a, &b));
    }

    #[test]
    fn deep_copy_preserves_sharing() {
        let shared = Node::map(vec![("n", Node::int(7))]);
        let root = Node::seq(vec![shared.clone(), shared.clone()]);

        let copy = deep_copy(&root);
        assert!(structural_eq(&root, &copy));

        let guard = copy.read();
        if let Node::Seq(items) = &*guard {
            assert!(Arc::ptr_eq(&items[0], &items[1]));
            assert!(!Arc::ptr_eq(&items[0], &shared));
        } else {
            panic!("expected Seq");
        }
    }

    #[test]
    fn deep_copy_handles_cycles() {
        let root = Node::map(vec![("name", Node::text("loop"))]);
        if let Node::Map(entries) = &mut *root.write() {
            entries.insert("me".to_string(), root.clone());
        }

        let copy = deep_copy(&root);
        assert!(structural_eq(&root, &copy));

        let guard = copy.read();
        if let Node::Map(entries) = &*guard {
            assert!(Arc::ptr_eq(&entries["me"], &copy));
        } else {
            panic!("expected Map");
        }
    }

    #[test]
    fn structural_eq_terminates_on_cycles() {
        let make_cycle = || {
            let n = Node::map(vec![("v", Node::int(1))]);
            if let Node::Map(entries) = &mut *n.write() {
                entries.insert("next".to_string(), n.clone());
            }
            n
        };
        assert!(structural_eq(&make_cycle(), &make_cycle()));
    }
}
