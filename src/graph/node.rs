//! Node, edge and attribute types

use std::fmt;

use indexmap::IndexMap;

use crate::error::{DelegateError, DelegateResult};
use crate::partition::FusedOp;

/// Index of a node in a graph arena
///
/// Ids are never reused: once a node is taken out of the arena its slot
/// stays vacant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to one output slot of a producer node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeEntry {
    /// Producer node
    pub node: NodeId,
    /// Output slot on the producer
    pub index: u32,
}

impl NodeEntry {
    /// Create an entry
    pub fn new(node: NodeId, index: u32) -> Self {
        Self { node, index }
    }

    /// Entry for the first output of `node`
    pub fn first(node: NodeId) -> Self {
        Self { node, index: 0 }
    }
}

impl From<NodeId> for NodeEntry {
    fn from(node: NodeId) -> Self {
        Self::first(node)
    }
}

/// String attribute dictionary (insertion ordered)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs(IndexMap<String, String>);

impl Attrs {
    /// Empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    /// Insert or overwrite a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Check whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate key/value pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// What a node computes
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Graph input or parameter; has no operator
    Variable,
    /// Operator invocation of the given kind
    Op(String),
    /// Opaque node standing in for a delegated cluster
    Fused {
        /// Operator kind of the fused node (e.g. `_TensorRT`)
        op: String,
        /// Embedded subgraph and slot tables
        state: Box<FusedOp>,
    },
}

/// A graph node
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique node name
    pub name: String,
    /// Variable, operator or fused
    pub kind: NodeKind,
    /// Attribute dictionary
    pub attrs: Attrs,
    /// Ordered input edges
    pub inputs: Vec<NodeEntry>,
    /// Number of output slots
    pub num_outputs: u32,
}

impl Node {
    /// Create a variable node
    pub fn variable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Variable,
            attrs: Attrs::new(),
            inputs: Vec::new(),
            num_outputs: 1,
        }
    }

    /// Create an operator node with a single output
    pub fn op(op: impl Into<String>, name: impl Into<String>, inputs: Vec<NodeEntry>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Op(op.into()),
            attrs: Attrs::new(),
            inputs,
            num_outputs: 1,
        }
    }

    /// Builder-style attribute setter
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key, value);
        self
    }

    /// Builder-style output count setter
    pub fn with_outputs(mut self, num_outputs: u32) -> Self {
        self.num_outputs = num_outputs;
        self
    }

    /// True for graph inputs and parameters
    pub fn is_variable(&self) -> bool {
        matches!(self.kind, NodeKind::Variable)
    }

    /// True for nodes produced by a rewrite
    pub fn is_fused(&self) -> bool {
        matches!(self.kind, NodeKind::Fused { .. })
    }

    /// Operator kind, `None` for variables
    pub fn op_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Variable => None,
            NodeKind::Op(op) => Some(op),
            NodeKind::Fused { op, .. } => Some(op),
        }
    }

    /// Fused state, if this is a fused node
    pub fn fused(&self) -> Option<&FusedOp> {
        match &self.kind {
            NodeKind::Fused { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Mutable fused state
    pub fn fused_mut(&mut self) -> Option<&mut FusedOp> {
        match &mut self.kind {
            NodeKind::Fused { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Required attribute lookup
    ///
    /// A missing key means the graph was built without schema validation.
    pub fn attr(&self, key: &str) -> DelegateResult<&str> {
        self.attrs
            .get(key)
            .ok_or_else(|| DelegateError::MissingAttribute {
                node: self.name.clone(),
                key: key.to_string(),
            })
    }
}

/// A node together with its arena id
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    /// Arena id
    pub id: NodeId,
    /// The node
    pub node: &'a Node,
}

impl<'a> NodeRef<'a> {
    /// Pair a node with its id
    pub fn new(id: NodeId, node: &'a Node) -> Self {
        Self { id, node }
    }
}

impl std::ops::Deref for NodeRef<'_> {
    type Target = Node;

    fn deref(&self) -> &Node {
        self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_node() {
        let v = Node::variable("data");
        assert!(v.is_variable());
        assert!(v.op_name().is_none());
        assert_eq!(v.num_outputs, 1);
    }

    #[test]
    fn test_attr_lookup() {
        let pool = Node::op("Pooling", "pool0", vec![]).with_attr("pool_type", "avg");
        assert_eq!(pool.attr("pool_type").unwrap(), "avg");

        let err = pool.attr("kernel").unwrap_err();
        assert!(matches!(err, DelegateError::MissingAttribute { .. }));
    }

    #[test]
    fn test_attrs_preserve_order() {
        let attrs: Attrs = [("b", "1"), ("a", "2")].into_iter().collect();
        let keys: Vec<_> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
