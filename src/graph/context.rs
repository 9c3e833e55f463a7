//! Arena-backed dataflow graph
//!
//! `Graph` is the central structure the partitioner works on. Nodes live in
//! an index-stable arena; edges are `(NodeId, slot)` pairs. A node can only
//! be added once its producers exist, so freshly built graphs are acyclic and
//! arena order is topological. Rewrites append fused nodes at the end of the
//! arena, which is why traversals that need an order use
//! [`Graph::topological_order`] instead of arena order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::error::{DelegateError, DelegateResult};

use super::maps::{build_consumer_map, ConsumerMap, NameMap};
use super::node::{Node, NodeEntry, NodeId, NodeRef};
use super::schema::OpRegistry;

/// Dataflow graph
#[derive(Debug, Clone)]
pub struct Graph {
    /// Arena; `None` marks a slot vacated by a rewrite
    pub(super) nodes: Vec<Option<Node>>,

    /// Maps node name → id
    pub(super) names: NameMap,

    /// External output entries
    pub(super) outputs: Vec<NodeEntry>,

    /// Operator schemas nodes are validated against
    pub(super) registry: Arc<OpRegistry>,
}

impl Graph {
    /// Create an empty graph
    pub fn new(registry: Arc<OpRegistry>) -> Self {
        Self {
            nodes: Vec::new(),
            names: NameMap::default(),
            outputs: Vec::new(),
            registry,
        }
    }

    /// Schema registry of this graph
    pub fn registry(&self) -> &Arc<OpRegistry> {
        &self.registry
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a live node
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Get a live node or fail
    pub fn node(&self, id: NodeId) -> DelegateResult<&Node> {
        self.get(id).ok_or(DelegateError::InvalidNode(id))
    }

    /// Get a live node paired with its id
    pub fn node_ref(&self, id: NodeId) -> DelegateResult<NodeRef<'_>> {
        self.node(id).map(|node| NodeRef::new(id, node))
    }

    /// Get a mutable live node or fail
    pub fn node_mut(&mut self, id: NodeId) -> DelegateResult<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(|slot| slot.as_mut())
            .ok_or(DelegateError::InvalidNode(id))
    }

    /// Check if an id refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Find a node by name
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Check if a name is taken
    pub fn has_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Name of a live node
    pub fn name_of(&self, id: NodeId) -> DelegateResult<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the graph has no live nodes
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Arena length, vacant slots included
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate live nodes in arena order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|n| (NodeId(i), n)))
    }

    /// Iterate live node ids in arena order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    /// Iterate fused nodes
    pub fn fused_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.iter().filter(|(_, n)| n.is_fused())
    }

    /// External output entries
    pub fn outputs(&self) -> &[NodeEntry] {
        &self.outputs
    }

    // ========================================================================
    // Graph traversal
    // ========================================================================

    /// Build the consumer map for the current graph state
    pub fn consumers(&self) -> ConsumerMap {
        build_consumer_map(self)
    }

    /// Check that an entry refers to an existing output slot
    pub fn check_entry(&self, consumer: &str, entry: NodeEntry) -> DelegateResult<()> {
        let producer = self.get(entry.node).ok_or_else(|| DelegateError::InvalidEdge {
            node: consumer.to_string(),
            reason: format!("producer {} is not a live node", entry.node),
        })?;

        if entry.index >= producer.num_outputs {
            return Err(DelegateError::InvalidEdge {
                node: consumer.to_string(),
                reason: format!(
                    "`{}` has {} output(s), slot {} requested",
                    producer.name, producer.num_outputs, entry.index
                ),
            });
        }

        Ok(())
    }

    /// Topological order of the live nodes
    ///
    /// Kahn's algorithm with the smallest ready id first, so the result equals
    /// arena order whenever arena order is already topological.
    pub fn topological_order(&self) -> DelegateResult<Vec<NodeId>> {
        let consumers = self.consumers();
        let mut pending: Vec<usize> = vec![0; self.nodes.len()];
        let mut ready = BinaryHeap::new();

        for (id, node) in self.iter() {
            let mut distinct: Vec<NodeId> = node.inputs.iter().map(|e| e.node).collect();
            distinct.sort_unstable();
            distinct.dedup();
            pending[id.0] = distinct.len();
            if distinct.is_empty() {
                ready.push(Reverse(id));
            }
        }

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for &consumer in consumers.get(id) {
                pending[consumer.0] -= 1;
                if pending[consumer.0] == 0 {
                    ready.push(Reverse(consumer));
                }
            }
        }

        if order.len() != self.len() {
            return Err(DelegateError::Invariant(format!(
                "graph has a cycle through {} node(s)",
                self.len() - order.len()
            )));
        }

        Ok(order)
    }

    /// Verify every edge and graph output, and that the graph is acyclic
    pub fn check_consistency(&self) -> DelegateResult<()> {
        for (_, node) in self.iter() {
            for entry in &node.inputs {
                self.check_entry(&node.name, *entry)?;
            }
        }
        for entry in &self.outputs {
            self.check_entry("<graph output>", *entry)?;
        }
        self.topological_order().map(|_| ())
    }

    /// Names of all variable nodes in arena order
    pub fn list_input_names(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, n)| n.is_variable())
            .map(|(_, n)| n.name.as_str())
            .collect()
    }
}
