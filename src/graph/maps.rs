//! Graph map types and builders
//!
//! Lookup structures derived from the arena. They are rebuilt on demand and
//! never stored across a mutation.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::context::Graph;
use super::node::NodeId;

/// Type alias for name map: node_name → id
pub type NameMap = FxHashMap<String, NodeId>;

/// Consumers of every node, in arena order, without repeats
///
/// SmallVec optimized for common case of 1-4 consumers
#[derive(Debug, Default)]
pub struct ConsumerMap {
    consumers: FxHashMap<NodeId, SmallVec<[NodeId; 4]>>,
}

impl ConsumerMap {
    /// Consumers of `id`
    pub fn get(&self, id: NodeId) -> &[NodeId] {
        self.consumers
            .get(&id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Number of distinct consumers of `id`
    pub fn count(&self, id: NodeId) -> usize {
        self.get(id).len()
    }
}

/// Build consumer map from the live nodes of a graph
///
/// Nodes are visited in arena order, so each consumer list comes out sorted.
pub fn build_consumer_map(graph: &Graph) -> ConsumerMap {
    let mut map: FxHashMap<NodeId, SmallVec<[NodeId; 4]>> = FxHashMap::default();

    for (id, node) in graph.iter() {
        for input in &node.inputs {
            let list = map.entry(input.node).or_default();
            if list.last() != Some(&id) {
                list.push(id);
            }
        }
    }

    ConsumerMap { consumers: map }
}
