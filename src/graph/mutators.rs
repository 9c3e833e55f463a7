//! Graph mutation operations
//!
//! Methods for modifying the graph structure: adding and taking nodes, and
//! redirecting individual edges.

use crate::error::{DelegateError, DelegateResult};

use super::context::Graph;
use super::node::{Node, NodeEntry, NodeId};

/// Location of one edge in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeSite {
    /// Input `position` of node `consumer`
    Input {
        /// Consuming node
        consumer: NodeId,
        /// Index into the consumer's input list
        position: usize,
    },
    /// Entry at the given position of the graph output list
    GraphOutput(usize),
}

impl Graph {
    // ========================================================================
    // Node mutation
    // ========================================================================

    /// Append a node to the arena
    ///
    /// The node is validated against the registry, its name must be unused and
    /// every input must reference an existing output slot.
    pub fn push_node(&mut self, mut node: Node) -> DelegateResult<NodeId> {
        if self.names.contains_key(&node.name) {
            return Err(DelegateError::DuplicateName(node.name));
        }

        node.num_outputs = self.registry.validate(&node)?;

        for entry in &node.inputs {
            self.check_entry(&node.name, *entry)?;
        }

        let id = NodeId(self.nodes.len());
        self.names.insert(node.name.clone(), id);
        self.nodes.push(Some(node));
        Ok(id)
    }

    /// Take a node out of the arena, leaving its slot vacant
    ///
    /// Edges that still reference the node are not touched; callers rewire
    /// them first.
    pub fn take_node(&mut self, id: NodeId) -> DelegateResult<Node> {
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(|slot| slot.take())
            .ok_or(DelegateError::InvalidNode(id))?;
        self.names.remove(&node.name);
        Ok(node)
    }

    // ========================================================================
    // Edge mutation
    // ========================================================================

    /// Replace the whole input list of a node
    pub fn set_inputs(&mut self, id: NodeId, inputs: Vec<NodeEntry>) -> DelegateResult<()> {
        let name = self.name_of(id)?.to_string();
        for entry in &inputs {
            if entry.node == id {
                return Err(DelegateError::InvalidEdge {
                    node: name,
                    reason: "self loop".to_string(),
                });
            }
            self.check_entry(&name, *entry)?;
        }
        self.node_mut(id)?.inputs = inputs;
        Ok(())
    }

    /// Replace one input of a node
    pub fn set_input(&mut self, id: NodeId, position: usize, entry: NodeEntry) -> DelegateResult<()> {
        self.set_entry(EdgeSite::Input { consumer: id, position }, entry)
    }

    /// Append a graph output
    pub fn add_output(&mut self, entry: NodeEntry) -> DelegateResult<()> {
        self.check_entry("<graph output>", entry)?;
        self.outputs.push(entry);
        Ok(())
    }

    /// Read the entry stored at an edge site
    pub fn entry_at(&self, site: EdgeSite) -> DelegateResult<NodeEntry> {
        match site {
            EdgeSite::Input { consumer, position } => {
                let node = self.node(consumer)?;
                node.inputs
                    .get(position)
                    .copied()
                    .ok_or_else(|| DelegateError::InvalidEdge {
                        node: node.name.clone(),
                        reason: format!("no input at position {}", position),
                    })
            }
            EdgeSite::GraphOutput(position) => {
                self.outputs
                    .get(position)
                    .copied()
                    .ok_or_else(|| DelegateError::InvalidEdge {
                        node: "<graph output>".to_string(),
                        reason: format!("no output at position {}", position),
                    })
            }
        }
    }

    /// Redirect the edge at `site` to `entry`
    pub fn set_entry(&mut self, site: EdgeSite, entry: NodeEntry) -> DelegateResult<()> {
        // Fails early if the site does not exist
        self.entry_at(site)?;

        match site {
            EdgeSite::Input { consumer, position } => {
                let name = self.name_of(consumer)?.to_string();
                if entry.node == consumer {
                    return Err(DelegateError::InvalidEdge {
                        node: name,
                        reason: "self loop".to_string(),
                    });
                }
                self.check_entry(&name, entry)?;
                self.node_mut(consumer)?.inputs[position] = entry;
            }
            EdgeSite::GraphOutput(position) => {
                self.check_entry("<graph output>", entry)?;
                self.outputs[position] = entry;
            }
        }
        Ok(())
    }

    /// Every edge site in the graph: node inputs in arena order, then graph outputs
    pub fn edge_sites(&self) -> Vec<EdgeSite> {
        let mut sites = Vec::new();
        for (id, node) in self.iter() {
            for position in 0..node.inputs.len() {
                sites.push(EdgeSite::Input {
                    consumer: id,
                    position,
                });
            }
        }
        for position in 0..self.outputs.len() {
            sites.push(EdgeSite::GraphOutput(position));
        }
        sites
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn make_test_graph() -> Graph {
        let mut b = GraphBuilder::new();
        let x = b.variable("X").unwrap();
        let conv = b.op("Convolution", "conv_0", &[x]).unwrap();
        let relu = b.op("relu", "relu_0", &[conv]).unwrap();
        b.build(&[relu]).unwrap()
    }

    #[test]
    fn test_push_node() {
        let mut graph = make_test_graph();
        let relu = graph.find("relu_0").unwrap();

        let id = graph
            .push_node(Node::op("relu", "relu_1", vec![NodeEntry::first(relu)]))
            .unwrap();

        assert_eq!(graph.find("relu_1"), Some(id));
        assert_eq!(graph.consumers().get(relu), &[id]);
    }

    #[test]
    fn test_push_duplicate_name() {
        let mut graph = make_test_graph();
        let err = graph.push_node(Node::variable("X")).unwrap_err();
        assert!(matches!(err, DelegateError::DuplicateName(_)));
    }

    #[test]
    fn test_push_dangling_input() {
        let mut graph = make_test_graph();
        let err = graph
            .push_node(Node::op("relu", "r", vec![NodeEntry::new(NodeId(42), 0)]))
            .unwrap_err();
        assert!(matches!(err, DelegateError::InvalidEdge { .. }));
    }

    #[test]
    fn test_take_node() {
        let mut graph = make_test_graph();
        let relu = graph.find("relu_0").unwrap();

        let removed = graph.take_node(relu).unwrap();
        assert_eq!(removed.op_name(), Some("relu"));
        assert!(graph.find("relu_0").is_none());
        assert!(!graph.contains(relu));
        assert_eq!(graph.capacity(), 3);
        assert_eq!(graph.len(), 2);

        // Slot stays vacant
        assert!(graph.take_node(relu).is_err());
    }

    #[test]
    fn test_set_entry() {
        let mut graph = make_test_graph();
        let x = graph.find("X").unwrap();
        let relu = graph.find("relu_0").unwrap();

        let site = EdgeSite::Input {
            consumer: relu,
            position: 0,
        };
        graph.set_entry(site, NodeEntry::first(x)).unwrap();
        assert_eq!(graph.entry_at(site).unwrap(), NodeEntry::first(x));

        // Out of range slot
        assert!(graph.set_entry(site, NodeEntry::new(x, 3)).is_err());
        // Self loop
        assert!(graph.set_entry(site, NodeEntry::first(relu)).is_err());
    }

    #[test]
    fn test_edge_sites() {
        let graph = make_test_graph();
        let sites = graph.edge_sites();

        assert_eq!(sites.len(), 3);
        assert_eq!(sites[2], EdgeSite::GraphOutput(0));
    }
}
