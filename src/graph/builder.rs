//! Graph builder
//!
//! Assembles a [`Graph`] node by node, validating each node against the
//! operator schema registry as it is added.

use std::sync::Arc;

use crate::error::DelegateResult;
use crate::property::default_registry;

use super::context::Graph;
use super::node::{Node, NodeEntry};
use super::schema::OpRegistry;

/// Builder for constructing graphs
#[derive(Debug)]
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    /// Builder backed by [`default_registry`]
    pub fn new() -> Self {
        Self::with_registry(Arc::new(default_registry()))
    }

    /// Builder backed by a custom registry
    pub fn with_registry(registry: Arc<OpRegistry>) -> Self {
        Self {
            graph: Graph::new(registry),
        }
    }

    /// Add a variable (graph input or parameter)
    pub fn variable(&mut self, name: &str) -> DelegateResult<NodeEntry> {
        self.node(Node::variable(name))
    }

    /// Add a single-output operator without attributes
    pub fn op(&mut self, op: &str, name: &str, inputs: &[NodeEntry]) -> DelegateResult<NodeEntry> {
        self.node(Node::op(op, name, inputs.to_vec()))
    }

    /// Add a single-output operator with attributes
    pub fn op_with(
        &mut self,
        op: &str,
        name: &str,
        inputs: &[NodeEntry],
        attrs: &[(&str, &str)],
    ) -> DelegateResult<NodeEntry> {
        let mut node = Node::op(op, name, inputs.to_vec());
        for (key, value) in attrs {
            node.attrs.insert(*key, *value);
        }
        self.node(node)
    }

    /// Add an arbitrary node and return the entry for its first output
    pub fn node(&mut self, node: Node) -> DelegateResult<NodeEntry> {
        self.graph.push_node(node).map(NodeEntry::first)
    }

    /// Access the graph under construction
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Finish the graph with the given external outputs
    pub fn build(mut self, outputs: &[NodeEntry]) -> DelegateResult<Graph> {
        for entry in outputs {
            self.graph.add_output(*entry)?;
        }
        Ok(self.graph)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
