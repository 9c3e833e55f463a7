//! Post-rewrite verification
//!
//! Checks a rewritten graph and its fused nodes for the properties the
//! rewriter guarantees: slot tables that are contiguous and agree with the
//! fused node's inputs, no edge into an absorbed node, and an acyclic host.

use crate::error::{DelegateError, DelegateResult};
use crate::graph::{Graph, NodeId};

/// Verification result with detailed issues
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Critical issues
    pub errors: Vec<String>,
    /// Non-critical issues
    pub warnings: Vec<String>,
}

impl VerifyReport {
    /// Whether no errors were found
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Add a warning
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Convert into a result, failing with the first error
    pub fn into_result(self) -> DelegateResult<()> {
        match self.errors.into_iter().next() {
            Some(first) => Err(DelegateError::Invariant(first)),
            None => Ok(()),
        }
    }
}

/// Verify a rewritten graph
pub fn verify_graph(graph: &Graph) -> VerifyReport {
    let mut report = VerifyReport::default();

    for (id, node) in graph.iter() {
        for entry in &node.inputs {
            if !graph.contains(entry.node) {
                report.add_error(format!(
                    "`{}` still reads absorbed node {}",
                    node.name, entry.node
                ));
            }
        }
        if node.is_fused() {
            verify_fused(graph, id, &mut report);
        }
    }

    for entry in graph.outputs() {
        if !graph.contains(entry.node) {
            report.add_error(format!("graph output reads absorbed node {}", entry.node));
        }
    }

    if report.is_valid() {
        if let Err(err) = graph.check_consistency() {
            report.add_error(err.to_string());
        }
    }

    report
}

/// Verify the slot tables of one fused node
pub fn verify_fused(graph: &Graph, id: NodeId, report: &mut VerifyReport) {
    let Some(node) = graph.get(id) else {
        report.add_error(format!("fused node {} is not live", id));
        return;
    };
    let Some(state) = node.fused() else {
        report.add_error(format!("`{}` is not a fused node", node.name));
        return;
    };

    let names = state.subgraph.input_names();
    if names.len() != node.inputs.len() {
        report.add_error(format!(
            "`{}` has {} inputs but {} cut variables",
            node.name,
            node.inputs.len(),
            names.len()
        ));
    }

    // Slots are 0..n in discovery order
    for (expected, (name, slot)) in state.params.inputs_to_idx.iter().enumerate() {
        if *slot as usize != expected {
            report.add_error(format!(
                "`{}`: input `{}` has slot {}, expected {}",
                node.name, name, slot, expected
            ));
        }
        if names.get(expected).copied() != Some(name.as_str()) {
            report.add_error(format!(
                "`{}`: input slot {} is bound to `{}` in the table but not in the subgraph",
                node.name, expected, name
            ));
        }
    }
    if state.params.inputs_to_idx.len() != node.inputs.len() {
        report.add_error(format!(
            "`{}`: {} input slots recorded for {} inputs",
            node.name,
            state.params.inputs_to_idx.len(),
            node.inputs.len()
        ));
    }

    let num_outputs = state.subgraph.num_outputs();
    if num_outputs != node.num_outputs as usize {
        report.add_error(format!(
            "`{}` declares {} outputs, subgraph has {}",
            node.name, node.num_outputs, num_outputs
        ));
    }
    for (name, slot) in &state.params.outputs_to_idx {
        if *slot as usize >= num_outputs {
            report.add_error(format!(
                "`{}`: output `{}` bound to missing slot {}",
                node.name, name, slot
            ));
        }
    }
    if state.params.outputs_to_idx.len() < num_outputs {
        report.add_warning(format!(
            "`{}`: {} of {} output slots have no recorded name",
            node.name,
            num_outputs - state.params.outputs_to_idx.len(),
            num_outputs
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    #[test]
    fn test_plain_graph_is_valid() {
        let mut b = GraphBuilder::new();
        let x = b.variable("x").unwrap();
        let r = b.op("relu", "r", &[x]).unwrap();
        let graph = b.build(&[r]).unwrap();

        let report = verify_graph(&graph);
        assert!(report.is_valid());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_dangling_edge_detected() {
        let mut b = GraphBuilder::new();
        let x = b.variable("x").unwrap();
        let r0 = b.op("relu", "r0", &[x]).unwrap();
        let r1 = b.op("relu", "r1", &[r0]).unwrap();
        let mut graph = b.build(&[r1]).unwrap();

        graph.take_node(r0.node).unwrap();

        let report = verify_graph(&graph);
        assert!(!report.is_valid());
        assert!(matches!(
            report.into_result(),
            Err(DelegateError::Invariant(_))
        ));
    }

    #[test]
    fn test_non_fused_node_reported() {
        let mut b = GraphBuilder::new();
        let x = b.variable("x").unwrap();
        let r = b.op("relu", "r", &[x]).unwrap();
        let graph = b.build(&[r]).unwrap();

        let mut report = VerifyReport::default();
        verify_fused(&graph, r.node, &mut report);
        assert_eq!(report.errors.len(), 1);
    }
}
