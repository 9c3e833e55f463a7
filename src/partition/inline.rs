//! Inlining fused nodes
//!
//! The inverse of a rewrite: a fused node is replaced by the nodes of its
//! embedded subgraph. Cut-input variables are bound back to the fused node's
//! inputs through `inputs_to_idx`, and every consumer of fused slot `i` is
//! reconnected to inner output `i`.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{DelegateError, DelegateResult};
use crate::graph::{EdgeSite, Graph, NodeEntry, NodeId, NodeKind};

/// Replace a fused node with its subgraph, returning the ids of the restored nodes
pub fn inline_fused_node(graph: &mut Graph, fused: NodeId) -> DelegateResult<Vec<NodeId>> {
    let name = graph.name_of(fused)?.to_string();
    if !graph.node(fused)?.is_fused() {
        return Err(DelegateError::NotFused(name));
    }

    let uses: Vec<EdgeSite> = graph
        .edge_sites()
        .into_iter()
        .filter(|site| graph.entry_at(*site).is_ok_and(|e| e.node == fused))
        .collect();

    let node = graph.take_node(fused)?;
    let host_inputs = node.inputs;
    let state = match node.kind {
        NodeKind::Fused { state, .. } => state,
        _ => return Err(DelegateError::NotFused(name)),
    };

    let inner = state.subgraph.graph();
    let mut mapped: FxHashMap<NodeId, NodeEntry> = FxHashMap::default();

    for &var in state.subgraph.inputs() {
        let var_name = inner.name_of(var)?;
        let slot = state.params.input_slot(var_name).ok_or_else(|| {
            DelegateError::Invariant(format!("`{}` has no slot for cut input `{}`", name, var_name))
        })?;
        let entry = host_inputs.get(slot as usize).copied().ok_or_else(|| {
            DelegateError::Invariant(format!("`{}` has no input {}", name, slot))
        })?;
        mapped.insert(var, entry);
    }

    let mut restored = Vec::new();
    for id in inner.topological_order()? {
        if mapped.contains_key(&id) {
            continue;
        }
        let mut node = inner.node(id)?.clone();
        for entry in &mut node.inputs {
            let original = *entry;
            let base = mapped
                .get(&original.node)
                .copied()
                .ok_or(DelegateError::InvalidNode(original.node))?;
            // Cut variables stand for a whole host entry; other nodes keep the slot
            *entry = if state.subgraph.inputs().contains(&original.node) {
                base
            } else {
                NodeEntry::new(base.node, original.index)
            };
        }
        let host_id = graph.push_node(node)?;
        mapped.insert(id, NodeEntry::first(host_id));
        restored.push(host_id);
    }

    for site in uses {
        let slot = graph.entry_at(site)?.index as usize;
        let inner_entry = state.subgraph.outputs().get(slot).copied().ok_or_else(|| {
            DelegateError::Invariant(format!("`{}` has no output {}", name, slot))
        })?;
        let base = mapped
            .get(&inner_entry.node)
            .copied()
            .ok_or(DelegateError::InvalidNode(inner_entry.node))?;
        let target = if state.subgraph.inputs().contains(&inner_entry.node) {
            base
        } else {
            NodeEntry::new(base.node, inner_entry.index)
        };
        graph.set_entry(site, target)?;
    }

    debug!(fused = %name, restored = restored.len(), "inlined fused node");
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{partition_graph, PartitionConfig};
    use crate::property::DelegationTarget;
    use crate::graph::GraphBuilder;

    #[test]
    fn test_inline_restores_chain() {
        let mut b = GraphBuilder::new();
        let data = b.variable("data").unwrap();
        let w = b.variable("w").unwrap();
        let conv = b.op("Convolution", "conv", &[data, w]).unwrap();
        let relu = b.op("relu", "relu", &[conv]).unwrap();
        let soft = b.op("softmax", "soft", &[relu]).unwrap();
        let mut graph = b.build(&[soft, relu]).unwrap();

        let report =
            partition_graph(&mut graph, &DelegationTarget::TensorRt, &PartitionConfig::default())
                .unwrap();
        let fused = report.fused[0].id;

        let restored = inline_fused_node(&mut graph, fused).unwrap();
        assert_eq!(restored.len(), 3);
        assert!(graph.fused_nodes().next().is_none());

        let conv = graph.find("conv").unwrap();
        let relu = graph.find("relu").unwrap();
        let w = graph.find("w").unwrap();
        assert_eq!(
            graph.node(conv).unwrap().inputs,
            vec![data, NodeEntry::first(w)]
        );
        assert_eq!(graph.node(soft.node).unwrap().inputs, vec![NodeEntry::first(relu)]);
        assert_eq!(graph.outputs()[1], NodeEntry::first(relu));
        assert!(graph.check_consistency().is_ok());
    }

    #[test]
    fn test_inline_rejects_plain_node() {
        let mut b = GraphBuilder::new();
        let x = b.variable("x").unwrap();
        let r = b.op("relu", "r", &[x]).unwrap();
        let mut graph = b.build(&[r]).unwrap();

        assert!(matches!(
            inline_fused_node(&mut graph, r.node),
            Err(DelegateError::NotFused(_))
        ));
    }
}
