//! Subgraph rewriting
//!
//! Replaces one extracted cluster with a fused node:
//!
//! 1. collect the cluster's external input entries and external output uses
//! 2. merge duplicate outputs and copy the cluster into a [`SubgraphDef`]
//! 3. let the property build the fused node (its attribute parser runs here)
//! 4. redirect external uses to the fused node, recording `outputs_to_idx`
//! 5. hand the input entries to the fused node, recording `inputs_to_idx`
//! 6. take the absorbed nodes out of the host arena

use tracing::{trace, warn};

use crate::error::{DelegateError, DelegateResult};
use crate::graph::{EdgeSite, Graph, NodeEntry, NodeId};
use crate::traits::SubgraphProperty;

use super::extract::Cluster;
use super::subgraph::{
    dedup_outputs, find_input_entries, find_output_uses, FusedOp, OutputDedup, SubgraphDef,
};

/// What one rewrite produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusedSummary {
    /// Id of the fused node in the host graph
    pub id: NodeId,
    /// Name of the fused node
    pub name: String,
    /// Operator nodes absorbed
    pub operators: usize,
    /// Variables absorbed as embedded parameters
    pub absorbed_variables: usize,
    /// Input slots
    pub inputs: usize,
    /// Output slots
    pub outputs: usize,
    /// External edges redirected to the fused node
    pub redirected_edges: usize,
}

fn fused_state_mut(graph: &mut Graph, fused: NodeId) -> DelegateResult<&mut FusedOp> {
    let node = graph.node_mut(fused)?;
    let name = node.name.clone();
    node.fused_mut().ok_or(DelegateError::NotFused(name))
}

/// Replace `cluster` in `graph` with a single fused node named `name`
pub fn rewrite_cluster(
    graph: &mut Graph,
    cluster: &Cluster,
    property: &dyn SubgraphProperty,
    name: String,
    dedup: OutputDedup,
) -> DelegateResult<FusedSummary> {
    let order = graph.topological_order()?;
    let inputs = find_input_entries(graph, cluster)?;
    let (raw_outputs, uses) = find_output_uses(graph, cluster, &order)?;
    let outputs = dedup_outputs(&raw_outputs, dedup);

    let subgraph = SubgraphDef::extract(graph, cluster, &inputs, &outputs)?;
    let operators = subgraph.operator_count();
    let absorbed_variables = subgraph.absorbed_count();

    let registry = graph.registry().clone();
    let node = property.create_subgraph_node(&registry, subgraph, name)?;
    let name = node.name.clone();
    let fused = graph.push_node(node)?;

    property.connect_subgraph_outputs(graph, fused, &outputs, &uses)?;
    property.connect_subgraph_inputs(graph, fused, &inputs)?;

    for &member in &cluster.members {
        graph.take_node(member)?;
    }

    Ok(FusedSummary {
        id: fused,
        name,
        operators,
        absorbed_variables,
        inputs: inputs.len(),
        outputs: outputs.len(),
        redirected_edges: uses.len(),
    })
}

/// Redirect every use of `outputs[i]` among `uses` to `(fused, i)`
///
/// `outputs_to_idx` gets the producer's name for each slot that had at least
/// one matching use. Edges already redirected no longer match later slots.
pub fn connect_outputs(
    graph: &mut Graph,
    fused: NodeId,
    outputs: &[NodeEntry],
    uses: &[EdgeSite],
) -> DelegateResult<()> {
    let mut recorded: Vec<(String, u32)> = Vec::new();

    for (i, output) in outputs.iter().enumerate() {
        let slot = i as u32;
        let mut matched = false;

        for &site in uses {
            if graph.entry_at(site)? == *output {
                graph.set_entry(site, NodeEntry::new(fused, slot))?;
                matched = true;
            }
        }

        if matched {
            recorded.push((graph.name_of(output.node)?.to_string(), slot));
        } else {
            trace!(slot, "fused output has no remaining consumer");
        }
    }

    let state = fused_state_mut(graph, fused)?;
    for (producer, slot) in recorded {
        if let Some(previous) = state.params.record_output(&producer, slot) {
            if previous != slot {
                warn!(
                    producer = %producer,
                    previous,
                    slot,
                    "producer exports several outputs; only the last slot is kept"
                );
            }
        }
    }

    Ok(())
}

/// Make `inputs` the fused node's input list and record `inputs_to_idx`
pub fn connect_inputs(graph: &mut Graph, fused: NodeId, inputs: &[NodeEntry]) -> DelegateResult<()> {
    let names: Vec<String> = {
        let node = graph.node(fused)?;
        let state = node
            .fused()
            .ok_or_else(|| DelegateError::NotFused(node.name.clone()))?;
        state
            .subgraph
            .input_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    };

    if names.len() != inputs.len() {
        return Err(DelegateError::Invariant(format!(
            "fused node has {} cut inputs but {} input entries were given",
            names.len(),
            inputs.len()
        )));
    }

    graph.set_inputs(fused, inputs.to_vec())?;

    let state = fused_state_mut(graph, fused)?;
    for (i, name) in names.iter().enumerate() {
        state.params.record_input(name, i as u32);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::partition::extract_clusters;
    use crate::property::TensorrtProperty;

    #[test]
    fn test_rewrite_chain() {
        let mut b = GraphBuilder::new();
        let data = b.variable("Data").unwrap();
        let w = b.variable("W").unwrap();
        let conv = b.op("Convolution", "conv", &[data, w]).unwrap();
        let relu = b.op("relu", "relu", &[conv]).unwrap();
        let soft = b.op("softmax", "soft", &[relu]).unwrap();
        let mut graph = b.build(&[soft]).unwrap();

        let property = TensorrtProperty::new();
        let clusters = extract_clusters(&graph, &property).unwrap();
        let summary = rewrite_cluster(
            &mut graph,
            &clusters[0],
            &property,
            "TensorRT0".to_string(),
            OutputDedup::All,
        )
        .unwrap();

        assert_eq!(summary.operators, 2);
        assert_eq!(summary.absorbed_variables, 1);
        assert_eq!(summary.inputs, 1);
        assert_eq!(summary.outputs, 1);

        // Data -> TensorRT0 -> soft
        let fused = graph.node(summary.id).unwrap();
        assert_eq!(fused.inputs, vec![data]);
        assert_eq!(graph.node(soft.node).unwrap().inputs, vec![NodeEntry::first(summary.id)]);
        assert!(graph.find("conv").is_none());
        assert!(graph.find("W").is_none());

        let params = &fused.fused().unwrap().params;
        assert_eq!(params.input_slot("Data"), Some(0));
        assert_eq!(params.output_slot("relu"), Some(0));
    }

    #[test]
    fn test_consecutive_dedup_leaves_unbound_slot() {
        // relu_a is consumed by s0, then relu_b by s1, then relu_a again by s2
        let mut b = GraphBuilder::new();
        let x = b.variable("x").unwrap();
        let ra = b.op("relu", "relu_a", &[x]).unwrap();
        let rb = b.op("relu", "relu_b", &[ra]).unwrap();
        let s0 = b.op("softmax", "s0", &[ra]).unwrap();
        let s1 = b.op("softmax", "s1", &[rb]).unwrap();
        let s2 = b.op("softmax", "s2", &[ra]).unwrap();
        let graph = b.build(&[s0, s1, s2]).unwrap();

        let property = TensorrtProperty::new();
        let clusters = extract_clusters(&graph, &property).unwrap();

        let mut all = graph.clone();
        let summary = rewrite_cluster(&mut all, &clusters[0], &property, "T".into(), OutputDedup::All)
            .unwrap();
        assert_eq!(summary.outputs, 2);
        assert_eq!(all.node(s2.node).unwrap().inputs[0], NodeEntry::new(summary.id, 0));

        let mut consecutive = graph.clone();
        let summary = rewrite_cluster(
            &mut consecutive,
            &clusters[0],
            &property,
            "T".into(),
            OutputDedup::Consecutive,
        )
        .unwrap();
        // Third slot repeats relu_a; every edge was already taken by slot 0
        assert_eq!(summary.outputs, 3);
        assert_eq!(
            consecutive.node(s2.node).unwrap().inputs[0],
            NodeEntry::new(summary.id, 0)
        );
        let params = &consecutive.node(summary.id).unwrap().fused().unwrap().params;
        assert_eq!(params.output_slot("relu_a"), Some(0));
        assert_eq!(params.output_slot("relu_b"), Some(1));
        assert_eq!(params.outputs_to_idx.len(), 2);
    }

    #[test]
    fn test_connect_inputs_requires_fused_node() {
        let mut b = GraphBuilder::new();
        let x = b.variable("x").unwrap();
        let r = b.op("relu", "r", &[x]).unwrap();
        let mut graph = b.build(&[r]).unwrap();

        let err = connect_inputs(&mut graph, r.node, &[x]).unwrap_err();
        assert!(matches!(err, DelegateError::NotFused(_)));
    }
}
