//! Subgraph definitions and slot tables
//!
//! A [`SubgraphDef`] is the self-contained graph a fused node embeds. Every
//! external input entry of the cluster is cut and replaced by a fresh
//! variable inside it; absorbed weights stay the variables they were.

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;

use crate::error::{DelegateError, DelegateResult};
use crate::graph::{EdgeSite, Graph, Node, NodeEntry, NodeId};

use super::extract::Cluster;

/// How duplicate output entries are merged when a fused node is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputDedup {
    /// Every `(producer, slot)` pair gets exactly one fused output
    #[default]
    All,
    /// Only adjacent repeats are merged; a pair consumed again after another
    /// pair keeps an extra (unbound) slot
    Consecutive,
}

/// Name → slot tables of a fused node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamTable {
    /// Cut-input variable name → fused input slot
    ///
    /// A cut input is named after its producer, or `{producer}_output{slot}`
    /// for a slot other than 0. When that name already belongs to another
    /// node, `_{n}` is appended with the smallest free `n` from 1.
    pub inputs_to_idx: IndexMap<String, u32>,
    /// Producer name → fused output slot
    ///
    /// Keyed by producer name only: a producer whose several outputs leave
    /// the cluster keeps a single entry.
    pub outputs_to_idx: IndexMap<String, u32>,
}

impl ParamTable {
    /// Empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Input slot bound to `name`
    pub fn input_slot(&self, name: &str) -> Option<u32> {
        self.inputs_to_idx.get(name).copied()
    }

    /// Output slot bound to `name`
    pub fn output_slot(&self, name: &str) -> Option<u32> {
        self.outputs_to_idx.get(name).copied()
    }

    /// Record an input slot, returning the slot it replaced
    pub fn record_input(&mut self, name: &str, slot: u32) -> Option<u32> {
        self.inputs_to_idx.insert(name.to_string(), slot)
    }

    /// Record an output slot, returning the slot it replaced
    pub fn record_output(&mut self, name: &str, slot: u32) -> Option<u32> {
        self.outputs_to_idx.insert(name.to_string(), slot)
    }
}

/// Graph embedded in a fused node
#[derive(Debug, Clone)]
pub struct SubgraphDef {
    graph: Graph,
    inputs: Vec<NodeId>,
}

impl SubgraphDef {
    /// Copy a cluster out of `host` into a standalone graph
    ///
    /// `inputs[i]` becomes the inner variable bound to fused input `i`;
    /// `outputs[i]` becomes inner output `i`.
    pub fn extract(
        host: &Graph,
        cluster: &Cluster,
        inputs: &[NodeEntry],
        outputs: &[NodeEntry],
    ) -> DelegateResult<Self> {
        let mut graph = Graph::new(host.registry().clone());
        let mut cut: FxHashMap<NodeEntry, NodeId> = FxHashMap::default();
        let mut moved: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        let mut input_ids = Vec::with_capacity(inputs.len());

        for entry in inputs {
            let producer = host.node(entry.node)?;
            let name = unique_cut_name(host, &graph, *entry, &producer.name);
            let var = graph.push_node(Node::variable(name))?;
            cut.insert(*entry, var);
            input_ids.push(var);
        }

        for &member in &cluster.members {
            let mut node = host.node(member)?.clone();
            for entry in &mut node.inputs {
                let original = *entry;
                *entry = match moved.get(&original.node) {
                    Some(inner) => NodeEntry::new(*inner, original.index),
                    None => cut
                        .get(&original)
                        .map(|var| NodeEntry::first(*var))
                        .ok_or_else(|| DelegateError::InvalidEdge {
                            node: node.name.clone(),
                            reason: format!(
                                "input {} is neither a member nor a cut input",
                                original.node
                            ),
                        })?,
                };
            }
            moved.insert(member, graph.push_node(node)?);
        }

        for entry in outputs {
            let inner = moved
                .get(&entry.node)
                .ok_or(DelegateError::InvalidNode(entry.node))?;
            graph.add_output(NodeEntry::new(*inner, entry.index))?;
        }

        Ok(Self {
            graph,
            inputs: input_ids,
        })
    }

    /// The embedded graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Inner variables bound to the fused node's inputs, in slot order
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Names of the cut-input variables, in slot order
    pub fn input_names(&self) -> Vec<&str> {
        self.inputs
            .iter()
            .filter_map(|id| self.graph.get(*id))
            .map(|n| n.name.as_str())
            .collect()
    }

    /// Inner output entries, in slot order
    pub fn outputs(&self) -> &[NodeEntry] {
        self.graph.outputs()
    }

    /// Number of fused output slots
    pub fn num_outputs(&self) -> usize {
        self.graph.outputs().len()
    }

    /// Every variable visible inside the subgraph: cut inputs and absorbed weights
    pub fn list_input_names(&self) -> Vec<&str> {
        self.graph.list_input_names()
    }

    /// Number of operator nodes
    pub fn operator_count(&self) -> usize {
        self.graph.iter().filter(|(_, n)| !n.is_variable()).count()
    }

    /// Number of absorbed (non cut-input) variables
    pub fn absorbed_count(&self) -> usize {
        self.graph
            .iter()
            .filter(|(id, n)| n.is_variable() && !self.inputs.contains(id))
            .count()
    }
}

/// State held by a fused node
#[derive(Debug, Clone)]
pub struct FusedOp {
    /// Embedded subgraph
    pub subgraph: SubgraphDef,
    /// Slot tables, filled while the node is connected
    pub params: ParamTable,
    /// Parameter names parsed from `subgraph_params_names`
    pub param_names: Vec<String>,
}

impl FusedOp {
    /// Fresh state with empty tables
    pub fn new(subgraph: SubgraphDef) -> Self {
        Self {
            subgraph,
            params: ParamTable::new(),
            param_names: Vec::new(),
        }
    }
}

/// Name of the inner variable that replaces an external input entry
pub fn cut_input_name(producer: &str, slot: u32) -> String {
    if slot == 0 {
        producer.to_string()
    } else {
        format!("{}_output{}", producer, slot)
    }
}

/// [`cut_input_name`], suffixed with `_{n}` while the name is already taken
///
/// A name is taken when the inner graph already has it, or when a host node
/// other than the producer carries it.
fn unique_cut_name(host: &Graph, inner: &Graph, entry: NodeEntry, producer: &str) -> String {
    let base = cut_input_name(producer, entry.index);
    let taken = |name: &str| {
        inner.has_name(name) || host.find(name).is_some_and(|id| id != entry.node)
    };

    if !taken(&base) {
        return base;
    }
    (1u32..)
        .map(|n| format!("{}_{}", base, n))
        .find(|name| !taken(name))
        .unwrap_or(base)
}

/// External input entries of a cluster
///
/// Members are scanned in topological order and inputs in input order; each
/// `(producer, slot)` pair is kept once, at its first occurrence.
pub fn find_input_entries(graph: &Graph, cluster: &Cluster) -> DelegateResult<Vec<NodeEntry>> {
    let mut entries: IndexSet<NodeEntry> = IndexSet::new();
    for &member in &cluster.members {
        for entry in &graph.node(member)?.inputs {
            if !cluster.contains(entry.node) {
                entries.insert(*entry);
            }
        }
    }
    Ok(entries.into_iter().collect())
}

/// External uses of cluster outputs
///
/// Non-member nodes are scanned in `order`, then the graph outputs. One raw
/// entry is returned per edge, together with the site of that edge.
pub fn find_output_uses(
    graph: &Graph,
    cluster: &Cluster,
    order: &[NodeId],
) -> DelegateResult<(Vec<NodeEntry>, Vec<EdgeSite>)> {
    let mut entries = Vec::new();
    let mut sites = Vec::new();

    for &id in order {
        if cluster.contains(id) {
            continue;
        }
        for (position, entry) in graph.node(id)?.inputs.iter().enumerate() {
            if cluster.contains(entry.node) {
                entries.push(*entry);
                sites.push(EdgeSite::Input {
                    consumer: id,
                    position,
                });
            }
        }
    }

    for (position, entry) in graph.outputs().iter().enumerate() {
        if cluster.contains(entry.node) {
            entries.push(*entry);
            sites.push(EdgeSite::GraphOutput(position));
        }
    }

    Ok((entries, sites))
}

/// Merge duplicate output entries
pub fn dedup_outputs(raw: &[NodeEntry], mode: OutputDedup) -> Vec<NodeEntry> {
    match mode {
        OutputDedup::All => raw.iter().copied().collect::<IndexSet<_>>().into_iter().collect(),
        OutputDedup::Consecutive => {
            let mut out = raw.to_vec();
            out.dedup();
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn e(id: usize, slot: u32) -> NodeEntry {
        NodeEntry::new(NodeId(id), slot)
    }

    #[test]
    fn test_dedup_all() {
        let raw = [e(1, 0), e(1, 0), e(2, 0), e(1, 0)];
        assert_eq!(dedup_outputs(&raw, OutputDedup::All), vec![e(1, 0), e(2, 0)]);
    }

    #[test]
    fn test_dedup_consecutive_keeps_non_adjacent_repeats() {
        let raw = [e(1, 0), e(1, 0), e(2, 0), e(1, 0)];
        assert_eq!(
            dedup_outputs(&raw, OutputDedup::Consecutive),
            vec![e(1, 0), e(2, 0), e(1, 0)]
        );
    }

    #[test]
    fn test_dedup_distinguishes_slots() {
        let raw = [e(1, 0), e(1, 1)];
        assert_eq!(dedup_outputs(&raw, OutputDedup::All).len(), 2);
        assert_eq!(dedup_outputs(&raw, OutputDedup::Consecutive).len(), 2);
    }

    #[test]
    fn test_cut_input_name() {
        assert_eq!(cut_input_name("data", 0), "data");
        assert_eq!(cut_input_name("split", 2), "split_output2");
    }

    #[test]
    fn test_cut_input_name_avoids_host_names() {
        let mut b = GraphBuilder::new();
        let data = b.variable("data").unwrap();
        let split = b
            .op_with("SliceChannel", "split", &[data], &[("num_outputs", "2")])
            .unwrap();
        let taken = b.variable("split_output1").unwrap();
        let second = NodeEntry::new(split.node, 1);
        let add = b.op("elemwise_add", "add", &[second, taken]).unwrap();
        let relu = b.op("relu", "r", &[add]).unwrap();
        let graph = b.build(&[relu]).unwrap();

        let cluster = Cluster {
            seed: add.node,
            members: vec![add.node, relu.node],
            accepted: vec![(add.node, relu.node)],
        };
        let inputs = find_input_entries(&graph, &cluster).unwrap();
        assert_eq!(inputs, vec![second, taken]);

        let def = SubgraphDef::extract(&graph, &cluster, &inputs, &[relu]).unwrap();
        assert_eq!(def.input_names(), vec!["split_output1_1", "split_output1"]);
        assert!(def.graph().check_consistency().is_ok());
    }

    #[test]
    fn test_param_table_records() {
        let mut table = ParamTable::new();
        assert_eq!(table.record_output("relu", 0), None);
        assert_eq!(table.record_output("relu", 1), Some(0));
        assert_eq!(table.output_slot("relu"), Some(1));
        assert_eq!(table.input_slot("data"), None);
    }

    #[test]
    fn test_extract_subgraph() {
        let mut b = GraphBuilder::new();
        let data = b.variable("data").unwrap();
        let w = b.variable("w").unwrap();
        let conv = b.op("Convolution", "conv", &[data, w]).unwrap();
        let relu = b.op("relu", "relu", &[conv]).unwrap();
        let graph = b.build(&[relu]).unwrap();

        let cluster = Cluster {
            seed: conv.node,
            members: vec![w.node, conv.node, relu.node],
            accepted: vec![(conv.node, w.node), (conv.node, relu.node)],
        };

        let inputs = find_input_entries(&graph, &cluster).unwrap();
        assert_eq!(inputs, vec![data]);

        let order = graph.topological_order().unwrap();
        let (raw, sites) = find_output_uses(&graph, &cluster, &order).unwrap();
        assert_eq!(raw, vec![relu]);
        assert_eq!(sites, vec![EdgeSite::GraphOutput(0)]);

        let def = SubgraphDef::extract(&graph, &cluster, &inputs, &raw).unwrap();
        assert_eq!(def.input_names(), vec!["data"]);
        assert_eq!(def.list_input_names(), vec!["data", "w"]);
        assert_eq!(def.operator_count(), 2);
        assert_eq!(def.absorbed_count(), 1);
        assert_eq!(def.num_outputs(), 1);
        assert!(def.graph().check_consistency().is_ok());
    }
}
