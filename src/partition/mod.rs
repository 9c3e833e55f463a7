//! Graph partitioning pass
//!
//! The pass runs in two phases:
//!
//! | Phase | Borrow | Entry point |
//! |-------|--------|-------------|
//! | plan: extract node-disjoint clusters | `&Graph` | [`PartitionPlan::build`] |
//! | apply: rewrite each cluster into a fused node | `&mut Graph` | [`PartitionPlan::apply`] |
//!
//! [`partition_graph`] runs both for a [`DelegationTarget`].
//!
//! # Example
//!
//! ```ignore
//! use subgraph_delegate::prelude::*;
//!
//! let report = partition_graph(&mut graph, &DelegationTarget::TensorRt, &PartitionConfig::default())?;
//! for fused in &report.fused {
//!     println!("{}: {} ops, {} inputs", fused.name, fused.operators, fused.inputs);
//! }
//! ```

pub mod extract;
pub mod inline;
pub mod rewrite;
pub mod selector;
pub mod subgraph;
pub mod verify;

pub use extract::{extract_clusters, Cluster};
pub use inline::inline_fused_node;
pub use rewrite::{connect_inputs, connect_outputs, rewrite_cluster, FusedSummary};
pub use selector::{PolicySelector, DEFAULT_MIN_OPS};
pub use subgraph::{cut_input_name, FusedOp, OutputDedup, ParamTable, SubgraphDef};
pub use verify::{verify_graph, VerifyReport};

use tracing::{debug, info, warn};

use crate::error::DelegateResult;
use crate::graph::Graph;
use crate::property::DelegationTarget;
use crate::traits::SubgraphProperty;

/// Partitioning configuration
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// How duplicate cluster outputs are merged
    pub output_dedup: OutputDedup,
    /// Fused node name prefix; the property's prefix when unset
    pub fused_name_prefix: Option<String>,
    /// Id of the first fused node
    pub first_subgraph_id: usize,
    /// Verify the rewritten graph
    pub verify: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            output_dedup: OutputDedup::All,
            fused_name_prefix: None,
            first_subgraph_id: 0,
            verify: true,
        }
    }
}

impl PartitionConfig {
    /// Set the output dedup mode
    pub fn with_output_dedup(mut self, mode: OutputDedup) -> Self {
        self.output_dedup = mode;
        self
    }

    /// Set the fused node name prefix
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.fused_name_prefix = Some(prefix.into());
        self
    }

    /// Set the first subgraph id
    pub fn with_first_id(mut self, id: usize) -> Self {
        self.first_subgraph_id = id;
        self
    }

    /// Enable or disable verification
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

/// Statistics from a partitioning pass
#[derive(Debug, Clone, Default)]
pub struct PartitionReport {
    /// One entry per fused node, in creation order
    pub fused: Vec<FusedSummary>,
    /// Operator nodes absorbed in total
    pub operators_absorbed: usize,
    /// Variables absorbed in total
    pub variables_absorbed: usize,
    /// Live nodes before the pass
    pub nodes_before: usize,
    /// Live nodes after the pass
    pub nodes_after: usize,
    /// Verification warnings
    pub warnings: Vec<String>,
}

impl PartitionReport {
    /// Number of fused nodes created
    pub fn len(&self) -> usize {
        self.fused.len()
    }

    /// Check if nothing was delegated
    pub fn is_empty(&self) -> bool {
        self.fused.is_empty()
    }

    /// Record one rewrite
    pub fn record(&mut self, summary: FusedSummary) {
        self.operators_absorbed += summary.operators;
        self.variables_absorbed += summary.absorbed_variables;
        self.fused.push(summary);
    }

    /// Summary of the fused node with the given name
    pub fn get(&self, name: &str) -> Option<&FusedSummary> {
        self.fused.iter().find(|f| f.name == name)
    }
}

/// Clusters extracted from a graph, ready to be rewritten
#[derive(Debug, Clone, Default)]
pub struct PartitionPlan {
    /// Accepted clusters in extraction order
    pub clusters: Vec<Cluster>,
}

impl PartitionPlan {
    /// Extract the clusters `property` would delegate
    pub fn build(graph: &Graph, property: &dyn SubgraphProperty) -> DelegateResult<Self> {
        let clusters = extract_clusters(graph, property)?;
        debug!(
            target_name = property.name(),
            clusters = clusters.len(),
            "partition plan built"
        );
        Ok(Self { clusters })
    }

    /// Number of clusters
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Check if nothing will be delegated
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Rewrite every cluster into a fused node
    ///
    /// Fused nodes are named `{prefix}{id}` with ids counting up from
    /// `first_subgraph_id`; an id whose name is already taken is skipped.
    pub fn apply(
        self,
        graph: &mut Graph,
        property: &dyn SubgraphProperty,
        config: &PartitionConfig,
    ) -> DelegateResult<PartitionReport> {
        let prefix = config
            .fused_name_prefix
            .clone()
            .unwrap_or_else(|| property.node_name_prefix().to_string());

        let mut report = PartitionReport {
            nodes_before: graph.len(),
            ..PartitionReport::default()
        };
        let mut next_id = config.first_subgraph_id;

        for cluster in &self.clusters {
            let mut name = format!("{}{}", prefix, next_id);
            while graph.has_name(&name) {
                next_id += 1;
                name = format!("{}{}", prefix, next_id);
            }
            next_id += 1;

            let summary = rewrite_cluster(graph, cluster, property, name, config.output_dedup)?;
            debug!(
                fused = %summary.name,
                operators = summary.operators,
                inputs = summary.inputs,
                outputs = summary.outputs,
                "cluster rewritten"
            );
            report.record(summary);
        }

        if config.verify {
            let result = verify_graph(graph);
            for warning in &result.warnings {
                warn!(%warning, "partition verification");
            }
            report.warnings = result.warnings.clone();
            result.into_result()?;
        }

        report.nodes_after = graph.len();
        info!(
            target_name = property.name(),
            fused = report.len(),
            operators = report.operators_absorbed,
            variables = report.variables_absorbed,
            nodes_before = report.nodes_before,
            nodes_after = report.nodes_after,
            "partition complete"
        );

        Ok(report)
    }
}

/// Partition a graph for a delegation target
pub fn partition_graph(
    graph: &mut Graph,
    target: &DelegationTarget,
    config: &PartitionConfig,
) -> DelegateResult<PartitionReport> {
    let property = target.property();
    let plan = PartitionPlan::build(graph, property.as_ref())?;
    plan.apply(graph, property.as_ref(), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, NodeEntry};
    use crate::property::TensorrtProperty;

    fn make_test_graph() -> Graph {
        // data -> conv -> relu -> softmax -> fc -> relu2
        let mut b = GraphBuilder::new();
        let data = b.variable("data").unwrap();
        let w0 = b.variable("w0").unwrap();
        let w1 = b.variable("w1").unwrap();
        let conv = b.op("Convolution", "conv", &[data, w0]).unwrap();
        let relu = b.op("relu", "relu", &[conv]).unwrap();
        let soft = b.op("softmax", "soft", &[relu]).unwrap();
        let fc = b.op("FullyConnected", "fc", &[soft, w1]).unwrap();
        let relu2 = b.op("relu", "relu2", &[fc]).unwrap();
        b.build(&[relu2]).unwrap()
    }

    #[test]
    fn test_config_builders() {
        let config = PartitionConfig::default()
            .with_output_dedup(OutputDedup::Consecutive)
            .with_name_prefix("trt_")
            .with_first_id(5)
            .with_verify(false);

        assert_eq!(config.output_dedup, OutputDedup::Consecutive);
        assert_eq!(config.fused_name_prefix.as_deref(), Some("trt_"));
        assert_eq!(config.first_subgraph_id, 5);
        assert!(!config.verify);
    }

    #[test]
    fn test_two_fused_nodes() {
        let mut graph = make_test_graph();
        let report =
            partition_graph(&mut graph, &DelegationTarget::TensorRt, &PartitionConfig::default())
                .unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(report.fused[0].name, "TensorRT0");
        assert_eq!(report.fused[1].name, "TensorRT1");
        assert_eq!(report.operators_absorbed, 4);
        assert_eq!(report.variables_absorbed, 2);
        // data, soft and two fused nodes
        assert_eq!(report.nodes_after, 4);

        let t0 = report.fused[0].id;
        let t1 = report.fused[1].id;
        let soft = graph.find("soft").unwrap();
        assert_eq!(graph.node(soft).unwrap().inputs, vec![NodeEntry::first(t0)]);
        assert_eq!(graph.node(t1).unwrap().inputs, vec![NodeEntry::first(soft)]);
        assert_eq!(graph.outputs(), &[NodeEntry::first(t1)]);
    }

    #[test]
    fn test_plan_then_apply() {
        let mut graph = make_test_graph();
        let property = TensorrtProperty::new();

        let plan = PartitionPlan::build(&graph, &property).unwrap();
        assert_eq!(plan.len(), 2);

        let config = PartitionConfig::default().with_name_prefix("trt_").with_first_id(3);
        let report = plan.apply(&mut graph, &property, &config).unwrap();
        assert!(report.get("trt_3").is_some());
        assert!(report.get("trt_4").is_some());
    }

    #[test]
    fn test_taken_name_is_skipped() {
        let mut b = GraphBuilder::new();
        let x = b.variable("TensorRT0").unwrap();
        let r0 = b.op("relu", "r0", &[x]).unwrap();
        let r1 = b.op("relu", "r1", &[r0]).unwrap();
        let mut graph = b.build(&[r1]).unwrap();

        let report =
            partition_graph(&mut graph, &DelegationTarget::TensorRt, &PartitionConfig::default())
                .unwrap();
        assert_eq!(report.fused[0].name, "TensorRT1");
    }

    #[test]
    fn test_nothing_to_delegate() {
        let mut b = GraphBuilder::new();
        let x = b.variable("x").unwrap();
        let s = b.op("softmax", "s", &[x]).unwrap();
        let mut graph = b.build(&[s]).unwrap();

        let report =
            partition_graph(&mut graph, &DelegationTarget::TensorRt, &PartitionConfig::default())
                .unwrap();
        assert!(report.is_empty());
        assert_eq!(report.nodes_before, report.nodes_after);
    }
}
