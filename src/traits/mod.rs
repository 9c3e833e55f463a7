//! Core traits for subgraph-delegate
//!
//! Defines the seams a delegation target plugs into: the compatibility
//! policy, the traversal selector built on it, and the property that ties
//! selection and rewriting together.

use crate::error::DelegateResult;
use crate::graph::{EdgeSite, Graph, Node, NodeEntry, NodeId, NodeRef, OpRegistry};
use crate::partition::{rewrite, SubgraphDef};

/// Capability predicates of one target engine
///
/// # Example
///
/// ```ignore
/// struct ReluOnly;
///
/// impl CompatibilityPolicy for ReluOnly {
///     fn is_compatible(&self, node: &Node) -> DelegateResult<bool> {
///         Ok(node.op_name() == Some("relu"))
///     }
///
///     fn is_weight_bearing(&self, _node: &Node) -> bool {
///         false
///     }
/// }
/// ```
pub trait CompatibilityPolicy {
    /// Whether the engine can execute this operator node
    ///
    /// Attribute-conditioned predicates fail with
    /// [`DelegateError::MissingAttribute`](crate::error::DelegateError::MissingAttribute)
    /// when the attribute they inspect is absent.
    fn is_compatible(&self, node: &Node) -> DelegateResult<bool>;

    /// Whether variables feeding the node's secondary inputs may be embedded
    fn is_weight_bearing(&self, node: &Node) -> bool;
}

/// Stateful traversal rules used while growing one cluster
///
/// A fresh selector is created for every seed node.
pub trait SubgraphSelector {
    /// Whether `node` may seed or belong to a cluster
    fn select(&mut self, node: NodeRef<'_>) -> DelegateResult<bool>;

    /// Whether the producer `candidate` may join through an input edge of `current`
    fn select_input(&mut self, current: NodeRef<'_>, candidate: NodeRef<'_>)
        -> DelegateResult<bool>;

    /// Whether the consumer `candidate` may join through an output edge of `current`
    fn select_output(
        &mut self,
        current: NodeRef<'_>,
        candidate: NodeRef<'_>,
    ) -> DelegateResult<bool>;

    /// Accept a fully grown cluster unchanged, or discard it by returning an empty set
    fn filter(&mut self, _graph: &Graph, candidates: Vec<NodeId>) -> Vec<NodeId> {
        candidates
    }
}

/// A pluggable delegation target
///
/// The default connect methods implement the standard rewiring and fill the
/// fused node's [`ParamTable`](crate::partition::ParamTable); targets
/// normally only provide selection and node creation.
pub trait SubgraphProperty {
    /// Target name (e.g. `TensorRT`)
    fn name(&self) -> &'static str;

    /// Operator kind of the fused nodes this target creates
    fn fused_op(&self) -> &'static str;

    /// Prefix of fused node names; the subgraph id is appended
    fn node_name_prefix(&self) -> &'static str {
        self.name()
    }

    /// Create the selector used to grow one cluster
    fn create_selector(&self) -> Box<dyn SubgraphSelector>;

    /// Build the fused node for an extracted subgraph
    ///
    /// The node's attribute parser must have run exactly once when this returns.
    fn create_subgraph_node(
        &self,
        registry: &OpRegistry,
        subgraph: SubgraphDef,
        name: String,
    ) -> DelegateResult<Node>;

    /// Redirect external consumers of the cluster outputs to the fused node
    ///
    /// `outputs[i]` is the host entry that becomes slot `i`; `uses` are the
    /// external edge sites that referenced cluster members.
    fn connect_subgraph_outputs(
        &self,
        graph: &mut Graph,
        fused: NodeId,
        outputs: &[NodeEntry],
        uses: &[EdgeSite],
    ) -> DelegateResult<()> {
        rewrite::connect_outputs(graph, fused, outputs, uses)
    }

    /// Give the fused node the cluster's external input entries
    fn connect_subgraph_inputs(
        &self,
        graph: &mut Graph,
        fused: NodeId,
        inputs: &[NodeEntry],
    ) -> DelegateResult<()> {
        rewrite::connect_inputs(graph, fused, inputs)
    }
}
