//! Policy-driven selector
//!
//! [`PolicySelector`] turns a [`CompatibilityPolicy`] into the traversal rules
//! the cluster extractor asks for:
//!
//! | Question | Answer |
//! |----------|--------|
//! | `select(n)` | `n` is an operator and the policy accepts it |
//! | `select_input(cur, op)` | the policy accepts `op` |
//! | `select_input(cur, var)` | `cur` is weight-bearing and `var` is not its first input |
//! | `select_output(cur, n)` | `select(n)` |
//! | `filter(c)` | `c` unless it has fewer than `min_ops` operator nodes |

use tracing::trace;

use crate::error::DelegateResult;
use crate::graph::{Graph, NodeId, NodeRef};
use crate::traits::{CompatibilityPolicy, SubgraphSelector};

/// Default minimum number of operator nodes worth delegating
pub const DEFAULT_MIN_OPS: usize = 2;

/// Selector over any compatibility policy
#[derive(Debug, Clone)]
pub struct PolicySelector<P> {
    policy: P,
    min_ops: usize,
}

impl<P: CompatibilityPolicy> PolicySelector<P> {
    /// Selector with the default cluster size threshold
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            min_ops: DEFAULT_MIN_OPS,
        }
    }

    /// Change the minimum number of operator nodes a cluster needs
    pub fn with_min_ops(mut self, min_ops: usize) -> Self {
        self.min_ops = min_ops;
        self
    }

    /// Fused nodes are never re-delegated
    fn accepts(&self, node: NodeRef<'_>) -> DelegateResult<bool> {
        if node.is_variable() || node.is_fused() {
            return Ok(false);
        }
        self.policy.is_compatible(node.node)
    }
}

impl<P: CompatibilityPolicy> SubgraphSelector for PolicySelector<P> {
    fn select(&mut self, node: NodeRef<'_>) -> DelegateResult<bool> {
        self.accepts(node)
    }

    fn select_input(
        &mut self,
        current: NodeRef<'_>,
        candidate: NodeRef<'_>,
    ) -> DelegateResult<bool> {
        if candidate.is_variable() {
            // Weights ride along; the data input stays outside
            let absorb = self.policy.is_weight_bearing(current.node)
                && current.inputs.first().map(|e| e.node) != Some(candidate.id);
            trace!(
                current = %current.name,
                variable = %candidate.name,
                absorb,
                "variable input"
            );
            return Ok(absorb);
        }
        self.accepts(candidate)
    }

    fn select_output(
        &mut self,
        _current: NodeRef<'_>,
        candidate: NodeRef<'_>,
    ) -> DelegateResult<bool> {
        self.accepts(candidate)
    }

    fn filter(&mut self, graph: &Graph, candidates: Vec<NodeId>) -> Vec<NodeId> {
        let ops = candidates
            .iter()
            .filter(|id| graph.get(**id).is_some_and(|n| !n.is_variable()))
            .count();

        if ops >= self.min_ops {
            candidates
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, Node};

    struct ConvReluPolicy;

    impl CompatibilityPolicy for ConvReluPolicy {
        fn is_compatible(&self, node: &Node) -> DelegateResult<bool> {
            Ok(matches!(node.op_name(), Some("Convolution") | Some("relu")))
        }

        fn is_weight_bearing(&self, node: &Node) -> bool {
            node.op_name() == Some("Convolution")
        }
    }

    fn make_graph() -> Graph {
        let mut b = GraphBuilder::new();
        let data = b.variable("data").unwrap();
        let w = b.variable("w").unwrap();
        let conv = b.op("Convolution", "conv", &[data, w]).unwrap();
        let relu = b.op("relu", "relu", &[conv]).unwrap();
        let soft = b.op("softmax", "soft", &[relu, w]).unwrap();
        b.build(&[soft]).unwrap()
    }

    fn r<'a>(g: &'a Graph, name: &str) -> NodeRef<'a> {
        g.node_ref(g.find(name).unwrap()).unwrap()
    }

    #[test]
    fn test_select() {
        let g = make_graph();
        let mut s = PolicySelector::new(ConvReluPolicy);

        assert!(s.select(r(&g, "conv")).unwrap());
        assert!(!s.select(r(&g, "soft")).unwrap());
        assert!(!s.select(r(&g, "data")).unwrap());
    }

    #[test]
    fn test_weight_absorption() {
        let g = make_graph();
        let mut s = PolicySelector::new(ConvReluPolicy);

        // Secondary input of a weight-bearing op
        assert!(s.select_input(r(&g, "conv"), r(&g, "w")).unwrap());
        // Primary data input stays external
        assert!(!s.select_input(r(&g, "conv"), r(&g, "data")).unwrap());
        // Not weight-bearing
        assert!(!s.select_input(r(&g, "soft"), r(&g, "w")).unwrap());
    }

    #[test]
    fn test_select_output() {
        let g = make_graph();
        let mut s = PolicySelector::new(ConvReluPolicy);

        assert!(s.select_output(r(&g, "conv"), r(&g, "relu")).unwrap());
        assert!(!s.select_output(r(&g, "relu"), r(&g, "soft")).unwrap());
    }

    #[test]
    fn test_filter_threshold() {
        let g = make_graph();
        let conv = g.find("conv").unwrap();
        let relu = g.find("relu").unwrap();
        let w = g.find("w").unwrap();

        let mut s = PolicySelector::new(ConvReluPolicy);
        // Variables do not count towards the threshold
        assert!(s.filter(&g, vec![w, conv]).is_empty());
        assert_eq!(s.filter(&g, vec![w, conv, relu]), vec![w, conv, relu]);

        let mut single = PolicySelector::new(ConvReluPolicy).with_min_ops(1);
        assert_eq!(single.filter(&g, vec![conv]), vec![conv]);
    }

    #[test]
    fn test_filter_idempotent() {
        let g = make_graph();
        let conv = g.find("conv").unwrap();
        let relu = g.find("relu").unwrap();
        let mut s = PolicySelector::new(ConvReluPolicy);

        let once = s.filter(&g, vec![conv, relu]);
        let twice = s.filter(&g, once.clone());
        assert_eq!(once, twice);

        let dropped = s.filter(&g, vec![conv]);
        assert_eq!(s.filter(&g, dropped.clone()), dropped);
    }
}
