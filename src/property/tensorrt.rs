//! TensorRT delegation target
//!
//! Operators TensorRT can run:
//!
//! | Operator | Condition |
//! |----------|-----------|
//! | BatchNorm, clip, Concat, Convolution, Deconvolution, Dropout, elemwise_add/sub/mul, Flatten, FullyConnected, mean, Pad, relu, rsqrt, SoftmaxOutput | always |
//! | Pooling | `pool_type` is `avg` or `max` |
//! | Activation | `act_type` is `relu`, `tanh` or `sigmoid` |
//!
//! BatchNorm, Convolution, Deconvolution and FullyConnected carry weights:
//! variables on their secondary inputs are embedded in the fused node.

use crate::error::{DelegateError, DelegateResult};
use crate::graph::{Attrs, Node, NodeKind, OpRegistry, OpSchema};
use crate::partition::{FusedOp, PolicySelector, SubgraphDef, DEFAULT_MIN_OPS};
use crate::traits::{CompatibilityPolicy, SubgraphProperty, SubgraphSelector};

/// Operator kind of TensorRT fused nodes
pub const TENSORRT_OP: &str = "_TensorRT";

/// Attribute listing the variables visible inside the fused subgraph
pub const PARAMS_NAMES_ATTR: &str = "subgraph_params_names";

const UNCONDITIONAL_OPS: &[&str] = &[
    "BatchNorm",
    "clip",
    "Concat",
    "Convolution",
    "Deconvolution",
    "Dropout",
    "elemwise_add",
    "elemwise_sub",
    "elemwise_mul",
    "Flatten",
    "FullyConnected",
    "mean",
    "Pad",
    "relu",
    "rsqrt",
    "SoftmaxOutput",
];

const WEIGHT_OPS: &[&str] = &["BatchNorm", "Convolution", "Deconvolution", "FullyConnected"];

const POOL_TYPES: &[&str] = &["avg", "max"];

const ACT_TYPES: &[&str] = &["relu", "tanh", "sigmoid"];

/// TensorRT operator support
#[derive(Debug, Clone, Copy, Default)]
pub struct TensorrtPolicy;

impl CompatibilityPolicy for TensorrtPolicy {
    fn is_compatible(&self, node: &Node) -> DelegateResult<bool> {
        let Some(op) = node.op_name() else {
            return Ok(false);
        };

        match op {
            "Pooling" => Ok(POOL_TYPES.contains(&node.attr("pool_type")?)),
            "Activation" => Ok(ACT_TYPES.contains(&node.attr("act_type")?)),
            _ => Ok(UNCONDITIONAL_OPS.contains(&op)),
        }
    }

    fn is_weight_bearing(&self, node: &Node) -> bool {
        node.op_name().is_some_and(|op| WEIGHT_OPS.contains(&op))
    }
}

/// Selector growing TensorRT clusters
pub type TensorrtSelector = PolicySelector<TensorrtPolicy>;

/// TensorRT delegation property
#[derive(Debug, Clone)]
pub struct TensorrtProperty {
    min_ops: usize,
}

impl TensorrtProperty {
    /// Property with the default cluster threshold
    pub fn new() -> Self {
        Self {
            min_ops: DEFAULT_MIN_OPS,
        }
    }

    /// Change the minimum number of operators a cluster needs
    pub fn with_min_ops(mut self, min_ops: usize) -> Self {
        self.min_ops = min_ops;
        self
    }
}

impl Default for TensorrtProperty {
    fn default() -> Self {
        Self::new()
    }
}

impl SubgraphProperty for TensorrtProperty {
    fn name(&self) -> &'static str {
        "TensorRT"
    }

    fn fused_op(&self) -> &'static str {
        TENSORRT_OP
    }

    fn create_selector(&self) -> Box<dyn SubgraphSelector> {
        Box::new(TensorrtSelector::new(TensorrtPolicy).with_min_ops(self.min_ops))
    }

    fn create_subgraph_node(
        &self,
        registry: &OpRegistry,
        subgraph: SubgraphDef,
        name: String,
    ) -> DelegateResult<Node> {
        let params = subgraph.list_input_names().join(";");
        let num_outputs = subgraph.num_outputs() as u32;

        let mut node = Node {
            name,
            kind: NodeKind::Fused {
                op: TENSORRT_OP.to_string(),
                state: Box::new(FusedOp::new(subgraph)),
            },
            attrs: Attrs::new(),
            inputs: Vec::new(),
            num_outputs,
        }
        .with_attr(PARAMS_NAMES_ATTR, params);

        registry.parse_attrs(&mut node)?;
        Ok(node)
    }
}

/// Attribute parser of `_TensorRT` nodes
///
/// Splits `subgraph_params_names` into the fused state's parameter list and
/// checks it against the variables of the embedded subgraph.
pub fn parse_tensorrt_attrs(node: &mut Node) -> DelegateResult<()> {
    let name = node.name.clone();
    let parse_error = |reason: String| DelegateError::AttrParse {
        op: TENSORRT_OP.to_string(),
        node: name.clone(),
        reason,
    };

    let raw = node.attr(PARAMS_NAMES_ATTR)?;
    let names: Vec<String> = if raw.is_empty() {
        Vec::new()
    } else {
        raw.split(';').map(str::to_string).collect()
    };

    let state = node
        .fused_mut()
        .ok_or_else(|| parse_error("node carries no subgraph".to_string()))?;
    let expected = state.subgraph.list_input_names();
    if expected != names {
        return Err(parse_error(format!(
            "parameters {:?} do not match subgraph variables {:?}",
            names, expected
        )));
    }

    state.param_names = names;
    Ok(())
}

/// Register the `_TensorRT` operator kind
pub fn register_ops(registry: &mut OpRegistry) {
    registry.register(
        OpSchema::new(TENSORRT_OP)
            .require(PARAMS_NAMES_ATTR)
            .with_parser(parse_tensorrt_attrs),
    );
}
