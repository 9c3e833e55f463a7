//! Per-operator attribute schema
//!
//! Every operator kind that may appear in a [`Graph`](super::Graph) is
//! registered here with the attributes it must carry. Validation happens when
//! a node enters a graph, so predicates that read attributes later never see
//! a malformed node.

use rustc_hash::FxHashMap;

use crate::error::{DelegateError, DelegateResult};

use super::node::Node;

/// Attribute parser hook, run once on a freshly created node of the kind
pub type AttrParser = fn(&mut Node) -> DelegateResult<()>;

/// Schema for a single operator kind
#[derive(Debug, Clone)]
pub struct OpSchema {
    /// Operator kind
    pub name: String,
    /// Attributes that must be present
    pub required_attrs: Vec<String>,
    /// Allowed values per attribute (attributes not listed are unconstrained)
    pub allowed_values: FxHashMap<String, Vec<String>>,
    /// Attribute holding the output count, if the kind has a variable number of outputs
    pub num_outputs_attr: Option<String>,
    /// Parser invoked on nodes created by rewrites
    pub attr_parser: Option<AttrParser>,
}

impl OpSchema {
    /// Schema with no required attributes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_attrs: Vec::new(),
            allowed_values: FxHashMap::default(),
            num_outputs_attr: None,
            attr_parser: None,
        }
    }

    /// Require an attribute
    pub fn require(mut self, key: &str) -> Self {
        self.required_attrs.push(key.to_string());
        self
    }

    /// Require an attribute and restrict its values
    pub fn require_one_of(mut self, key: &str, values: &[&str]) -> Self {
        self.required_attrs.push(key.to_string());
        self.allowed_values.insert(
            key.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// Read the output count from an attribute
    pub fn outputs_from(mut self, key: &str) -> Self {
        self.num_outputs_attr = Some(key.to_string());
        self
    }

    /// Attach an attribute parser
    pub fn with_parser(mut self, parser: AttrParser) -> Self {
        self.attr_parser = Some(parser);
        self
    }

    /// Check a node against this schema and return its output count
    pub fn validate(&self, node: &Node) -> DelegateResult<u32> {
        let violation = |reason: String| DelegateError::Schema {
            node: node.name.clone(),
            op: self.name.clone(),
            reason,
        };

        for key in &self.required_attrs {
            let value = node
                .attrs
                .get(key)
                .ok_or_else(|| violation(format!("missing required attribute `{}`", key)))?;

            if let Some(allowed) = self.allowed_values.get(key) {
                if !allowed.iter().any(|a| a == value) {
                    return Err(violation(format!(
                        "attribute `{}` = `{}` not in {:?}",
                        key, value, allowed
                    )));
                }
            }
        }

        match &self.num_outputs_attr {
            Some(key) => match node.attrs.get(key) {
                Some(raw) => raw
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| violation(format!("attribute `{}` = `{}` is not a positive count", key, raw))),
                None => Ok(node.num_outputs),
            },
            None => Ok(node.num_outputs),
        }
    }
}

/// Registry of operator schemas
#[derive(Debug, Clone, Default)]
pub struct OpRegistry {
    schemas: FxHashMap<String, OpSchema>,
}

impl OpRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the common dataflow operators
    ///
    /// Fused operator kinds are not included; delegation targets add their own
    /// (see [`crate::property::default_registry`]).
    pub fn standard() -> Self {
        let mut registry = Self::new();

        for op in [
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
            "softmax",
            "Reshape",
            "transpose",
            "Embedding",
            "LeakyReLU",
            "_copy",
        ] {
            registry.register(OpSchema::new(op));
        }

        registry.register(OpSchema::new("Pooling").require("pool_type"));
        registry.register(OpSchema::new("Activation").require("act_type"));
        registry.register(OpSchema::new("SliceChannel").outputs_from("num_outputs"));

        registry
    }

    /// Register (or replace) a schema
    pub fn register(&mut self, schema: OpSchema) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    /// Look up a schema
    pub fn get(&self, op: &str) -> Option<&OpSchema> {
        self.schemas.get(op)
    }

    /// Check if an operator kind is registered
    pub fn contains(&self, op: &str) -> bool {
        self.schemas.contains_key(op)
    }

    /// Validate a node; variables always pass
    pub fn validate(&self, node: &Node) -> DelegateResult<u32> {
        match node.op_name() {
            None => Ok(node.num_outputs),
            Some(op) => self
                .get(op)
                .ok_or_else(|| DelegateError::UnregisteredOp(op.to_string()))?
                .validate(node),
        }
    }

    /// Run the registered attribute parser of the node's kind
    ///
    /// The kind must be registered; a kind without a parser is accepted as is.
    pub fn parse_attrs(&self, node: &mut Node) -> DelegateResult<()> {
        let op = node
            .op_name()
            .ok_or_else(|| DelegateError::UnregisteredOp(format!("<variable {}>", node.name)))?
            .to_string();

        let schema = self
            .get(&op)
            .ok_or_else(|| DelegateError::UnregisteredOp(op.clone()))?;

        match schema.attr_parser {
            Some(parser) => parser(node),
            None => Ok(()),
        }
    }
}
