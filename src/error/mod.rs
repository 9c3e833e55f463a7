//! Error types for subgraph-delegate
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

use crate::graph::NodeId;

/// Main error type for partitioning and rewriting
#[derive(Error, Debug)]
pub enum DelegateError {
    /// A node id does not refer to a live node
    #[error("Invalid node: {0}")]
    InvalidNode(NodeId),

    /// An edge refers to a producer slot that does not exist or breaks topological order
    #[error("Invalid edge into `{node}`: {reason}")]
    InvalidEdge {
        /// Consumer node name
        node: String,
        /// What is wrong with the edge
        reason: String,
    },

    /// Two nodes share a name
    #[error("Duplicate node name: {0}")]
    DuplicateName(String),

    /// An attribute a predicate depends on is absent
    #[error("Node `{node}` is missing attribute `{key}`")]
    MissingAttribute {
        /// Node name
        node: String,
        /// Attribute key
        key: String,
    },

    /// Attribute schema violation at graph construction time
    #[error("Schema violation on `{node}` ({op}): {reason}")]
    Schema {
        /// Node name
        node: String,
        /// Operator kind
        op: String,
        /// Violation description
        reason: String,
    },

    /// Operator kind has no registered schema
    #[error("Unregistered operator: {0}")]
    UnregisteredOp(String),

    /// The attribute parser of an operator rejected a node
    #[error("Attribute parser for `{op}` failed on `{node}`: {reason}")]
    AttrParse {
        /// Operator kind
        op: String,
        /// Node name
        node: String,
        /// Parser message
        reason: String,
    },

    /// A node was expected to be a fused node
    #[error("Node `{0}` is not a fused node")]
    NotFused(String),

    /// An engine binding name is absent from the slot tables
    #[error("Engine binding `{name}` ({direction}) has no slot")]
    UnknownBinding {
        /// Binding name reported by the engine
        name: String,
        /// "input" or "output"
        direction: &'static str,
    },

    /// Unknown delegation backend name
    #[error("Unknown delegation target: {0}")]
    UnknownTarget(String),

    /// A post-rewrite consistency check failed
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// An [`EngineBuilder`](crate::engine::EngineBuilder) could not compile a
    /// fused node
    #[error("Engine build failed: {0}")]
    EngineBuild(String),
}

/// Result type alias for partitioning operations
pub type DelegateResult<T> = Result<T, DelegateError>;
