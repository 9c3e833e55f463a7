//! Dataflow graph model
//!
//! This module provides the graph the partitioner reads and rewrites:
//!
//! - [`Graph`]: index-stable node arena plus external outputs
//! - [`Node`], [`NodeEntry`], [`NodeId`]: nodes and `(producer, slot)` edges
//! - [`GraphBuilder`]: schema-validated construction
//! - [`schema`]: per-operator attribute schemas ([`OpRegistry`])
//! - [`maps`]: derived lookup maps
//!
//! # Example
//!
//! ```ignore
//! use subgraph_delegate::graph::GraphBuilder;
//!
//! let mut b = GraphBuilder::new();
//! let data = b.variable("data")?;
//! let weight = b.variable("weight")?;
//! let conv = b.op("Convolution", "conv0", &[data, weight])?;
//! let act = b.op_with("Activation", "act0", &[conv], &[("act_type", "relu")])?;
//! let graph = b.build(&[act])?;
//!
//! let consumers = graph.consumers();
//! assert_eq!(consumers.get(conv.node), &[act.node]);
//! ```
//!
//! # Ownership
//!
//! | Item | Owner |
//! |------|-------|
//! | live nodes | the graph arena |
//! | nodes absorbed by a rewrite | the fused node's embedded subgraph |
//! | edges | consumer input lists and the graph output list |

pub mod builder;
pub mod context;
pub mod maps;
pub mod mutators;
pub mod node;
pub mod schema;

// Re-export main types
pub use builder::GraphBuilder;
pub use context::Graph;
pub use maps::{build_consumer_map, ConsumerMap, NameMap};
pub use mutators::EdgeSite;
pub use node::{Attrs, Node, NodeEntry, NodeId, NodeKind, NodeRef};
pub use schema::{AttrParser, OpRegistry, OpSchema};
