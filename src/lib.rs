//! # Subgraph Delegate
//!
//! Partitions dataflow graphs for external execution engines.
//!
//! The crate finds maximal clusters of operators a target engine supports and
//! rewrites each cluster into one opaque fused node, keeping every external
//! connection and recording a name → slot table for the engine builder.
//!
//! ## Features
//!
//! - **Cluster extraction**: selector-driven breadth-first growth, never
//!   producing a cluster whose contraction would create a cycle
//! - **Rewriting**: fused nodes with embedded subgraphs and slot tables
//! - **Targets**: TensorRT-style compatibility policy with weight absorption
//! - **Engine handoff**: binding-order resolution and scoped engine sessions
//!
//! ## Example
//!
//! ```ignore
//! use subgraph_delegate::prelude::*;
//!
//! let mut b = GraphBuilder::new();
//! let data = b.variable("data")?;
//! let w = b.variable("weight")?;
//! let conv = b.op("Convolution", "conv0", &[data, w])?;
//! let relu = b.op("relu", "relu0", &[conv])?;
//! let mut graph = b.build(&[relu])?;
//!
//! let report = partition_graph(&mut graph, &DelegationTarget::TensorRt, &PartitionConfig::default())?;
//! assert_eq!(report.fused[0].name, "TensorRT0");
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod engine;
pub mod error;
pub mod graph;
pub mod partition;
pub mod property;
pub mod traits;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use subgraph_delegate::prelude::*`
pub mod prelude {
    pub use crate::engine::{
        Binding, BindingOrder, CompiledEngine, EngineBuilder, EngineHandoff, EngineSession,
    };
    pub use crate::error::{DelegateError, DelegateResult};
    pub use crate::graph::{Graph, GraphBuilder, Node, NodeEntry, NodeId, OpRegistry};
    pub use crate::partition::{
        inline_fused_node, partition_graph, OutputDedup, ParamTable, PartitionConfig,
        PartitionPlan, PartitionReport,
    };
    pub use crate::property::{default_registry, DelegationTarget, TensorrtProperty};
    pub use crate::traits::{CompatibilityPolicy, SubgraphProperty, SubgraphSelector};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{DelegateError, DelegateResult};
pub use partition::{partition_graph, PartitionConfig, PartitionReport};
pub use property::DelegationTarget;

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_prelude_pipeline() {
        use crate::prelude::*;

        let mut b = GraphBuilder::new();
        let data = b.variable("data").unwrap();
        let w = b.variable("weight").unwrap();
        let conv = b.op("Convolution", "conv0", &[data, w]).unwrap();
        let relu = b.op("relu", "relu0", &[conv]).unwrap();
        let mut graph = b.build(&[relu]).unwrap();

        let report =
            partition_graph(&mut graph, &DelegationTarget::TensorRt, &PartitionConfig::default())
                .unwrap();
        assert_eq!(report.fused[0].name, "TensorRT0");
    }
}
