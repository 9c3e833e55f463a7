//! Engine handoff
//!
//! After partitioning, each fused node is handed to an external engine
//! builder as an [`EngineHandoff`]: the embedded subgraph plus its slot
//! tables. The engine reports its bindings by name; [`BindingOrder`] maps
//! them back to fused slots.
//!
//! | Item | Owner |
//! |------|-------|
//! | subgraph, slot tables | the fused node (borrowed by the handoff) |
//! | compiled engine | [`EngineSession`], released on drop |
//!
//! # Example
//!
//! ```ignore
//! for handoff in graph.handoffs() {
//!     let session = EngineSession::open(&builder, &handoff)?;
//!     for (slot, is_input) in session.order().iter() {
//!         // bind fused input/output `slot`
//!     }
//! }
//! ```

use tracing::debug;

use crate::error::{DelegateError, DelegateResult};
use crate::graph::{Graph, NodeId};
use crate::partition::{ParamTable, SubgraphDef};

/// Everything an engine builder needs for one fused node
#[derive(Debug, Clone, Copy)]
pub struct EngineHandoff<'a> {
    /// Fused node id in the host graph
    pub id: NodeId,
    /// Fused node name
    pub name: &'a str,
    /// Embedded subgraph
    pub subgraph: &'a SubgraphDef,
    /// Name → slot tables
    pub params: &'a ParamTable,
    /// Parsed `subgraph_params_names`
    pub param_names: &'a [String],
}

impl Graph {
    /// Handoffs for every fused node, in arena order
    pub fn handoffs(&self) -> impl Iterator<Item = EngineHandoff<'_>> {
        self.fused_nodes().filter_map(|(id, node)| {
            node.fused().map(|state| EngineHandoff {
                id,
                name: node.name.as_str(),
                subgraph: &state.subgraph,
                params: &state.params,
                param_names: &state.param_names,
            })
        })
    }
}

/// One engine binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Tensor name as the engine reports it
    pub name: String,
    /// Input or output binding
    pub is_input: bool,
}

impl Binding {
    /// Input binding
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_input: true,
        }
    }

    /// Output binding
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_input: false,
        }
    }
}

/// A compiled engine
pub trait CompiledEngine {
    /// Bindings in engine order
    fn bindings(&self) -> Vec<Binding>;

    /// Free the engine's resources
    fn release(&mut self);
}

/// Compiles fused subgraphs into engines
pub trait EngineBuilder {
    /// Engine type produced
    type Engine: CompiledEngine;

    /// Compile one fused node
    fn build(&self, handoff: &EngineHandoff<'_>) -> DelegateResult<Self::Engine>;
}

/// Engine bindings resolved to fused `(slot, is_input)` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingOrder {
    order: Vec<(u32, bool)>,
}

impl BindingOrder {
    /// Resolve every binding through the slot tables
    pub fn resolve(bindings: &[Binding], params: &ParamTable) -> DelegateResult<Self> {
        let order = bindings
            .iter()
            .map(|binding| {
                let (slot, direction) = if binding.is_input {
                    (params.input_slot(&binding.name), "input")
                } else {
                    (params.output_slot(&binding.name), "output")
                };
                slot.map(|s| (s, binding.is_input))
                    .ok_or_else(|| DelegateError::UnknownBinding {
                        name: binding.name.clone(),
                        direction,
                    })
            })
            .collect::<DelegateResult<Vec<_>>>()?;

        Ok(Self { order })
    }

    /// Pairs in engine binding order
    pub fn iter(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        self.order.iter().copied()
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of input bindings
    pub fn num_inputs(&self) -> usize {
        self.order.iter().filter(|(_, input)| *input).count()
    }
}

/// Scoped owner of a compiled engine
///
/// The engine is released exactly once, when the session is closed or dropped.
pub struct EngineSession<E: CompiledEngine> {
    engine: E,
    order: BindingOrder,
    name: String,
    released: bool,
}

impl<E: CompiledEngine> EngineSession<E> {
    /// Build the engine for a handoff and resolve its bindings
    pub fn open<B>(builder: &B, handoff: &EngineHandoff<'_>) -> DelegateResult<Self>
    where
        B: EngineBuilder<Engine = E>,
    {
        let engine = builder.build(handoff)?;
        Self::new(engine, handoff)
    }

    /// Wrap an engine that was already built
    ///
    /// The engine is released even if its bindings fail to resolve.
    pub fn new(engine: E, handoff: &EngineHandoff<'_>) -> DelegateResult<Self> {
        let mut session = Self {
            engine,
            order: BindingOrder::default(),
            name: handoff.name.to_string(),
            released: false,
        };
        session.order = BindingOrder::resolve(&session.engine.bindings(), handoff.params)?;
        debug!(fused = %session.name, bindings = session.order.len(), "engine session opened");
        Ok(session)
    }

    /// Compiled engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Resolved binding order
    pub fn order(&self) -> &BindingOrder {
        &self.order
    }

    /// Fused node the engine was built for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the engine now
    pub fn close(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.engine.release();
            debug!(fused = %self.name, "engine released");
        }
    }
}

impl<E: CompiledEngine> Drop for EngineSession<E> {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl<E: CompiledEngine> std::fmt::Debug for EngineSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("released", &self.released)
            .finish()
    }
}
