//! Delegation targets
//!
//! A [`DelegationTarget`] names one external engine and resolves to the
//! [`SubgraphProperty`] implementing it.
//!
//! | Target | Property | Fused op |
//! |--------|----------|----------|
//! | `TensorRt` | [`TensorrtProperty`] | `_TensorRT` |

pub mod tensorrt;

pub use tensorrt::{
    parse_tensorrt_attrs, TensorrtPolicy, TensorrtProperty, TensorrtSelector, PARAMS_NAMES_ATTR,
    TENSORRT_OP,
};

use std::fmt;
use std::str::FromStr;

use crate::error::DelegateError;
use crate::graph::OpRegistry;
use crate::traits::SubgraphProperty;

/// Supported delegation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelegationTarget {
    /// NVIDIA TensorRT
    TensorRt,
}

impl DelegationTarget {
    /// Every known target
    pub const ALL: &'static [DelegationTarget] = &[DelegationTarget::TensorRt];

    /// Property implementing this target
    pub fn property(&self) -> Box<dyn SubgraphProperty> {
        match self {
            DelegationTarget::TensorRt => Box::new(TensorrtProperty::new()),
        }
    }

    /// Register the fused operator kinds of this target
    pub fn register_ops(&self, registry: &mut OpRegistry) {
        match self {
            DelegationTarget::TensorRt => tensorrt::register_ops(registry),
        }
    }

    /// Backend name
    pub fn as_str(&self) -> &'static str {
        match self {
            DelegationTarget::TensorRt => "TensorRT",
        }
    }
}

impl fmt::Display for DelegationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DelegationTarget {
    type Err = DelegateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DelegationTarget::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DelegateError::UnknownTarget(s.to_string()))
    }
}

/// Standard operator registry plus the fused kinds of every target
pub fn default_registry() -> OpRegistry {
    let mut registry = OpRegistry::standard();
    for target in DelegationTarget::ALL {
        target.register_ops(&mut registry);
    }
    registry
}
