use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use crate::converter::Converter;
use crate::error::{BridgeError, GraphError};
use crate::framework::{OpDesc, Scope, Subgraph};
use crate::graph::OperandGraph;

mod activation;
mod arg_min_max;
mod conv;
mod softmax;
pub mod utility;

pub use activation::ActivationBridge;
pub use arg_min_max::ArgMinMaxBridge;
pub use conv::{Conv2dBridge, Conv2dInputs};
pub use softmax::SoftmaxBridge;

/// Outcome of lowering one operator, or a whole subgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertStatus {
    Success,
    Failed,
    UnsupportedFeature,
    /// Lowered, but only for the current concrete input shapes.
    RebuildOnShapeChange,
}

impl ConvertStatus {
    pub fn is_ok(self) -> bool {
        matches!(
            self,
            ConvertStatus::Success | ConvertStatus::RebuildOnShapeChange
        )
    }
}

/// Lowers one family of framework operators into HAL operations.
pub trait Bridge {
    /// Framework operator types this bridge handles.
    fn op_types(&self) -> &'static [&'static str];

    /// Emits the operands and operations for `op`.
    ///
    /// A bridge decides whether it can lower `op` before touching `converter`:
    /// any non-success outcome leaves the graph unchanged.
    fn convert(
        &self,
        converter: &mut Converter,
        op: &OpDesc,
        scope: &Scope,
    ) -> Result<ConvertStatus, BridgeError>;
}

/// Result of lowering a whole subgraph.
#[derive(Debug)]
pub struct LoweredGraph {
    pub graph: OperandGraph,
    pub rebuild_on_shape_change: bool,
}

pub struct BridgeRegistry {
    bridges: HashMap<&'static str, Arc<dyn Bridge + Send + Sync>>,
}

impl BridgeRegistry {
    pub fn empty() -> Self {
        Self {
            bridges: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Conv2dBridge);
        registry.register(ArgMinMaxBridge);
        registry.register(ActivationBridge);
        registry.register(SoftmaxBridge);
        registry
    }

    pub fn register(&mut self, bridge: impl Bridge + Send + Sync + 'static) {
        let bridge: Arc<dyn Bridge + Send + Sync> = Arc::new(bridge);
        for &op_type in bridge.op_types() {
            self.bridges.insert(op_type, Arc::clone(&bridge));
        }
    }

    pub fn supported_op_types(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.bridges.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn find(&self, op_type: &str) -> Option<&(dyn Bridge + Send + Sync)> {
        self.bridges.get(op_type).map(|bridge| bridge.as_ref())
    }

    /// Lowers a single operator.
    pub fn convert_op(&self, converter: &mut Converter, op: &OpDesc, scope: &Scope) -> ConvertStatus {
        let Some(bridge) = self.find(op.op_type()) else {
            warn!(
                "no bridge for operator `{}`. Supported: {:?}",
                op.op_type(),
                self.supported_op_types()
            );
            return ConvertStatus::UnsupportedFeature;
        };
        debug!("converting {} ...", op.op_type());
        match bridge.convert(converter, op, scope) {
            Ok(status) => status,
            Err(err) => {
                warn!("failed to convert `{}`: {}", op.op_type(), err);
                ConvertStatus::Failed
            }
        }
    }

    /// Lowers `ops` in order, stopping at the first operator that cannot be lowered.
    pub fn convert_subgraph(
        &self,
        converter: &mut Converter,
        ops: &[OpDesc],
        scope: &Scope,
    ) -> ConvertStatus {
        let mut status = ConvertStatus::Success;
        for op in ops {
            match self.convert_op(converter, op, scope) {
                ConvertStatus::Success => {}
                ConvertStatus::RebuildOnShapeChange => {
                    status = ConvertStatus::RebuildOnShapeChange;
                }
                failure => return failure,
            }
        }
        status
    }

    /// Lowers `subgraph` with a fresh converter and hands out the finished graph.
    pub fn lower(&self, subgraph: &Subgraph) -> Result<LoweredGraph, GraphError> {
        let mut converter = Converter::new();
        let status = self.convert_subgraph(&mut converter, &subgraph.ops, &subgraph.scope);
        if !status.is_ok() {
            return Err(GraphError::LoweringFailed { status });
        }
        Ok(LoweredGraph {
            graph: converter.finish(),
            rebuild_on_shape_change: status == ConvertStatus::RebuildOnShapeChange,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{PrecisionType, Tensor};
    use crate::graph::OperationType;

    struct CountingBridge;

    impl Bridge for CountingBridge {
        fn op_types(&self) -> &'static [&'static str] {
            &["noop_a", "noop_b"]
        }

        fn convert(
            &self,
            converter: &mut Converter,
            op: &OpDesc,
            _scope: &Scope,
        ) -> Result<ConvertStatus, BridgeError> {
            let name = op.first_output("Out")?;
            converter.add_float32_variable_operand(&[1], Some(name));
            Ok(ConvertStatus::Success)
        }
    }

    #[test]
    fn one_bridge_serves_several_types() {
        let mut registry = BridgeRegistry::empty();
        registry.register(CountingBridge);
        assert_eq!(registry.supported_op_types(), vec!["noop_a", "noop_b"]);
        assert!(registry.find("noop_b").is_some());
        assert!(registry.find("noop_c").is_none());
    }

    #[test]
    fn defaults_cover_the_bundled_bridges() {
        let registry = BridgeRegistry::with_defaults();
        for op_type in ["conv2d", "depthwise_conv2d", "arg_max", "arg_min", "relu", "softmax"] {
            assert!(registry.find(op_type).is_some(), "{op_type}");
        }
    }

    #[test]
    fn unknown_operator_is_unsupported() {
        let registry = BridgeRegistry::with_defaults();
        let mut converter = Converter::new();
        let status = registry.convert_op(&mut converter, &OpDesc::new("lstm"), &Scope::default());
        assert_eq!(status, ConvertStatus::UnsupportedFeature);
    }

    #[test]
    fn bridge_errors_become_failed() {
        let mut registry = BridgeRegistry::empty();
        registry.register(CountingBridge);
        let mut converter = Converter::new();
        let status = registry.convert_op(&mut converter, &OpDesc::new("noop_a"), &Scope::default());
        assert_eq!(status, ConvertStatus::Failed);
        assert!(converter.graph().is_empty());
    }

    #[test]
    fn pass_stops_at_first_failure() {
        let mut registry = BridgeRegistry::empty();
        registry.register(CountingBridge);
        let ops = vec![
            OpDesc::new("noop_a").with_output("Out", "a"),
            OpDesc::new("unknown"),
            OpDesc::new("noop_b").with_output("Out", "b"),
        ];
        let mut converter = Converter::new();
        let status = registry.convert_subgraph(&mut converter, &ops, &Scope::default());
        assert_eq!(status, ConvertStatus::UnsupportedFeature);
        assert!(converter.has_operand("a"));
        assert!(!converter.has_operand("b"));
    }

    #[test]
    fn rebuild_status_is_sticky() {
        let registry = BridgeRegistry::with_defaults();
        let scope = Scope::default()
            .with_tensor("x", Tensor::placeholder(vec![1, 4], PrecisionType::Float))
            .with_tensor("y", Tensor::placeholder(vec![1, 4], PrecisionType::Float))
            .with_tensor("z", Tensor::placeholder(vec![1], PrecisionType::Int64));
        let subgraph = Subgraph {
            ops: vec![
                OpDesc::new("relu").with_input("X", "x").with_output("Out", "y"),
                OpDesc::new("arg_max")
                    .with_input("X", "y")
                    .with_output("Out", "z")
                    .with_attr("axis", 1i64)
                    .with_attr("keepdims", false),
            ],
            scope,
        };

        let lowered = registry.lower(&subgraph).unwrap();
        assert!(lowered.rebuild_on_shape_change);
        let op_types: Vec<_> = lowered.graph.operations().iter().map(|op| op.op_type).collect();
        assert_eq!(op_types, vec![OperationType::Relu, OperationType::ArgMax]);
        // relu output feeds arg_max through the memo
        assert_eq!(
            lowered.graph.operations()[0].outputs[0],
            lowered.graph.operations()[1].inputs[0]
        );
    }

    #[test]
    fn failed_lowering_is_an_error() {
        let registry = BridgeRegistry::with_defaults();
        let subgraph = Subgraph {
            ops: vec![OpDesc::new("relu").with_input("X", "missing").with_output("Out", "y")],
            scope: Scope::default(),
        };
        let err = registry.lower(&subgraph).unwrap_err();
        assert!(matches!(
            err,
            GraphError::LoweringFailed {
                status: ConvertStatus::Failed
            }
        ));
    }
}
