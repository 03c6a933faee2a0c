pub mod bridges;
pub mod converter;
pub mod error;
pub mod framework;
pub mod graph;
pub mod graphviz;
pub mod loader;
pub mod types;
pub mod validator;

pub use bridges::{Bridge, BridgeRegistry, ConvertStatus, LoweredGraph};
pub use converter::{Converter, QuantScale};
pub use error::{BridgeError, GraphError, InvalidDimension};
pub use framework::{OpDesc, Scope, Subgraph, Tensor};
pub use graph::{
    ConstantData, Operand, OperandGraph, OperandId, OperandKind, OperandType, Operation,
    OperationType, Precision, PrecisionCode, Quantization,
};
pub use graphviz::graph_to_dot;
pub use loader::load_subgraph_from_path;
pub use validator::{ContextProperties, GraphValidator, ValidationArtifacts};
