use std::path::PathBuf;

use serde_json::Error as JsonError;
use thiserror::Error;

use crate::graph::OperationType;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("subgraph file {path} could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("subgraph JSON could not be parsed: {source}")]
    Parse {
        #[from]
        source: JsonError,
    },
    #[error("operand graph must declare operands and operations")]
    EmptyGraph,
    #[error("operand {operand} has a shape that overflows element count")]
    OperandElementCountOverflow { operand: u32 },
    #[error("operand {operand} exceeds tensor byte limit ({byte_length} > {limit})")]
    TensorLimit {
        operand: u32,
        byte_length: usize,
        limit: usize,
    },
    #[error("constant operand {operand} byte mismatch (expected {expected}, got {actual})")]
    ConstantLengthMismatch {
        operand: u32,
        expected: usize,
        actual: usize,
    },
    #[error("operand id {operand} referenced by operation #{operation} ({op_type:?}) is invalid")]
    InvalidOperandReference {
        operation: usize,
        op_type: OperationType,
        operand: u32,
    },
    #[error("operation #{operation} ({op_type:?}) consumes operand {operand} before it is produced")]
    OperandNotReady {
        operation: usize,
        op_type: OperationType,
        operand: u32,
    },
    #[error("operation #{operation} ({op_type:?}) writes constant operand {operand}")]
    ConstantProduced {
        operation: usize,
        op_type: OperationType,
        operand: u32,
    },
    #[error("operation #{operation} ({op_type:?}) attempts to reuse operand {operand} as output")]
    OperandProducedTwice {
        operation: usize,
        op_type: OperationType,
        operand: u32,
    },
    #[error(
        "operation #{operation} ({op_type:?}) expects {expected_inputs} inputs and {expected_outputs} outputs, got {inputs} and {outputs}"
    )]
    ArityMismatch {
        operation: usize,
        op_type: OperationType,
        expected_inputs: usize,
        expected_outputs: usize,
        inputs: usize,
        outputs: usize,
    },
    #[error("subgraph lowering ended with status {status:?}")]
    LoweringFailed { status: crate::bridges::ConvertStatus },
    #[error("operand graph could not be exported to {path}: {source}")]
    ExportIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GraphError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GraphError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn export(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GraphError::ExportIo {
            path: path.into(),
            source,
        }
    }
}

/// Framework-side lookups that a bridge could not satisfy.
///
/// These end lowering of the current subgraph with `ConvertStatus::Failed`
/// instead of aborting.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("operator `{op_type}` has no `{slot}` input")]
    MissingInput { op_type: String, slot: String },
    #[error("operator `{op_type}` has no `{slot}` output")]
    MissingOutput { op_type: String, slot: String },
    #[error("operator `{op_type}` has no attribute `{name}`")]
    MissingAttribute { op_type: String, name: String },
    #[error("attribute `{name}` of operator `{op_type}` is not a {expected}")]
    AttributeKind {
        op_type: String,
        name: String,
        expected: &'static str,
    },
    #[error("tensor `{name}` was not found in scope")]
    TensorNotFound { name: String },
    #[error("tensor `{name}` does not hold {expected} data")]
    TensorData { name: String, expected: &'static str },
}

/// A framework extent that is neither a `u32` above zero nor a dynamic marker.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("dimension extent {extent} must be dynamic (< 0) or within 1..=4294967295")]
pub struct InvalidDimension {
    pub extent: i64,
}
