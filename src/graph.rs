//! HAL-side operand graph.
//!
//! Operands live in an arena owned by [`OperandGraph`] and are addressed by
//! [`OperandId`]. The graph is append-only: operands and operations are never
//! removed or rewritten once pushed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::error::InvalidDimension;

/// Storage precision of an operand element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Bool8,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float16,
    Float32,
    Float64,
}

impl Precision {
    /// HAL code for this storage precision combined with `quantization`.
    ///
    /// Panics when the HAL has no code for the pair, e.g. a quantized float.
    pub fn code(self, quantization: &Quantization) -> PrecisionCode {
        use PrecisionCode as C;
        match (self, quantization) {
            (Precision::Bool8, Quantization::None) => C::Bool8,
            (Precision::Int8, Quantization::None) => C::Int8,
            (Precision::Uint8, Quantization::None) => C::Uint8,
            (Precision::Int16, Quantization::None) => C::Int16,
            (Precision::Uint16, Quantization::None) => C::Uint16,
            (Precision::Int32, Quantization::None) => C::Int32,
            (Precision::Uint32, Quantization::None) => C::Uint32,
            (Precision::Int64, Quantization::None) => C::Int64,
            (Precision::Uint64, Quantization::None) => C::Uint64,
            (Precision::Float16, Quantization::None) => C::Float16,
            (Precision::Float32, Quantization::None) => C::Float32,
            (Precision::Float64, Quantization::None) => C::Float64,
            (Precision::Int8, Quantization::PerLayer { .. }) => C::QuantInt8SymmPerLayer,
            (Precision::Int8, Quantization::PerChannel { .. }) => C::QuantInt8SymmPerChannel,
            (Precision::Uint8, Quantization::PerLayer { .. }) => C::QuantUint8AsymmPerLayer,
            (Precision::Int32, Quantization::PerLayer { .. }) => C::QuantInt32SymmPerLayer,
            (Precision::Int32, Quantization::PerChannel { .. }) => C::QuantInt32SymmPerChannel,
            (Precision::Uint32, Quantization::PerLayer { .. }) => C::QuantUint32AsymmPerLayer,
            (precision, quantization) => panic!(
                "no HAL precision code for {precision:?} with {quantization:?} quantization"
            ),
        }
    }
}

/// Precision encoding understood by the HAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum PrecisionCode {
    Bool8 = 0,
    Int8 = 1,
    Uint8 = 2,
    Int16 = 3,
    Uint16 = 4,
    Int32 = 5,
    Uint32 = 6,
    Int64 = 7,
    Uint64 = 8,
    Float16 = 9,
    Float32 = 10,
    Float64 = 11,
    QuantInt8SymmPerLayer = 12,
    QuantInt8SymmPerChannel = 13,
    QuantUint8AsymmPerLayer = 14,
    QuantInt32SymmPerLayer = 15,
    QuantInt32SymmPerChannel = 16,
    QuantUint32AsymmPerLayer = 17,
}

impl PrecisionCode {
    pub const ALL: [PrecisionCode; 18] = [
        PrecisionCode::Bool8,
        PrecisionCode::Int8,
        PrecisionCode::Uint8,
        PrecisionCode::Int16,
        PrecisionCode::Uint16,
        PrecisionCode::Int32,
        PrecisionCode::Uint32,
        PrecisionCode::Int64,
        PrecisionCode::Uint64,
        PrecisionCode::Float16,
        PrecisionCode::Float32,
        PrecisionCode::Float64,
        PrecisionCode::QuantInt8SymmPerLayer,
        PrecisionCode::QuantInt8SymmPerChannel,
        PrecisionCode::QuantUint8AsymmPerLayer,
        PrecisionCode::QuantInt32SymmPerLayer,
        PrecisionCode::QuantInt32SymmPerChannel,
        PrecisionCode::QuantUint32AsymmPerLayer,
    ];

    pub fn raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.raw() == raw)
    }

    pub fn byte_width(self) -> usize {
        use PrecisionCode as C;
        match self {
            C::Bool8
            | C::Int8
            | C::Uint8
            | C::QuantInt8SymmPerLayer
            | C::QuantInt8SymmPerChannel
            | C::QuantUint8AsymmPerLayer => 1,
            C::Int16 | C::Uint16 | C::Float16 => 2,
            C::Int32
            | C::Uint32
            | C::Float32
            | C::QuantInt32SymmPerLayer
            | C::QuantInt32SymmPerChannel
            | C::QuantUint32AsymmPerLayer => 4,
            C::Int64 | C::Uint64 | C::Float64 => 8,
        }
    }

    /// Storage precision with the quantization tag stripped.
    pub fn storage(self) -> Precision {
        use PrecisionCode as C;
        match self {
            C::Bool8 => Precision::Bool8,
            C::Int8 | C::QuantInt8SymmPerLayer | C::QuantInt8SymmPerChannel => Precision::Int8,
            C::Uint8 | C::QuantUint8AsymmPerLayer => Precision::Uint8,
            C::Int16 => Precision::Int16,
            C::Uint16 => Precision::Uint16,
            C::Int32 | C::QuantInt32SymmPerLayer | C::QuantInt32SymmPerChannel => {
                Precision::Int32
            }
            C::Uint32 | C::QuantUint32AsymmPerLayer => Precision::Uint32,
            C::Int64 => Precision::Int64,
            C::Uint64 => Precision::Uint64,
            C::Float16 => Precision::Float16,
            C::Float32 => Precision::Float32,
            C::Float64 => Precision::Float64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Layout {
    #[default]
    Nchw,
    Nhwc,
}

/// One operand dimension. Serialized as an integer, `-1` for dynamic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Dim {
    Fixed(u32),
    Dynamic,
}

impl TryFrom<i64> for Dim {
    type Error = InvalidDimension;

    fn try_from(extent: i64) -> Result<Self, Self::Error> {
        if extent < 0 {
            return Ok(Dim::Dynamic);
        }
        match u32::try_from(extent) {
            Ok(value) if value > 0 => Ok(Dim::Fixed(value)),
            _ => Err(InvalidDimension { extent }),
        }
    }
}

impl From<Dim> for i64 {
    fn from(dim: Dim) -> Self {
        match dim {
            Dim::Fixed(value) => value as i64,
            Dim::Dynamic => -1,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(value) => write!(f, "{value}"),
            Dim::Dynamic => f.write_str("?"),
        }
    }
}

/// Quantization carried by an operand type. Zero points are always 0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Quantization {
    #[default]
    None,
    PerLayer {
        scale: f32,
    },
    PerChannel {
        scales: Vec<f32>,
        channel_dim: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperandType {
    pub precision: Precision,
    #[serde(default)]
    pub layout: Layout,
    pub dimensions: Vec<Dim>,
    #[serde(default)]
    pub quantization: Quantization,
}

impl OperandType {
    pub fn new(precision: Precision, dimensions: Vec<Dim>) -> Self {
        Self {
            precision,
            layout: Layout::Nchw,
            dimensions,
            quantization: Quantization::None,
        }
    }

    pub fn with_quantization(self, quantization: Quantization) -> Self {
        Self {
            quantization,
            ..self
        }
    }

    pub fn with_layout(self, layout: Layout) -> Self {
        Self { layout, ..self }
    }

    pub fn code(&self) -> PrecisionCode {
        self.precision.code(&self.quantization)
    }

    /// Element count, or `None` when a dimension is dynamic or the product overflows.
    pub fn element_count(&self) -> Option<usize> {
        let mut count = 1usize;
        for dim in &self.dimensions {
            match dim {
                Dim::Fixed(value) => count = count.checked_mul(*value as usize)?,
                Dim::Dynamic => return None,
            }
        }
        Some(count)
    }

    pub fn byte_length(&self) -> Option<usize> {
        self.element_count()?
            .checked_mul(self.code().byte_width())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperandKind {
    /// Value embedded at build time.
    Constant,
    /// Value filled at inference time.
    Variable,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantData {
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
    /// The HAL may reference the buffer instead of copying it.
    #[serde(default)]
    pub persistent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operand {
    pub kind: OperandKind,
    #[serde(rename = "type")]
    pub operand_type: OperandType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<ConstantData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperandId(pub u32);

impl OperandId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OperandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Conv2d,
    LeakyRelu,
    Relu,
    Relu6,
    Sigmoid,
    Tanh,
    Softmax,
    ArgMax,
    ArgMin,
}

impl OperationType {
    /// Fixed number of (inputs, outputs) for this operation type.
    pub fn arity(self) -> (usize, usize) {
        match self {
            OperationType::Conv2d => (conv2d::INPUT_COUNT, 1),
            OperationType::LeakyRelu => (leaky_relu::INPUT_COUNT, 1),
            OperationType::Relu
            | OperationType::Relu6
            | OperationType::Sigmoid
            | OperationType::Tanh => (1, 1),
            OperationType::Softmax => (softmax::INPUT_COUNT, 1),
            OperationType::ArgMax | OperationType::ArgMin => (arg_min_max::INPUT_COUNT, 1),
        }
    }
}

/// Input positions of `CONV_2D`.
pub mod conv2d {
    pub const INPUT: usize = 0;
    pub const FILTER: usize = 1;
    pub const BIAS: usize = 2;
    pub const AUTO_PAD: usize = 3;
    pub const PADS: usize = 4;
    pub const STRIDES: usize = 5;
    pub const GROUP: usize = 6;
    pub const DILATIONS: usize = 7;
    pub const FUSE_CODE: usize = 8;
    pub const INPUT_COUNT: usize = 9;
}

/// Input positions of `LEAKY_RELU`.
pub mod leaky_relu {
    pub const INPUT: usize = 0;
    pub const ALPHA: usize = 1;
    pub const INPUT_COUNT: usize = 2;
}

/// Input positions of `SOFTMAX`.
pub mod softmax {
    pub const INPUT: usize = 0;
    pub const AXIS: usize = 1;
    pub const INPUT_COUNT: usize = 2;
}

/// Input positions of `ARG_MAX` and `ARG_MIN`.
pub mod arg_min_max {
    pub const INPUT: usize = 0;
    pub const AXIS: usize = 1;
    pub const KEEPDIM: usize = 2;
    pub const DTYPE: usize = 3;
    pub const INPUT_COUNT: usize = 4;
}

/// Activation fused into the result of a compute operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum FuseCode {
    None = 0,
    Relu = 1,
    Relu1 = 2,
    Relu6 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum AutoPadCode {
    None = 0,
    Same = 1,
    Valid = 2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub inputs: Vec<OperandId>,
    pub outputs: Vec<OperandId>,
}

impl Operation {
    pub fn display_name(&self) -> String {
        format!("{:?}", self.op_type)
    }
}

/// Operands and operations built during one conversion pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperandGraph {
    operands: Vec<Operand>,
    operations: Vec<Operation>,
}

impl OperandGraph {
    pub fn operand(&self, id: OperandId) -> Option<&Operand> {
        self.operands.get(id.index())
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty() && self.operations.is_empty()
    }

    pub(crate) fn push_operand(&mut self, operand: Operand) -> OperandId {
        let id = u32::try_from(self.operands.len())
            .unwrap_or_else(|_| panic!("operand graph exceeds the u32 id space"));
        self.operands.push(operand);
        OperandId(id)
    }

    pub(crate) fn push_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
    }
}
