//! Conversions between framework tensor types and HAL operand types.
//!
//! Every mapping here is total over the codes the two sides agree on. An
//! unmapped code is an integration defect, so the mapping functions panic
//! instead of returning an error.

use log::error;

use crate::framework::{DataLayoutType, PrecisionType};
use crate::graph::{Dim, Layout, OperandType, Precision, PrecisionCode};

/// Framework precisions that have a HAL counterpart.
pub const SUPPORTED_PRECISIONS: [PrecisionType; 9] = [
    PrecisionType::Bool,
    PrecisionType::Int8,
    PrecisionType::Uint8,
    PrecisionType::Int16,
    PrecisionType::Int32,
    PrecisionType::Int64,
    PrecisionType::Fp16,
    PrecisionType::Float,
    PrecisionType::Fp64,
];

pub fn precision_of(precision: PrecisionType) -> Precision {
    match precision {
        PrecisionType::Bool => Precision::Bool8,
        PrecisionType::Int8 => Precision::Int8,
        PrecisionType::Uint8 => Precision::Uint8,
        PrecisionType::Int16 => Precision::Int16,
        PrecisionType::Int32 => Precision::Int32,
        PrecisionType::Int64 => Precision::Int64,
        PrecisionType::Fp16 => Precision::Float16,
        PrecisionType::Float => Precision::Float32,
        PrecisionType::Fp64 => Precision::Float64,
        PrecisionType::Unknown | PrecisionType::Any => {
            panic!("unsupported framework precision {precision:?}")
        }
    }
}

/// Framework precision holding the storage of `code`.
pub fn framework_precision_of(code: PrecisionCode) -> PrecisionType {
    try_framework_precision_of(code)
        .unwrap_or_else(|| panic!("HAL precision {code:?} has no framework precision"))
}

fn try_framework_precision_of(code: PrecisionCode) -> Option<PrecisionType> {
    match code.storage() {
        Precision::Bool8 => Some(PrecisionType::Bool),
        Precision::Int8 => Some(PrecisionType::Int8),
        Precision::Uint8 => Some(PrecisionType::Uint8),
        Precision::Int16 => Some(PrecisionType::Int16),
        Precision::Int32 => Some(PrecisionType::Int32),
        Precision::Int64 => Some(PrecisionType::Int64),
        Precision::Float16 => Some(PrecisionType::Fp16),
        Precision::Float32 => Some(PrecisionType::Float),
        Precision::Float64 => Some(PrecisionType::Fp64),
        Precision::Uint16 | Precision::Uint32 | Precision::Uint64 => None,
    }
}

/// Maps a serialized framework dtype code to a HAL precision.
pub fn precision_of_var_type(code: i32) -> Precision {
    match code {
        0 => Precision::Bool8,
        1 => Precision::Int16,
        2 => Precision::Int32,
        3 => Precision::Int64,
        4 => Precision::Float16,
        5 => Precision::Float32,
        6 => Precision::Float64,
        20 => Precision::Uint8,
        21 => Precision::Int8,
        _ => panic!("unsupported framework dtype code {code}"),
    }
}

pub fn byte_width(code: PrecisionCode) -> usize {
    code.byte_width()
}

/// Byte width of a raw HAL precision code, `None` if the code is unknown.
pub fn byte_width_of_raw(raw: i32) -> Option<usize> {
    match PrecisionCode::from_raw(raw) {
        Some(code) => Some(code.byte_width()),
        None => {
            error!("failed to get the byte width of precision code {raw}");
            None
        }
    }
}

pub fn layout_of(layout: DataLayoutType) -> Layout {
    match layout {
        DataLayoutType::Nchw => Layout::Nchw,
        DataLayoutType::Nhwc => Layout::Nhwc,
        DataLayoutType::Unknown | DataLayoutType::Any => {
            panic!("unsupported framework layout {layout:?}")
        }
    }
}

pub fn framework_layout_of(layout: Layout) -> DataLayoutType {
    match layout {
        Layout::Nchw => DataLayoutType::Nchw,
        Layout::Nhwc => DataLayoutType::Nhwc,
    }
}

/// Framework dims to HAL dims; negative extents become dynamic.
///
/// Panics on a zero extent or one that does not fit in a `u32`.
pub fn convert_dimensions(dims: &[i64]) -> Vec<Dim> {
    dims.iter()
        .enumerate()
        .map(|(axis, &extent)| {
            Dim::try_from(extent)
                .unwrap_or_else(|err| panic!("dim {axis} of {dims:?} is malformed: {err}"))
        })
        .collect()
}

/// HAL dims to framework dims; dynamic extents become `-1`.
pub fn to_framework_dims(dims: &[Dim]) -> Vec<i64> {
    dims.iter().map(|&d| i64::from(d)).collect()
}

pub fn dimensions_compatible(target: &OperandType, reference: &[i64]) -> bool {
    target.dimensions.len() == reference.len()
        && target
            .dimensions
            .iter()
            .zip(reference)
            .all(|(dim, &extent)| match dim {
                Dim::Dynamic => true,
                Dim::Fixed(value) => *value as i64 == extent,
            })
}

pub fn layout_compatible(target: &OperandType, reference: DataLayoutType) -> bool {
    match target.layout {
        Layout::Nchw => reference == DataLayoutType::Nchw,
        Layout::Nhwc => reference == DataLayoutType::Nhwc,
    }
}

pub fn precision_compatible(target: &OperandType, reference: PrecisionType) -> bool {
    use PrecisionCode as C;
    match target.code() {
        C::Bool8 => reference == PrecisionType::Bool,
        C::Int8 | C::QuantInt8SymmPerLayer | C::QuantInt8SymmPerChannel => {
            reference == PrecisionType::Int8
        }
        C::Uint8 | C::QuantUint8AsymmPerLayer => reference == PrecisionType::Uint8,
        C::Int16 => reference == PrecisionType::Int16,
        C::Int32 | C::QuantInt32SymmPerLayer | C::QuantInt32SymmPerChannel => {
            reference == PrecisionType::Int32
        }
        C::Int64 => reference == PrecisionType::Int64,
        C::Float16 => reference == PrecisionType::Fp16,
        C::Float32 => reference == PrecisionType::Float,
        C::Float64 => reference == PrecisionType::Fp64,
        C::Uint16 | C::Uint32 | C::Uint64 | C::QuantUint32AsymmPerLayer => false,
    }
}

/// Whether the operand typed `target` can stand in for a request typed `reference`.
///
/// Storage precision, layout and dimensions must all be compatible. A
/// dynamic dimension in `reference` only matches a dynamic one in `target`.
pub fn operand_type_compatible(target: &OperandType, reference: &OperandType) -> bool {
    try_framework_precision_of(reference.code())
        .is_some_and(|precision| precision_compatible(target, precision))
        && layout_compatible(target, framework_layout_of(reference.layout))
        && dimensions_compatible(target, &to_framework_dims(&reference.dimensions))
}
