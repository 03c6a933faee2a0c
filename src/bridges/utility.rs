use log::debug;

use crate::converter::Converter;
use crate::error::BridgeError;
use crate::framework::{OpDesc, Scope};
use crate::graph::{AutoPadCode, OperandId, OperandType, Precision, Quantization};
use crate::types::{convert_dimensions, layout_of, precision_of};

/// Scales further apart than this from the first one make a per-channel scale list.
pub const PER_CHANNEL_THRESHOLD: f32 = 1e-5;

/// Whether `slot` names a tensor that exists in `scope`.
pub fn has_input(op: &OpDesc, scope: &Scope, slot: &str) -> bool {
    op.input(slot)
        .first()
        .is_some_and(|name| scope.find_tensor(name).is_some())
}

/// Panics on an empty scale list.
pub fn is_per_channel_scales(scales: &[f32]) -> bool {
    let (first, rest) = scales
        .split_first()
        .unwrap_or_else(|| panic!("scale list must not be empty"));
    rest.iter()
        .any(|scale| (scale - first).abs() > PER_CHANNEL_THRESHOLD)
}

/// Symmetric int32 quantization of `values`.
///
/// A single scale applies to every value, otherwise there must be one scale per value.
pub fn quantize_i32(values: &[f32], scales: &[f32]) -> Vec<i32> {
    let per_layer = scales.len() == 1;
    assert!(
        per_layer || scales.len() == values.len(),
        "{} scales cannot quantize {} values",
        scales.len(),
        values.len()
    );
    let limit = i32::MAX as f64;
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let scale = if per_layer { scales[0] } else { scales[i] };
            (value as f64 / scale as f64).round().clamp(-limit, limit) as i32
        })
        .collect()
}

/// Expands one padding per spatial axis into one per edge: `[a, b]` → `[a, a, b, b]`.
pub fn expand_paddings(paddings: Vec<i32>) -> Vec<i32> {
    if paddings.len() == 2 {
        paddings.iter().flat_map(|&p| [p, p]).collect()
    } else {
        paddings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingAlgorithm {
    Explicit,
    Same,
    Valid,
}

impl PaddingAlgorithm {
    /// `None` for names the HAL has no auto-pad mode for.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "" | "EXPLICIT" => Some(PaddingAlgorithm::Explicit),
            "SAME" => Some(PaddingAlgorithm::Same),
            "VALID" => Some(PaddingAlgorithm::Valid),
            _ => None,
        }
    }

    pub fn auto_pad_code(self) -> AutoPadCode {
        match self {
            PaddingAlgorithm::Explicit => AutoPadCode::None,
            PaddingAlgorithm::Same => AutoPadCode::Same,
            PaddingAlgorithm::Valid => AutoPadCode::Valid,
        }
    }
}

/// Rewrites per-edge `paddings` and `dilations` for `algorithm`.
///
/// `input_dims` and `filter_dims` are NCHW / OIHW. A dynamic spatial extent
/// leaves that axis untouched under `Same`.
pub fn update_padding_and_dilation(
    paddings: &mut [i32],
    dilations: &mut [i32],
    strides: &[i32],
    algorithm: PaddingAlgorithm,
    input_dims: &[i64],
    filter_dims: &[i64],
) {
    match algorithm {
        PaddingAlgorithm::Explicit => {}
        PaddingAlgorithm::Valid => paddings.iter_mut().for_each(|p| *p = 0),
        PaddingAlgorithm::Same => {
            for (axis, &stride) in strides.iter().enumerate() {
                let input = input_dims[axis + 2];
                if input < 0 {
                    debug!("skipping SAME padding for dynamic axis {axis}");
                    continue;
                }
                let stride = stride as i64;
                let kernel = filter_dims[axis + 2];
                let output = (input + stride - 1) / stride;
                let pad_sum = ((output - 1) * stride + kernel - input).max(0);
                let before = pad_sum / 2;
                paddings[axis * 2] = before as i32;
                paddings[axis * 2 + 1] = (pad_sum - before) as i32;
                dilations[axis] = 1;
            }
        }
    }
}

/// Operand type of the framework tensor `name`, optionally int8-quantized.
fn tensor_operand_type(
    scope: &Scope,
    name: &str,
    scale: Option<f32>,
) -> Result<OperandType, BridgeError> {
    let tensor = scope.require_tensor(name)?;
    let dims = convert_dimensions(tensor.dims());
    let operand_type = match scale {
        Some(scale) => OperandType::new(Precision::Int8, dims)
            .with_quantization(Quantization::PerLayer { scale }),
        None => OperandType::new(precision_of(tensor.precision()), dims),
    };
    Ok(operand_type.with_layout(layout_of(tensor.layout())))
}

/// Operand already mapped to `name`, or a new variable built from the tensor in `scope`.
pub fn resolve_input_operand(
    converter: &mut Converter,
    scope: &Scope,
    name: &str,
    scale: Option<f32>,
) -> Result<OperandId, BridgeError> {
    if let Some(id) = converter.get_operand(name) {
        return Ok(id);
    }
    let operand_type = tensor_operand_type(scope, name, scale)?;
    Ok(converter.add_variable_operand(operand_type, Some(name)))
}

/// Variable operand for the output tensor `name`.
pub fn add_output_operand(
    converter: &mut Converter,
    scope: &Scope,
    name: &str,
    scale: Option<f32>,
) -> Result<OperandId, BridgeError> {
    let operand_type = tensor_operand_type(scope, name, scale)?;
    Ok(converter.add_variable_operand(operand_type, Some(name)))
}
