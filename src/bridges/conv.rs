use log::{debug, warn};

use super::utility::{
    PaddingAlgorithm, expand_paddings, has_input, is_per_channel_scales, quantize_i32,
    update_padding_and_dilation,
};
use super::{Bridge, ConvertStatus};
use crate::converter::{Converter, QuantScale};
use crate::error::BridgeError;
use crate::framework::{OpDesc, Scope};
use crate::graph::{
    FuseCode, OperandId, OperandType, OperationType, Precision, Quantization, conv2d,
};
use crate::types::{convert_dimensions, layout_of};

/// Lowers `conv2d` and `depthwise_conv2d` to `CONV_2D`.
pub struct Conv2dBridge;

/// Operands of one `CONV_2D`, in the order the HAL expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dInputs {
    pub input: OperandId,
    pub filter: OperandId,
    pub bias: OperandId,
    pub auto_pad: OperandId,
    pub pads: OperandId,
    pub strides: OperandId,
    pub group: OperandId,
    pub dilations: OperandId,
    pub fuse_code: OperandId,
}

impl Conv2dInputs {
    pub fn into_operands(self) -> Vec<OperandId> {
        let mut operands = vec![self.input; conv2d::INPUT_COUNT];
        operands[conv2d::FILTER] = self.filter;
        operands[conv2d::BIAS] = self.bias;
        operands[conv2d::AUTO_PAD] = self.auto_pad;
        operands[conv2d::PADS] = self.pads;
        operands[conv2d::STRIDES] = self.strides;
        operands[conv2d::GROUP] = self.group;
        operands[conv2d::DILATIONS] = self.dilations;
        operands[conv2d::FUSE_CODE] = self.fuse_code;
        operands
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Activation {
    None,
    Fused(FuseCode),
    /// Emitted as a separate `LEAKY_RELU` after the convolution.
    LeakyRelu { alpha: f32 },
}

impl Activation {
    fn fuse_code(self) -> FuseCode {
        match self {
            Activation::Fused(code) => code,
            Activation::None | Activation::LeakyRelu { .. } => FuseCode::None,
        }
    }
}

/// `None` when the activation can be neither fused nor split off.
fn plan_activation(op: &OpDesc) -> Result<Option<Activation>, BridgeError> {
    let with_act: bool = op.attr_or("with_act", false)?;
    let mut act_type = if with_act {
        op.attr::<String>("act_type")?
    } else {
        String::new()
    };
    if op.attr_or("fuse_relu", false)? {
        assert!(
            !with_act || act_type == "relu",
            "conflict between `fuse_relu` and `with_act` with act_type `{act_type}`"
        );
        act_type = "relu".to_string();
    }

    let activation = match act_type.as_str() {
        "" => Activation::None,
        "relu" => Activation::Fused(FuseCode::Relu),
        "relu1" => Activation::Fused(FuseCode::Relu1),
        "relu6" => Activation::Fused(FuseCode::Relu6),
        "leaky_relu" => Activation::LeakyRelu {
            alpha: op.attr("leaky_relu_alpha")?,
        },
        other => {
            warn!("activation `{other}` cannot be fused into {}", op.op_type());
            return Ok(None);
        }
    };
    Ok(Some(activation))
}

enum FilterValues<'a> {
    Float(&'a [f32]),
    Quant(&'a [i8]),
}

/// Float32 or, with a scale, per-layer quant8 operand type for conv activations.
fn activation_operand_type(dims: &[i64], scale: Option<f32>) -> OperandType {
    let dims = convert_dimensions(dims);
    match scale {
        Some(scale) => OperandType::new(Precision::Int8, dims)
            .with_quantization(Quantization::PerLayer { scale }),
        None => OperandType::new(Precision::Float32, dims),
    }
}

fn tensor_data(name: &str, expected: &'static str) -> BridgeError {
    BridgeError::TensorData {
        name: name.to_string(),
        expected,
    }
}

impl Bridge for Conv2dBridge {
    fn op_types(&self) -> &'static [&'static str] {
        &["conv2d", "depthwise_conv2d"]
    }

    fn convert(
        &self,
        converter: &mut Converter,
        op: &OpDesc,
        scope: &Scope,
    ) -> Result<ConvertStatus, BridgeError> {
        let input_name = op.first_input("Input")?;
        let filter_name = op.first_input("Filter")?;
        let output_name = op.first_output("Output")?;
        let input_tensor = scope.require_tensor(input_name)?;
        let input_dims = input_tensor.dims();
        let filter_tensor = scope.require_tensor(filter_name)?;
        let filter_dims = filter_tensor.dims();
        let output_tensor = scope.require_tensor(output_name)?;
        let output_dims = output_tensor.dims();
        assert_eq!(input_dims.len(), 4, "conv input must be 4-D, got {input_dims:?}");
        assert_eq!(filter_dims.len(), 4, "conv filter must be 4-D, got {filter_dims:?}");
        assert_eq!(output_dims.len(), 4, "conv output must be 4-D, got {output_dims:?}");
        let output_channels = filter_dims[0];
        assert_eq!(output_dims[0], input_dims[0], "conv output batch differs from input");
        assert_eq!(output_dims[1], output_channels, "conv output channels differ from filter");

        let input_scale = op.input_scale("Input0_scale").map(|scales| scales[0]);
        let filter_scales = op.input_scale("Filter0_scale");
        let output_scale = op.output_scale("Output0_scale").map(|scales| scales[0]);

        let strides: Vec<i32> = op.attr("strides")?;
        let mut paddings = expand_paddings(op.attr("paddings")?);
        let groups: i32 = op.attr("groups")?;
        let mut dilations: Vec<i32> = op.attr("dilations")?;
        assert_eq!(strides.len(), 2, "conv strides must have two values");
        assert_eq!(dilations.len(), 2, "conv dilations must have two values");
        assert!(
            strides.iter().all(|&stride| stride > 0),
            "conv strides must be positive, got {strides:?}"
        );
        assert_eq!(
            paddings.len(),
            4,
            "conv paddings must have one or two values per spatial axis"
        );

        let algorithm_name: String = op.attr_or("padding_algorithm", String::new())?;
        let Some(algorithm) = PaddingAlgorithm::parse(&algorithm_name) else {
            warn!("unsupported padding algorithm `{algorithm_name}`");
            return Ok(ConvertStatus::UnsupportedFeature);
        };
        update_padding_and_dilation(
            &mut paddings,
            &mut dilations,
            &strides,
            algorithm,
            input_dims,
            filter_dims,
        );

        let Some(activation) = plan_activation(op)? else {
            return Ok(ConvertStatus::UnsupportedFeature);
        };
        if matches!(activation, Activation::LeakyRelu { .. }) && output_scale.is_some() {
            warn!("cannot split a fused leaky_relu off a quantized {}", op.op_type());
            return Ok(ConvertStatus::UnsupportedFeature);
        }

        let depthwise = groups != 1
            && input_dims[1] == groups as i64
            && filter_dims[1] == 1
            && output_channels % groups as i64 == 0;
        debug!("depthwise mode: {depthwise}");

        let per_channel = filter_scales.is_some_and(is_per_channel_scales);
        let filter_values = if filter_scales.is_some() {
            FilterValues::Quant(
                filter_tensor
                    .data_i8()
                    .ok_or_else(|| tensor_data(filter_name, "int8"))?,
            )
        } else {
            FilterValues::Float(
                filter_tensor
                    .data_f32()
                    .ok_or_else(|| tensor_data(filter_name, "float32"))?,
            )
        };

        let bias_values = if has_input(op, scope, "Bias") {
            let bias_name = op.first_input("Bias")?;
            let bias = scope.require_tensor(bias_name)?;
            let dims = bias.dims();
            assert!(
                dims == [output_channels] || dims == [1, output_channels],
                "conv bias must be [C_out] or [1, C_out], got {dims:?}"
            );
            Some(
                bias.data_f32()
                    .ok_or_else(|| tensor_data(bias_name, "float32"))?,
            )
        } else {
            None
        };

        let input = match converter.get_operand(input_name) {
            Some(id) => id,
            None => converter.add_variable_operand(
                activation_operand_type(input_dims, input_scale)
                    .with_layout(layout_of(input_tensor.layout())),
                Some(input_name),
            ),
        };

        let filter = match filter_values {
            FilterValues::Float(values) => {
                converter.add_float32_constant_operand(values, filter_dims, true)
            }
            FilterValues::Quant(values) => {
                let scales = filter_scales.unwrap_or_default();
                let scale = if per_channel {
                    QuantScale::PerChannel(scales)
                } else {
                    QuantScale::PerLayer(scales[0])
                };
                converter.add_quant8_constant_operand(values, filter_dims, scale, true)
            }
        };

        let bias_dims = [output_channels];
        let bias = match (input_scale, filter_scales) {
            (Some(input_scale), Some(filter_scales)) => {
                let bias_scales: Vec<f32> =
                    filter_scales.iter().map(|scale| input_scale * scale).collect();
                let values = match bias_values {
                    Some(values) => quantize_i32(values, &bias_scales),
                    None => vec![0; output_channels as usize],
                };
                let scale = if per_channel {
                    QuantScale::PerChannel(&bias_scales)
                } else {
                    QuantScale::PerLayer(bias_scales[0])
                };
                converter.add_quant32_constant_operand(&values, &bias_dims, scale)
            }
            _ => match bias_values {
                Some(values) => converter.add_float32_constant_operand(values, &bias_dims, true),
                None => converter.add_float32_constant_operand(
                    &vec![0.0; output_channels as usize],
                    &bias_dims,
                    false,
                ),
            },
        };

        let auto_pad = converter.add_int32_scalar_operand(algorithm.auto_pad_code() as i32);
        let pads = converter.add_int32_constant_operand(&paddings, &[paddings.len() as i64]);
        let strides = converter.add_int32_constant_operand(&strides, &[strides.len() as i64]);
        let group = converter.add_int32_scalar_operand(groups);
        let dilations =
            converter.add_int32_constant_operand(&dilations, &[dilations.len() as i64]);
        let fuse_code = converter.add_int32_scalar_operand(activation.fuse_code() as i32);

        let output_layout = layout_of(output_tensor.layout());
        let output = converter.add_variable_operand(
            activation_operand_type(output_dims, output_scale).with_layout(output_layout),
            Some(output_name),
        );
        let conv_output = match activation {
            Activation::LeakyRelu { .. } => converter.add_variable_operand(
                activation_operand_type(output_dims, None).with_layout(output_layout),
                None,
            ),
            Activation::None | Activation::Fused(_) => output,
        };

        let inputs = Conv2dInputs {
            input,
            filter,
            bias,
            auto_pad,
            pads,
            strides,
            group,
            dilations,
            fuse_code,
        };
        converter.add_operation(OperationType::Conv2d, inputs.into_operands(), vec![conv_output]);

        if let Activation::LeakyRelu { alpha } = activation {
            debug!("splitting leaky_relu off {}", op.op_type());
            let alpha = converter.add_float32_scalar_operand(alpha);
            converter.add_operation(OperationType::LeakyRelu, vec![conv_output, alpha], vec![output]);
        }

        Ok(ConvertStatus::RebuildOnShapeChange)
    }
}
