use log::warn;

use super::utility::resolve_input_operand;
use super::{Bridge, ConvertStatus};
use crate::converter::Converter;
use crate::error::BridgeError;
use crate::framework::{OpDesc, Scope};
use crate::graph::{OperandType, OperationType, Quantization, arg_min_max};
use crate::types::{convert_dimensions, precision_of_var_type};

/// Framework dtype code for int64, used when `dtype` is left unset.
const DEFAULT_DTYPE: i32 = 3;

/// Lowers `arg_max` and `arg_min`.
pub struct ArgMinMaxBridge;

impl Bridge for ArgMinMaxBridge {
    fn op_types(&self) -> &'static [&'static str] {
        &["arg_max", "arg_min"]
    }

    fn convert(
        &self,
        converter: &mut Converter,
        op: &OpDesc,
        scope: &Scope,
    ) -> Result<ConvertStatus, BridgeError> {
        let op_type = match op.op_type() {
            "arg_max" => OperationType::ArgMax,
            "arg_min" => OperationType::ArgMin,
            other => {
                warn!("`{other}` is neither arg_max nor arg_min");
                return Ok(ConvertStatus::UnsupportedFeature);
            }
        };

        let input_name = op.first_input("X")?;
        let output_name = op.first_output("Out")?;
        let output_dims = scope.require_tensor(output_name)?.dims();
        let axis: i32 = op.attr("axis")?;
        let keepdim: bool = op.attr("keepdims")?;
        let dtype = match op.attr_or::<i32>("dtype", -1)? {
            code if code < 0 => DEFAULT_DTYPE,
            code => code,
        };
        let output_precision = precision_of_var_type(dtype);

        let input = resolve_input_operand(converter, scope, input_name, None)?;
        let mut inputs = vec![input; arg_min_max::INPUT_COUNT];
        inputs[arg_min_max::AXIS] = converter.add_int32_scalar_operand(axis);
        inputs[arg_min_max::KEEPDIM] = converter.add_bool8_scalar_operand(keepdim);
        inputs[arg_min_max::DTYPE] = converter
            .add_int32_scalar_operand(output_precision.code(&Quantization::None).raw());

        let output = converter.add_variable_operand(
            OperandType::new(output_precision, convert_dimensions(output_dims)),
            Some(output_name),
        );
        converter.add_operation(op_type, inputs, vec![output]);
        Ok(ConvertStatus::Success)
    }
}
