use super::utility::{add_output_operand, resolve_input_operand};
use super::{Bridge, ConvertStatus};
use crate::converter::Converter;
use crate::error::BridgeError;
use crate::framework::{OpDesc, Scope};
use crate::graph::{OperationType, softmax};

pub struct SoftmaxBridge;

impl Bridge for SoftmaxBridge {
    fn op_types(&self) -> &'static [&'static str] {
        &["softmax"]
    }

    fn convert(
        &self,
        converter: &mut Converter,
        op: &OpDesc,
        scope: &Scope,
    ) -> Result<ConvertStatus, BridgeError> {
        let input_name = op.first_input("X")?;
        let output_name = op.first_output("Out")?;
        let input_scale = op.input_scale("X0_scale").map(|scales| scales[0]);
        let output_scale = op.output_scale("Out0_scale").map(|scales| scales[0]);
        let axis: i32 = op.attr_or("axis", -1)?;
        scope.require_tensor(output_name)?;

        let input = resolve_input_operand(converter, scope, input_name, input_scale)?;
        let mut inputs = vec![input; softmax::INPUT_COUNT];
        inputs[softmax::AXIS] = converter.add_int32_scalar_operand(axis);
        let output = add_output_operand(converter, scope, output_name, output_scale)?;
        converter.add_operation(OperationType::Softmax, inputs, vec![output]);
        Ok(ConvertStatus::RebuildOnShapeChange)
    }
}
