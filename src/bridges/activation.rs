use log::warn;

use super::utility::{add_output_operand, resolve_input_operand};
use super::{Bridge, ConvertStatus};
use crate::converter::Converter;
use crate::error::BridgeError;
use crate::framework::{OpDesc, Scope};
use crate::graph::OperationType;

/// Lowers the elementwise activations.
pub struct ActivationBridge;

impl Bridge for ActivationBridge {
    fn op_types(&self) -> &'static [&'static str] {
        &["relu", "relu6", "sigmoid", "tanh", "leaky_relu"]
    }

    fn convert(
        &self,
        converter: &mut Converter,
        op: &OpDesc,
        scope: &Scope,
    ) -> Result<ConvertStatus, BridgeError> {
        let op_type = match op.op_type() {
            "relu" => OperationType::Relu,
            "relu6" => OperationType::Relu6,
            "sigmoid" => OperationType::Sigmoid,
            "tanh" => OperationType::Tanh,
            "leaky_relu" => OperationType::LeakyRelu,
            other => {
                warn!("`{other}` is not an elementwise activation");
                return Ok(ConvertStatus::UnsupportedFeature);
            }
        };
        let input_name = op.first_input("X")?;
        let output_name = op.first_output("Out")?;
        let input_scale = op.input_scale("X0_scale").map(|scales| scales[0]);
        let output_scale = op.output_scale("Out0_scale").map(|scales| scales[0]);
        let alpha = match op_type {
            OperationType::LeakyRelu => Some(op.attr::<f32>("alpha")?),
            _ => None,
        };
        scope.require_tensor(output_name)?;

        let input = resolve_input_operand(converter, scope, input_name, input_scale)?;
        let mut inputs = vec![input];
        if let Some(alpha) = alpha {
            inputs.push(converter.add_float32_scalar_operand(alpha));
        }
        let output = add_output_operand(converter, scope, output_name, output_scale)?;
        converter.add_operation(op_type, inputs, vec![output]);
        Ok(ConvertStatus::RebuildOnShapeChange)
    }
}
