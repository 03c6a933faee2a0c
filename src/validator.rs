use std::collections::{HashMap, HashSet};

use crate::error::GraphError;
use crate::graph::{Dim, Operand, OperandGraph, OperandId, OperandKind, Operation};

#[derive(Debug, Clone)]
pub struct ContextProperties {
    pub tensor_byte_length_limit: usize,
}

impl Default for ContextProperties {
    fn default() -> Self {
        Self {
            tensor_byte_length_limit: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug)]
pub struct ValidationArtifacts {
    /// Named variables no operation produces, in operand order.
    pub input_names: Vec<String>,
    /// Named variables produced but never consumed, in operand order.
    pub output_names: Vec<String>,
    pub operand_to_dependent_operations: HashMap<u32, Vec<String>>,
    pub operand_to_producing_operation: HashMap<u32, String>,
}

/// Structural checks over a lowered [`OperandGraph`].
pub struct GraphValidator<'a> {
    graph: &'a OperandGraph,
    context: ContextProperties,
    processed_operands: HashSet<u32>,
    operand_to_dependents: HashMap<u32, Vec<String>>,
    operand_to_producer: HashMap<u32, String>,
}

impl<'a> GraphValidator<'a> {
    pub fn new(graph: &'a OperandGraph, context: ContextProperties) -> Self {
        Self {
            graph,
            context,
            processed_operands: HashSet::new(),
            operand_to_dependents: HashMap::new(),
            operand_to_producer: HashMap::new(),
        }
    }

    pub fn validate(mut self) -> Result<ValidationArtifacts, GraphError> {
        if self.graph.operands().is_empty() || self.graph.operations().is_empty() {
            return Err(GraphError::EmptyGraph);
        }

        let produced: HashSet<OperandId> = self
            .graph
            .operations()
            .iter()
            .flat_map(|operation| operation.outputs.iter().copied())
            .collect();

        let mut input_names = Vec::new();
        for (idx, operand) in self.graph.operands().iter().enumerate() {
            let operand_id = idx as u32;
            let operand_type = &operand.operand_type;
            let has_dynamic = operand_type.dimensions.contains(&Dim::Dynamic);
            let byte_length = operand_type.byte_length();
            if byte_length.is_none() && !has_dynamic {
                return Err(GraphError::OperandElementCountOverflow {
                    operand: operand_id,
                });
            }
            if let Some(byte_length) = byte_length
                && byte_length > self.context.tensor_byte_length_limit
            {
                return Err(GraphError::TensorLimit {
                    operand: operand_id,
                    byte_length,
                    limit: self.context.tensor_byte_length_limit,
                });
            }

            match operand.kind {
                OperandKind::Constant => {
                    let expected = byte_length.ok_or(GraphError::OperandElementCountOverflow {
                        operand: operand_id,
                    })?;
                    let actual = operand.value.as_ref().map_or(0, |value| value.data.len());
                    if actual != expected {
                        return Err(GraphError::ConstantLengthMismatch {
                            operand: operand_id,
                            expected,
                            actual,
                        });
                    }
                    self.processed_operands.insert(operand_id);
                }
                OperandKind::Variable => {
                    if let Some(name) = &operand.name
                        && !produced.contains(&OperandId(operand_id))
                    {
                        input_names.push(name.clone());
                        self.processed_operands.insert(operand_id);
                    }
                }
            }
        }

        self.validate_operations()?;

        let output_names = self
            .graph
            .operands()
            .iter()
            .enumerate()
            .filter(|(idx, operand)| {
                let operand_id = *idx as u32;
                operand.kind == OperandKind::Variable
                    && self.operand_to_producer.contains_key(&operand_id)
                    && !self.operand_to_dependents.contains_key(&operand_id)
            })
            .filter_map(|(_, operand)| operand.name.clone())
            .collect();

        Ok(ValidationArtifacts {
            input_names,
            output_names,
            operand_to_dependent_operations: self.operand_to_dependents,
            operand_to_producing_operation: self.operand_to_producer,
        })
    }

    fn validate_operations(&mut self) -> Result<(), GraphError> {
        let graph = self.graph;
        for (index, operation) in graph.operations().iter().enumerate() {
            Self::validate_arity(index, operation)?;
            let op_name = operation.display_name();
            for &input_id in &operation.inputs {
                self.check_reference(index, operation, input_id)?;
                if !self.processed_operands.contains(&input_id.0) {
                    return Err(GraphError::OperandNotReady {
                        operation: index,
                        op_type: operation.op_type,
                        operand: input_id.0,
                    });
                }
                self.operand_to_dependents
                    .entry(input_id.0)
                    .or_default()
                    .push(op_name.clone());
            }

            for &output_id in &operation.outputs {
                let operand = self.check_reference(index, operation, output_id)?;
                if operand.kind == OperandKind::Constant {
                    return Err(GraphError::ConstantProduced {
                        operation: index,
                        op_type: operation.op_type,
                        operand: output_id.0,
                    });
                }
                if self.processed_operands.contains(&output_id.0) {
                    return Err(GraphError::OperandProducedTwice {
                        operation: index,
                        op_type: operation.op_type,
                        operand: output_id.0,
                    });
                }
                self.operand_to_producer.insert(output_id.0, op_name.clone());
                self.processed_operands.insert(output_id.0);
            }
        }
        Ok(())
    }

    fn validate_arity(index: usize, operation: &Operation) -> Result<(), GraphError> {
        let (expected_inputs, expected_outputs) = operation.op_type.arity();
        if operation.inputs.len() != expected_inputs || operation.outputs.len() != expected_outputs
        {
            return Err(GraphError::ArityMismatch {
                operation: index,
                op_type: operation.op_type,
                expected_inputs,
                expected_outputs,
                inputs: operation.inputs.len(),
                outputs: operation.outputs.len(),
            });
        }
        Ok(())
    }

    fn check_reference(
        &self,
        index: usize,
        operation: &Operation,
        id: OperandId,
    ) -> Result<&'a Operand, GraphError> {
        self.graph
            .operand(id)
            .ok_or(GraphError::InvalidOperandReference {
                operation: index,
                op_type: operation.op_type,
                operand: id.0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridges::BridgeRegistry;
    use crate::framework::{OpDesc, PrecisionType, Scope, Subgraph, Tensor};
    use crate::graph::{ConstantData, OperandType, OperationType, Precision};

    fn variable(name: Option<&str>, dims: Vec<Dim>) -> Operand {
        Operand {
            kind: OperandKind::Variable,
            operand_type: OperandType::new(Precision::Float32, dims),
            name: name.map(str::to_string),
            value: None,
        }
    }

    fn constant(dims: Vec<Dim>, data: Vec<u8>) -> Operand {
        Operand {
            kind: OperandKind::Constant,
            operand_type: OperandType::new(Precision::Float32, dims),
            name: None,
            value: Some(ConstantData {
                data,
                persistent: false,
            }),
        }
    }

    fn relu_graph() -> OperandGraph {
        let mut graph = OperandGraph::default();
        let x = graph.push_operand(variable(Some("x"), vec![Dim::Fixed(4)]));
        let y = graph.push_operand(variable(Some("y"), vec![Dim::Fixed(4)]));
        graph.push_operation(Operation {
            op_type: OperationType::Relu,
            inputs: vec![x],
            outputs: vec![y],
        });
        graph
    }

    fn validate(graph: &OperandGraph) -> Result<ValidationArtifacts, GraphError> {
        GraphValidator::new(graph, ContextProperties::default()).validate()
    }

    #[test]
    fn test_bridge_output_validates() {
        let subgraph = Subgraph {
            ops: vec![
                OpDesc::new("conv2d")
                    .with_input("Input", "x")
                    .with_input("Filter", "w")
                    .with_output("Output", "c")
                    .with_attr("strides", vec![1, 1])
                    .with_attr("paddings", vec![0, 0])
                    .with_attr("groups", 1)
                    .with_attr("dilations", vec![1, 1])
                    .with_attr("padding_algorithm", "SAME"),
                OpDesc::new("softmax")
                    .with_input("X", "c")
                    .with_output("Out", "y")
                    .with_attr("axis", 1),
            ],
            scope: Scope::default()
                .with_tensor("x", Tensor::placeholder(vec![1, 2, 4, 4], PrecisionType::Float))
                .with_tensor("w", Tensor::from_f32(vec![3, 2, 1, 1], vec![1.0; 6]))
                .with_tensor("c", Tensor::placeholder(vec![1, 3, 4, 4], PrecisionType::Float))
                .with_tensor("y", Tensor::placeholder(vec![1, 3, 4, 4], PrecisionType::Float)),
        };
        let lowered = BridgeRegistry::with_defaults().lower(&subgraph).unwrap();
        let artifacts = validate(&lowered.graph).unwrap();
        assert_eq!(artifacts.input_names, vec!["x".to_string()]);
        assert_eq!(artifacts.output_names, vec!["y".to_string()]);
        assert_eq!(artifacts.operand_to_producing_operation.len(), 2);
    }

    #[test]
    fn test_empty_graph_fails() {
        let result = validate(&OperandGraph::default());
        assert!(matches!(result, Err(GraphError::EmptyGraph)));
    }

    #[test]
    fn test_constant_length_mismatch_fails() {
        let mut graph = relu_graph();
        graph.push_operand(constant(vec![Dim::Fixed(2)], vec![0; 4]));
        let result = validate(&graph);
        assert!(matches!(
            result,
            Err(GraphError::ConstantLengthMismatch {
                operand: 2,
                expected: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_tensor_byte_limit_exceeded_fails() {
        let graph = relu_graph();
        let context = ContextProperties {
            tensor_byte_length_limit: 8,
        };
        let result = GraphValidator::new(&graph, context).validate();
        assert!(matches!(
            result,
            Err(GraphError::TensorLimit {
                byte_length: 16,
                limit: 8,
                ..
            })
        ));
    }

    #[test]
    fn test_dynamic_variables_skip_the_byte_limit() {
        let mut graph = OperandGraph::default();
        let x = graph.push_operand(variable(Some("x"), vec![Dim::Dynamic, Dim::Fixed(4)]));
        let y = graph.push_operand(variable(Some("y"), vec![Dim::Dynamic, Dim::Fixed(4)]));
        graph.push_operation(Operation {
            op_type: OperationType::Tanh,
            inputs: vec![x],
            outputs: vec![y],
        });
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn test_invalid_operand_reference_fails() {
        let mut graph = relu_graph();
        graph.push_operation(Operation {
            op_type: OperationType::Sigmoid,
            inputs: vec![OperandId(42)],
            outputs: vec![OperandId(1)],
        });
        let result = validate(&graph);
        assert!(matches!(
            result,
            Err(GraphError::InvalidOperandReference {
                operation: 1,
                operand: 42,
                ..
            })
        ));
    }

    #[test]
    fn test_operand_not_ready_fails() {
        let mut graph = OperandGraph::default();
        let hidden = graph.push_operand(variable(None, vec![Dim::Fixed(4)]));
        let y = graph.push_operand(variable(Some("y"), vec![Dim::Fixed(4)]));
        graph.push_operation(Operation {
            op_type: OperationType::Relu,
            inputs: vec![hidden],
            outputs: vec![y],
        });
        let result = validate(&graph);
        assert!(matches!(
            result,
            Err(GraphError::OperandNotReady { operand: 0, .. })
        ));
    }

    #[test]
    fn test_operand_produced_twice_fails() {
        let mut graph = relu_graph();
        graph.push_operation(Operation {
            op_type: OperationType::Relu6,
            inputs: vec![OperandId(0)],
            outputs: vec![OperandId(1)],
        });
        let result = validate(&graph);
        assert!(matches!(
            result,
            Err(GraphError::OperandProducedTwice {
                operation: 1,
                operand: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_constant_produced_fails() {
        let mut graph = relu_graph();
        let weight = graph.push_operand(constant(vec![Dim::Fixed(4)], vec![0; 16]));
        graph.push_operation(Operation {
            op_type: OperationType::Tanh,
            inputs: vec![OperandId(1)],
            outputs: vec![weight],
        });
        let result = validate(&graph);
        assert!(matches!(result, Err(GraphError::ConstantProduced { .. })));
    }

    #[test]
    fn test_arity_mismatch_fails() {
        let mut graph = relu_graph();
        let alpha = graph.push_operand(constant(vec![], vec![0; 4]));
        let z = graph.push_operand(variable(Some("z"), vec![Dim::Fixed(4)]));
        graph.push_operation(Operation {
            op_type: OperationType::Relu,
            inputs: vec![OperandId(1), alpha],
            outputs: vec![z],
        });
        let result = validate(&graph);
        assert!(matches!(
            result,
            Err(GraphError::ArityMismatch {
                op_type: OperationType::Relu,
                expected_inputs: 1,
                inputs: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_context_properties_default() {
        let context = ContextProperties::default();
        assert_eq!(context.tensor_byte_length_limit, 256 * 1024 * 1024);
    }

    #[test]
    fn test_validation_artifacts_created() {
        let artifacts = validate(&relu_graph()).unwrap();
        assert_eq!(artifacts.input_names, vec!["x".to_string()]);
        assert_eq!(artifacts.output_names, vec!["y".to_string()]);
        assert_eq!(
            artifacts.operand_to_dependent_operations.get(&0),
            Some(&vec!["Relu".to_string()])
        );
        assert_eq!(
            artifacts.operand_to_producing_operation.get(&1),
            Some(&"Relu".to_string())
        );
    }
}
