//! Operand and operation creation for one subgraph conversion.
//!
//! A [`Converter`] owns the [`OperandGraph`] under construction together with
//! the name → operand memo. Named variable operands are deduplicated: asking
//! for a name twice returns the same [`OperandId`].

use std::collections::HashMap;

use log::debug;

use crate::graph::{
    ConstantData, Dim, Operand, OperandGraph, OperandId, OperandKind, OperandType,
    Operation, OperationType, Precision, Quantization,
};
use crate::types::{convert_dimensions, operand_type_compatible};

/// Scale of a quantized constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantScale<'a> {
    PerLayer(f32),
    /// One scale per slice of the leading dimension.
    PerChannel(&'a [f32]),
}

impl QuantScale<'_> {
    fn into_quantization(self) -> Quantization {
        match self {
            QuantScale::PerLayer(scale) => Quantization::PerLayer { scale },
            QuantScale::PerChannel(scales) => Quantization::PerChannel {
                scales: scales.to_vec(),
                channel_dim: 0,
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct Converter {
    graph: OperandGraph,
    operands: HashMap<String, OperandId>,
}

impl Converter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &OperandGraph {
        &self.graph
    }

    /// Ends the conversion and hands the graph over.
    pub fn finish(self) -> OperandGraph {
        self.graph
    }

    pub fn has_operand(&self, name: &str) -> bool {
        self.operands.contains_key(name)
    }

    pub fn get_operand(&self, name: &str) -> Option<OperandId> {
        self.operands.get(name).copied()
    }

    pub fn operand_type(&self, id: OperandId) -> &OperandType {
        &self.operand(id).operand_type
    }

    fn operand(&self, id: OperandId) -> &Operand {
        self.graph
            .operand(id)
            .unwrap_or_else(|| panic!("operand {id} does not belong to this converter"))
    }

    /// Creates a variable operand, or returns the one already registered under `name`.
    ///
    /// Reusing a name with an incompatible type panics.
    pub fn add_variable_operand(
        &mut self,
        operand_type: OperandType,
        name: Option<&str>,
    ) -> OperandId {
        if let Some(name) = name
            && let Some(id) = self.get_operand(name)
        {
            let existing = self.operand_type(id);
            assert!(
                operand_type_compatible(existing, &operand_type),
                "operand `{name}` already exists as {existing:?}, cannot reuse it as {operand_type:?}"
            );
            debug!("reusing operand {id} for `{name}`");
            return id;
        }

        let id = self.graph.push_operand(Operand {
            kind: OperandKind::Variable,
            operand_type,
            name: name.map(str::to_string),
            value: None,
        });
        if let Some(name) = name {
            self.operands.insert(name.to_string(), id);
        }
        debug!("added variable operand {id} ({name:?})");
        id
    }

    pub fn add_float32_variable_operand(&mut self, dims: &[i64], name: Option<&str>) -> OperandId {
        self.add_variable_operand(
            OperandType::new(Precision::Float32, convert_dimensions(dims)),
            name,
        )
    }

    pub fn add_quant8_variable_operand(
        &mut self,
        dims: &[i64],
        scale: f32,
        name: Option<&str>,
    ) -> OperandId {
        self.add_variable_operand(
            OperandType::new(Precision::Int8, convert_dimensions(dims))
                .with_quantization(Quantization::PerLayer { scale }),
            name,
        )
    }

    /// Embeds `data` as an anonymous constant operand.
    ///
    /// `data` must hold exactly the bytes described by `operand_type`, whose
    /// dimensions must all be fixed.
    pub fn add_constant_operand(
        &mut self,
        data: Vec<u8>,
        operand_type: OperandType,
        persistent: bool,
    ) -> OperandId {
        let expected = operand_type.byte_length().unwrap_or_else(|| {
            panic!(
                "constant operand needs fixed dimensions, got {:?}",
                operand_type.dimensions
            )
        });
        assert_eq!(
            data.len(),
            expected,
            "constant data length does not match {operand_type:?}"
        );
        if let Quantization::PerChannel {
            scales,
            channel_dim,
        } = &operand_type.quantization
        {
            let channels = match operand_type.dimensions.get(*channel_dim as usize) {
                Some(Dim::Fixed(value)) => *value as usize,
                _ => panic!("per-channel quantization axis {channel_dim} is out of range"),
            };
            assert_eq!(
                scales.len(),
                channels,
                "per-channel scale count must match the channel dimension"
            );
        }

        let id = self.graph.push_operand(Operand {
            kind: OperandKind::Constant,
            operand_type,
            name: None,
            value: Some(ConstantData { data, persistent }),
        });
        debug!("added constant operand {id}");
        id
    }

    pub fn add_float32_constant_operand(
        &mut self,
        values: &[f32],
        dims: &[i64],
        persistent: bool,
    ) -> OperandId {
        self.add_constant_operand(
            values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            OperandType::new(Precision::Float32, convert_dimensions(dims)),
            persistent,
        )
    }

    pub fn add_int32_constant_operand(&mut self, values: &[i32], dims: &[i64]) -> OperandId {
        self.add_constant_operand(
            values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            OperandType::new(Precision::Int32, convert_dimensions(dims)),
            false,
        )
    }

    pub fn add_int32_scalar_operand(&mut self, value: i32) -> OperandId {
        self.add_constant_operand(
            value.to_le_bytes().to_vec(),
            OperandType::new(Precision::Int32, vec![]),
            false,
        )
    }

    pub fn add_float32_scalar_operand(&mut self, value: f32) -> OperandId {
        self.add_constant_operand(
            value.to_le_bytes().to_vec(),
            OperandType::new(Precision::Float32, vec![]),
            false,
        )
    }

    pub fn add_bool8_scalar_operand(&mut self, value: bool) -> OperandId {
        self.add_constant_operand(
            vec![u8::from(value)],
            OperandType::new(Precision::Bool8, vec![]),
            false,
        )
    }

    pub fn add_quant8_constant_operand(
        &mut self,
        values: &[i8],
        dims: &[i64],
        scale: QuantScale<'_>,
        persistent: bool,
    ) -> OperandId {
        self.add_constant_operand(
            values.iter().map(|v| *v as u8).collect(),
            OperandType::new(Precision::Int8, convert_dimensions(dims))
                .with_quantization(scale.into_quantization()),
            persistent,
        )
    }

    pub fn add_quant32_constant_operand(
        &mut self,
        values: &[i32],
        dims: &[i64],
        scale: QuantScale<'_>,
    ) -> OperandId {
        self.add_constant_operand(
            values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            OperandType::new(Precision::Int32, convert_dimensions(dims))
                .with_quantization(scale.into_quantization()),
            false,
        )
    }

    /// Appends an operation. Operand order and arity are the caller's contract.
    pub fn add_operation(
        &mut self,
        op_type: OperationType,
        inputs: Vec<OperandId>,
        outputs: Vec<OperandId>,
    ) {
        for id in inputs.iter().chain(&outputs) {
            self.operand(*id);
        }
        debug!("added operation {op_type:?} {inputs:?} -> {outputs:?}");
        self.graph.push_operation(Operation {
            op_type,
            inputs,
            outputs,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Layout, PrecisionCode};

    #[test]
    fn named_variables_are_deduplicated() {
        let mut converter = Converter::new();
        let first = converter.add_float32_variable_operand(&[1, 3, 8, 8], Some("x"));
        let second = converter.add_float32_variable_operand(&[1, 3, 8, 8], Some("x"));
        assert_eq!(first, second);
        assert_eq!(converter.get_operand("x"), Some(first));
        assert_eq!(converter.graph().operands().len(), 1);
    }

    #[test]
    fn dynamic_dims_accept_concrete_reuse() {
        let mut converter = Converter::new();
        let first = converter.add_float32_variable_operand(&[-1, 16], Some("x"));
        let second = converter.add_float32_variable_operand(&[4, 16], Some("x"));
        assert_eq!(first, second);
    }

    #[test]
    #[should_panic(expected = "cannot reuse")]
    fn incompatible_reuse_is_fatal() {
        let mut converter = Converter::new();
        converter.add_float32_variable_operand(&[1, 16], Some("x"));
        converter.add_float32_variable_operand(&[1, 8], Some("x"));
    }

    #[test]
    #[should_panic(expected = "cannot reuse")]
    fn layout_mismatch_blocks_reuse() {
        let mut converter = Converter::new();
        let dims = convert_dimensions(&[1, 3, 8, 8]);
        converter.add_variable_operand(
            OperandType::new(Precision::Float32, dims.clone()).with_layout(Layout::Nhwc),
            Some("x"),
        );
        converter.add_variable_operand(OperandType::new(Precision::Float32, dims), Some("x"));
    }

    #[test]
    #[should_panic(expected = "cannot reuse")]
    fn precision_mismatch_blocks_reuse() {
        let mut converter = Converter::new();
        converter.add_float32_variable_operand(&[1, 4], Some("x"));
        converter.add_quant8_variable_operand(&[1, 4], 0.5, Some("x"));
    }

    #[test]
    fn anonymous_variables_are_always_fresh() {
        let mut converter = Converter::new();
        let a = converter.add_float32_variable_operand(&[2], None);
        let b = converter.add_float32_variable_operand(&[2], None);
        assert_ne!(a, b);
        assert!(!converter.has_operand(""));
    }

    #[test]
    fn constants_are_little_endian() {
        let mut converter = Converter::new();
        let id = converter.add_int32_constant_operand(&[1, -1], &[2]);
        let operand = converter.graph().operand(id).unwrap();
        assert_eq!(operand.kind, OperandKind::Constant);
        assert_eq!(
            operand.value.as_ref().unwrap().data,
            vec![1, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]
        );

        let flag = converter.add_bool8_scalar_operand(true);
        assert_eq!(converter.operand_type(flag).code(), PrecisionCode::Bool8);
        assert!(converter.operand_type(flag).dimensions.is_empty());
    }

    #[test]
    fn per_channel_constants_carry_scales() {
        let mut converter = Converter::new();
        let scales = [0.1, 0.2];
        let id = converter.add_quant8_constant_operand(
            &[1, 2, 3, 4],
            &[2, 2],
            QuantScale::PerChannel(&scales),
            true,
        );
        let operand_type = converter.operand_type(id);
        assert_eq!(operand_type.code(), PrecisionCode::QuantInt8SymmPerChannel);
        assert_eq!(
            operand_type.quantization,
            Quantization::PerChannel {
                scales: vec![0.1, 0.2],
                channel_dim: 0
            }
        );
        assert!(converter.graph().operand(id).unwrap().value.as_ref().unwrap().persistent);
    }

    #[test]
    #[should_panic(expected = "per-channel scale count")]
    fn per_channel_scale_count_must_match() {
        let mut converter = Converter::new();
        converter.add_quant32_constant_operand(&[1, 2, 3], &[3], QuantScale::PerChannel(&[0.5, 1.0]));
    }

    #[test]
    #[should_panic(expected = "constant data length")]
    fn constant_length_must_match_dims() {
        let mut converter = Converter::new();
        converter.add_float32_constant_operand(&[1.0, 2.0], &[3], false);
    }

    #[test]
    #[should_panic(expected = "is malformed")]
    fn wide_constant_dims_are_fatal() {
        let mut converter = Converter::new();
        converter.add_float32_constant_operand(&[1.0], &[(1 << 32) + 1], false);
    }

    #[test]
    #[should_panic(expected = "is malformed")]
    fn zero_constant_dims_are_fatal() {
        let mut converter = Converter::new();
        converter.add_float32_constant_operand(&[], &[0, 4], false);
    }

    #[test]
    fn operations_keep_operand_order() {
        let mut converter = Converter::new();
        let x = converter.add_float32_variable_operand(&[4], Some("x"));
        let alpha = converter.add_float32_scalar_operand(0.1);
        let y = converter.add_float32_variable_operand(&[4], Some("y"));
        converter.add_operation(OperationType::LeakyRelu, vec![x, alpha], vec![y]);

        let graph = converter.finish();
        let operation = &graph.operations()[0];
        assert_eq!(operation.op_type, OperationType::LeakyRelu);
        assert_eq!(operation.inputs, vec![x, alpha]);
        assert_eq!(operation.outputs, vec![y]);
    }

    #[test]
    fn converters_are_isolated() {
        let mut a = Converter::new();
        let mut b = Converter::new();
        a.add_float32_variable_operand(&[1], Some("shared"));
        assert!(!b.has_operand("shared"));
        b.add_float32_variable_operand(&[2], Some("shared"));
        assert_eq!(a.operand_type(a.get_operand("shared").unwrap()).dimensions, vec![Dim::Fixed(1)]);
    }
}
