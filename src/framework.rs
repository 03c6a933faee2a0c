//! Framework-side view of a subgraph: operator descriptions and the tensor store.
//!
//! Bridges only read from these types. They mirror what the inference framework
//! hands to the bridging layer and can be deserialized from a JSON fixture.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Element precision as the framework records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionType {
    Unknown,
    #[default]
    Float,
    Int8,
    Int32,
    Any,
    Fp16,
    Bool,
    Int64,
    Int16,
    Uint8,
    Fp64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataLayoutType {
    Unknown,
    #[default]
    Nchw,
    Nhwc,
    Any,
}

/// Operator attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attribute {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
}

impl From<bool> for Attribute {
    fn from(value: bool) -> Self {
        Attribute::Bool(value)
    }
}

impl From<i32> for Attribute {
    fn from(value: i32) -> Self {
        Attribute::Int(value as i64)
    }
}

impl From<i64> for Attribute {
    fn from(value: i64) -> Self {
        Attribute::Int(value)
    }
}

impl From<f32> for Attribute {
    fn from(value: f32) -> Self {
        Attribute::Float(value as f64)
    }
}

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Attribute::String(value.to_string())
    }
}

impl From<Vec<i32>> for Attribute {
    fn from(values: Vec<i32>) -> Self {
        Attribute::Ints(values.into_iter().map(i64::from).collect())
    }
}

impl From<Vec<f32>> for Attribute {
    fn from(values: Vec<f32>) -> Self {
        Attribute::Floats(values.into_iter().map(f64::from).collect())
    }
}

/// Typed extraction from an [`Attribute`].
pub trait FromAttribute: Sized {
    const KIND: &'static str;

    fn from_attribute(attr: &Attribute) -> Option<Self>;
}

impl FromAttribute for bool {
    const KIND: &'static str = "bool";

    fn from_attribute(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl FromAttribute for i64 {
    const KIND: &'static str = "int";

    fn from_attribute(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::Int(value) => Some(*value),
            _ => None,
        }
    }
}

impl FromAttribute for i32 {
    const KIND: &'static str = "int";

    fn from_attribute(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::Int(value) => i32::try_from(*value).ok(),
            _ => None,
        }
    }
}

impl FromAttribute for f32 {
    const KIND: &'static str = "float";

    fn from_attribute(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::Float(value) => Some(*value as f32),
            Attribute::Int(value) => Some(*value as f32),
            _ => None,
        }
    }
}

impl FromAttribute for String {
    const KIND: &'static str = "string";

    fn from_attribute(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::String(value) => Some(value.clone()),
            _ => None,
        }
    }
}

impl FromAttribute for Vec<i32> {
    const KIND: &'static str = "int list";

    fn from_attribute(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::Ints(values) => values.iter().map(|v| i32::try_from(*v).ok()).collect(),
            _ => None,
        }
    }
}

impl FromAttribute for Vec<f32> {
    const KIND: &'static str = "float list";

    fn from_attribute(attr: &Attribute) -> Option<Self> {
        match attr {
            Attribute::Floats(values) => Some(values.iter().map(|v| *v as f32).collect()),
            Attribute::Ints(values) => Some(values.iter().map(|v| *v as f32).collect()),
            _ => None,
        }
    }
}

/// Description of one framework operator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OpDesc {
    #[serde(rename = "type")]
    op_type: String,
    #[serde(default)]
    inputs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    outputs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    attrs: BTreeMap<String, Attribute>,
    /// Quantization scales keyed by scale name, e.g. `Input0_scale`.
    #[serde(default)]
    input_scales: BTreeMap<String, Vec<f32>>,
    #[serde(default)]
    output_scales: BTreeMap<String, Vec<f32>>,
}

impl OpDesc {
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, slot: &str, name: &str) -> Self {
        self.inputs
            .entry(slot.to_string())
            .or_default()
            .push(name.to_string());
        self
    }

    pub fn with_output(mut self, slot: &str, name: &str) -> Self {
        self.outputs
            .entry(slot.to_string())
            .or_default()
            .push(name.to_string());
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<Attribute>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn with_input_scale(mut self, name: &str, scales: Vec<f32>) -> Self {
        self.input_scales.insert(name.to_string(), scales);
        self
    }

    pub fn with_output_scale(mut self, name: &str, scales: Vec<f32>) -> Self {
        self.output_scales.insert(name.to_string(), scales);
        self
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn input(&self, slot: &str) -> &[String] {
        self.inputs.get(slot).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn output(&self, slot: &str) -> &[String] {
        self.outputs.get(slot).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_input(&self, slot: &str) -> bool {
        !self.input(slot).is_empty()
    }

    /// First tensor name bound to input `slot`.
    pub fn first_input(&self, slot: &str) -> Result<&str, BridgeError> {
        self.input(slot)
            .first()
            .map(String::as_str)
            .ok_or_else(|| BridgeError::MissingInput {
                op_type: self.op_type.clone(),
                slot: slot.to_string(),
            })
    }

    /// First tensor name bound to output `slot`.
    pub fn first_output(&self, slot: &str) -> Result<&str, BridgeError> {
        self.output(slot)
            .first()
            .map(String::as_str)
            .ok_or_else(|| BridgeError::MissingOutput {
                op_type: self.op_type.clone(),
                slot: slot.to_string(),
            })
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn attr<T: FromAttribute>(&self, name: &str) -> Result<T, BridgeError> {
        let attr = self
            .attrs
            .get(name)
            .ok_or_else(|| BridgeError::MissingAttribute {
                op_type: self.op_type.clone(),
                name: name.to_string(),
            })?;
        T::from_attribute(attr).ok_or_else(|| BridgeError::AttributeKind {
            op_type: self.op_type.clone(),
            name: name.to_string(),
            expected: T::KIND,
        })
    }

    /// Attribute value, or `default` when the attribute is absent.
    pub fn attr_or<T: FromAttribute>(&self, name: &str, default: T) -> Result<T, BridgeError> {
        if self.has_attr(name) {
            self.attr(name)
        } else {
            Ok(default)
        }
    }

    pub fn has_input_scale(&self, name: &str) -> bool {
        self.input_scales.get(name).is_some_and(|s| !s.is_empty())
    }

    pub fn input_scale(&self, name: &str) -> Option<&[f32]> {
        self.input_scales
            .get(name)
            .map(Vec::as_slice)
            .filter(|s| !s.is_empty())
    }

    pub fn has_output_scale(&self, name: &str) -> bool {
        self.output_scales.get(name).is_some_and(|s| !s.is_empty())
    }

    pub fn output_scale(&self, name: &str) -> Option<&[f32]> {
        self.output_scales
            .get(name)
            .map(Vec::as_slice)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorData {
    /// Activations have no data at conversion time.
    #[default]
    Empty,
    F32(Vec<f32>),
    I8(Vec<i8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    dims: Vec<i64>,
    #[serde(default)]
    precision: PrecisionType,
    #[serde(default)]
    layout: DataLayoutType,
    #[serde(default)]
    data: TensorData,
}

impl Tensor {
    /// Tensor without data, e.g. an activation.
    pub fn placeholder(dims: Vec<i64>, precision: PrecisionType) -> Self {
        Self {
            dims,
            precision,
            layout: DataLayoutType::Nchw,
            data: TensorData::Empty,
        }
    }

    pub fn from_f32(dims: Vec<i64>, data: Vec<f32>) -> Self {
        Self {
            dims,
            precision: PrecisionType::Float,
            layout: DataLayoutType::Nchw,
            data: TensorData::F32(data),
        }
    }

    pub fn from_i8(dims: Vec<i64>, data: Vec<i8>) -> Self {
        Self {
            dims,
            precision: PrecisionType::Int8,
            layout: DataLayoutType::Nchw,
            data: TensorData::I8(data),
        }
    }

    pub fn with_layout(self, layout: DataLayoutType) -> Self {
        Self { layout, ..self }
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn precision(&self) -> PrecisionType {
        self.precision
    }

    pub fn layout(&self) -> DataLayoutType {
        self.layout
    }

    pub fn data_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(values) => Some(values),
            _ => None,
        }
    }

    pub fn data_i8(&self) -> Option<&[i8]> {
        match &self.data {
            TensorData::I8(values) => Some(values),
            _ => None,
        }
    }
}

/// Tensor store, keyed by tensor name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    tensors: BTreeMap<String, Tensor>,
}

impl Scope {
    pub fn insert(&mut self, name: &str, tensor: Tensor) {
        self.tensors.insert(name.to_string(), tensor);
    }

    pub fn with_tensor(mut self, name: &str, tensor: Tensor) -> Self {
        self.insert(name, tensor);
        self
    }

    pub fn find_tensor(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn require_tensor(&self, name: &str) -> Result<&Tensor, BridgeError> {
        self.find_tensor(name)
            .ok_or_else(|| BridgeError::TensorNotFound {
                name: name.to_string(),
            })
    }
}

/// Operators in definition order plus the tensors they reference.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Subgraph {
    pub ops: Vec<OpDesc>,
    #[serde(default)]
    pub scope: Scope,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_attributes() {
        let op = OpDesc::new("conv2d")
            .with_attr("groups", 2)
            .with_attr("strides", vec![1, 2])
            .with_attr("fuse_relu", true)
            .with_attr("padding_algorithm", "SAME")
            .with_attr("alpha", 0.25f32);

        assert_eq!(op.attr::<i32>("groups").unwrap(), 2);
        assert_eq!(op.attr::<Vec<i32>>("strides").unwrap(), vec![1, 2]);
        assert!(op.attr::<bool>("fuse_relu").unwrap());
        assert_eq!(op.attr::<String>("padding_algorithm").unwrap(), "SAME");
        assert_eq!(op.attr::<f32>("alpha").unwrap(), 0.25);
        assert!(!op.attr_or::<bool>("with_act", false).unwrap());
    }

    #[test]
    fn missing_and_mistyped_attributes() {
        let op = OpDesc::new("arg_max").with_attr("axis", "oops");
        assert!(matches!(
            op.attr::<i64>("axis"),
            Err(BridgeError::AttributeKind { expected: "int", .. })
        ));
        assert!(matches!(
            op.attr::<bool>("keepdims"),
            Err(BridgeError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn empty_scale_lists_count_as_absent() {
        let op = OpDesc::new("conv2d")
            .with_input_scale("Input0_scale", vec![])
            .with_input_scale("Filter0_scale", vec![0.1, 0.2])
            .with_output_scale("Output0_scale", vec![0.3]);
        assert!(!op.has_input_scale("Input0_scale"));
        assert_eq!(op.input_scale("Filter0_scale"), Some(&[0.1, 0.2][..]));
        assert!(op.has_output_scale("Output0_scale"));
    }

    #[test]
    fn subgraph_from_json() {
        let subgraph: Subgraph = serde_json::from_value(serde_json::json!({
            "ops": [{
                "type": "relu",
                "inputs": { "X": ["x"] },
                "outputs": { "Out": ["y"] },
                "attrs": { "alpha": 0.5, "axis": -1, "paddings": [1, 2] }
            }],
            "scope": {
                "x": { "dims": [1, 3], "precision": "float" },
                "w": { "dims": [2], "data": { "f32": [1.0, 2.0] } }
            }
        }))
        .unwrap();

        let op = &subgraph.ops[0];
        assert_eq!(op.op_type(), "relu");
        assert_eq!(op.first_input("X").unwrap(), "x");
        assert!(op.first_output("Y").is_err());
        assert_eq!(op.attr::<f32>("alpha").unwrap(), 0.5);
        assert_eq!(op.attr::<i64>("axis").unwrap(), -1);
        assert_eq!(op.attr::<Vec<i32>>("paddings").unwrap(), vec![1, 2]);

        let w = subgraph.scope.find_tensor("w").unwrap();
        assert_eq!(w.data_f32(), Some(&[1.0, 2.0][..]));
        assert!(subgraph.scope.find_tensor("x").unwrap().data_f32().is_none());
    }
}
