//! Shape model carried by IR nodes.
//!
//! A node's full shape is a [`ValueType`]: a single tensor for ordinary nodes, or a tuple with
//! one element per output for multi-output nodes. Shapes render in the compact `f32[2,3]`
//! notation used by IR dumps.

use std::{fmt, sync::Arc};

use serde::{ser::SerializeStruct, Deserialize, Serialize};

/// Scalar element types understood by the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Pred,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    F16,
    Bf16,
    F32,
    F64,
    C64,
}

impl DType {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DType::S8
                | DType::S16
                | DType::S32
                | DType::S64
                | DType::U8
                | DType::U16
                | DType::U32
                | DType::U64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::Bf16 | DType::F32 | DType::F64)
    }

    /// Storage size of one element in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Pred | DType::S8 | DType::U8 => 1,
            DType::S16 | DType::U16 | DType::F16 | DType::Bf16 => 2,
            DType::S32 | DType::U32 | DType::F32 => 4,
            DType::S64 | DType::U64 | DType::F64 | DType::C64 => 8,
        }
    }

    /// Lower-case mnemonic used in shape strings (`f32`, `s64`, `pred`, ...).
    pub fn mnemonic(self) -> &'static str {
        match self {
            DType::Pred => "pred",
            DType::S8 => "s8",
            DType::S16 => "s16",
            DType::S32 => "s32",
            DType::S64 => "s64",
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::U64 => "u64",
            DType::F16 => "f16",
            DType::Bf16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::C64 => "c64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Names a symbolic dynamic dimension (e.g. `?B`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimSymbol(Arc<str>);

impl DimSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::<str>::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for DimSymbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DimSymbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(DimSymbol::new(name))
    }
}

/// Single axis extent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic(DimSymbol),
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Static(extent) => write!(f, "{extent}"),
            Dimension::Dynamic(symbol) => write!(f, "?{}", symbol.as_str()),
        }
    }
}

/// Ordered list of dimensions; rank zero is a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Dimension>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<Dimension>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn from_static(dims: &[usize]) -> Self {
        Self {
            dims: dims.iter().copied().map(Dimension::Static).collect(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    /// Returns static extents when every dimension is static.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        self.dims
            .iter()
            .map(|dim| match dim {
                Dimension::Static(extent) => Some(*extent),
                Dimension::Dynamic(_) => None,
            })
            .collect()
    }

    pub fn element_count(&self) -> Option<usize> {
        self.static_dims()?
            .into_iter()
            .try_fold(1usize, |count, dim| count.checked_mul(dim))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, dim) in self.dims.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

/// Element type plus dimensions of one tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorSpec {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    pub fn byte_len(&self) -> Option<usize> {
        self.shape
            .element_count()?
            .checked_mul(self.dtype.size_in_bytes())
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)
    }
}

/// Full shape of a node: one tensor, or a tuple with one entry per output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Tensor(TensorSpec),
    Tuple(Vec<ValueType>),
}

impl ValueType {
    pub fn tensor(dtype: DType, dims: &[usize]) -> Self {
        ValueType::Tensor(TensorSpec::new(dtype, Shape::from_static(dims)))
    }

    pub fn scalar(dtype: DType) -> Self {
        ValueType::Tensor(TensorSpec::new(dtype, Shape::scalar()))
    }

    pub fn tuple(elements: impl Into<Vec<ValueType>>) -> Self {
        ValueType::Tuple(elements.into())
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, ValueType::Tuple(_))
    }

    /// Number of tuple elements, or `None` for a plain tensor.
    pub fn tuple_arity(&self) -> Option<usize> {
        match self {
            ValueType::Tuple(elements) => Some(elements.len()),
            ValueType::Tensor(_) => None,
        }
    }

    pub fn element(&self, index: usize) -> Option<&ValueType> {
        match self {
            ValueType::Tuple(elements) => elements.get(index),
            ValueType::Tensor(_) => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorSpec> {
        match self {
            ValueType::Tensor(spec) => Some(spec),
            ValueType::Tuple(_) => None,
        }
    }
}

impl From<TensorSpec> for ValueType {
    fn from(spec: TensorSpec) -> Self {
        ValueType::Tensor(spec)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Tensor(spec) => write!(f, "{spec}"),
            ValueType::Tuple(elements) => {
                f.write_str("(")?;
                for (index, element) in elements.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Dense host literal backing a constant node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorLiteral {
    pub spec: TensorSpec,
    pub bytes: Arc<[u8]>,
}

impl TensorLiteral {
    pub fn new(spec: TensorSpec, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            spec,
            bytes: bytes.into(),
        }
    }

    pub fn scalar_f32(value: f32) -> Self {
        Self::new(
            TensorSpec::new(DType::F32, Shape::scalar()),
            value.to_le_bytes().to_vec(),
        )
    }

    pub fn from_f32(dims: &[usize], values: &[f32]) -> Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(TensorSpec::new(DType::F32, Shape::from_static(dims)), bytes)
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

impl Serialize for TensorLiteral {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("TensorLiteral", 2)?;
        state.serialize_field("spec", &self.spec)?;
        state.serialize_field("bytes", &self.bytes.as_ref())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for TensorLiteral {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct TensorLiteralHelper {
            spec: TensorSpec,
            bytes: Vec<u8>,
        }

        let helper = TensorLiteralHelper::deserialize(deserializer)?;
        Ok(TensorLiteral::new(helper.spec, helper.bytes))
    }
}
