//! Tagged numeric values and typed sample histories.

use num_traits::{Bounded, NumCast};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared data type of a variable or function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Opaque token owned by the host (an address, a handle id, ...).
    Opaque,
}

impl DataType {
    pub fn is_integral(self) -> bool {
        matches!(self, Self::Short | Self::Int | Self::Long | Self::Opaque)
    }
}

/// A single value tagged with its data type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Opaque(usize),
}

/// Float to integer conversion that saturates at the target bounds and maps
/// NaN to zero.
fn saturate<T: NumCast + Bounded + Default>(x: f64) -> T {
    if x.is_nan() {
        return T::default();
    }
    NumCast::from(x).unwrap_or_else(|| {
        if x < 0.0 {
            T::min_value()
        } else {
            T::max_value()
        }
    })
}

fn saturate_int<T: NumCast + Bounded>(x: i64) -> T {
    NumCast::from(x).unwrap_or_else(|| {
        if x < 0 {
            T::min_value()
        } else {
            T::max_value()
        }
    })
}

impl Value {
    /// The zero value of `data_type`.
    pub fn zero(data_type: DataType) -> Self {
        Self::from_f64(data_type, 0.0)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Short(_) => DataType::Short,
            Self::Int(_) => DataType::Int,
            Self::Long(_) => DataType::Long,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Opaque(_) => DataType::Opaque,
        }
    }

    /// Numeric view of the value. Opaque tokens yield their raw number.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Short(v) => v as f64,
            Self::Int(v) => v as f64,
            Self::Long(v) => v as f64,
            Self::Float(v) => v as f64,
            Self::Double(v) => v,
            Self::Opaque(v) => v as f64,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Short(v) => Some(v as i64),
            Self::Int(v) => Some(v as i64),
            Self::Long(v) => Some(v),
            Self::Opaque(v) => i64::try_from(v).ok(),
            Self::Float(_) | Self::Double(_) => None,
        }
    }

    /// Build a value of `data_type` from a float, saturating integral types.
    pub fn from_f64(data_type: DataType, x: f64) -> Self {
        match data_type {
            DataType::Short => Self::Short(saturate(x.round())),
            DataType::Int => Self::Int(saturate(x.round())),
            DataType::Long => Self::Long(saturate(x.round())),
            DataType::Float => Self::Float(x as f32),
            DataType::Double => Self::Double(x),
            DataType::Opaque => Self::Opaque(saturate(x.round())),
        }
    }

    fn from_i64(data_type: DataType, x: i64) -> Self {
        match data_type {
            DataType::Short => Self::Short(saturate_int(x)),
            DataType::Int => Self::Int(saturate_int(x)),
            DataType::Long => Self::Long(x),
            DataType::Float => Self::Float(x as f32),
            DataType::Double => Self::Double(x as f64),
            DataType::Opaque => Self::Opaque(saturate_int(x)),
        }
    }

    /// Convert into another data type.
    pub fn cast(self, data_type: DataType) -> Self {
        if self.data_type() == data_type {
            return self;
        }
        match self.as_i64() {
            Some(i) => Self::from_i64(data_type, i),
            None => Self::from_f64(data_type, self.as_f64()),
        }
    }

    /// `self + rhs` computed in `self`'s type.
    pub fn add(self, rhs: Value) -> Self {
        let ty = self.data_type();
        match (self.as_i64(), rhs.as_i64()) {
            (Some(a), Some(b)) if ty.is_integral() => Self::from_i64(ty, a.wrapping_add(b)),
            _ => Self::from_f64(ty, self.as_f64() + rhs.as_f64()),
        }
    }

    /// `self - rhs` computed in `self`'s type.
    pub fn sub(self, rhs: Value) -> Self {
        let ty = self.data_type();
        match (self.as_i64(), rhs.as_i64()) {
            (Some(a), Some(b)) if ty.is_integral() => Self::from_i64(ty, a.wrapping_sub(b)),
            _ => Self::from_f64(ty, self.as_f64() - rhs.as_f64()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Opaque(v) => write!(f, "{v:#x}"),
        }
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Short(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

/// Typed storage backing a [`History`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Samples {
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Opaque(Vec<usize>),
}

impl Samples {
    fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Short => Self::Short(Vec::with_capacity(capacity)),
            DataType::Int => Self::Int(Vec::with_capacity(capacity)),
            DataType::Long => Self::Long(Vec::with_capacity(capacity)),
            DataType::Float => Self::Float(Vec::with_capacity(capacity)),
            DataType::Double => Self::Double(Vec::with_capacity(capacity)),
            DataType::Opaque => Self::Opaque(Vec::with_capacity(capacity)),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Short(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Long(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Opaque(v) => v.len(),
        }
    }

    fn get(&self, index: usize) -> Option<Value> {
        match self {
            Self::Short(v) => v.get(index).copied().map(Value::Short),
            Self::Int(v) => v.get(index).copied().map(Value::Int),
            Self::Long(v) => v.get(index).copied().map(Value::Long),
            Self::Float(v) => v.get(index).copied().map(Value::Float),
            Self::Double(v) => v.get(index).copied().map(Value::Double),
            Self::Opaque(v) => v.get(index).copied().map(Value::Opaque),
        }
    }

    fn push(&mut self, value: Value) {
        match self {
            Self::Short(v) => {
                if let Value::Short(x) = value.cast(DataType::Short) {
                    v.push(x)
                }
            }
            Self::Int(v) => {
                if let Value::Int(x) = value.cast(DataType::Int) {
                    v.push(x)
                }
            }
            Self::Long(v) => {
                if let Value::Long(x) = value.cast(DataType::Long) {
                    v.push(x)
                }
            }
            Self::Float(v) => {
                if let Value::Float(x) = value.cast(DataType::Float) {
                    v.push(x)
                }
            }
            Self::Double(v) => {
                if let Value::Double(x) = value.cast(DataType::Double) {
                    v.push(x)
                }
            }
            Self::Opaque(v) => {
                if let Value::Opaque(x) = value.cast(DataType::Opaque) {
                    v.push(x)
                }
            }
        }
    }
}

/// Bounded, typed history of committed samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    samples: Samples,
    capacity: usize,
}

impl History {
    pub fn new(data_type: DataType, capacity: usize) -> Self {
        Self {
            samples: Samples::with_capacity(data_type, capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Append a sample, converted to the history's type. Returns the index of
    /// the stored sample, or `None` when the history is full.
    pub fn push(&mut self, value: Value) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        self.samples.push(value);
        Some(self.len() - 1)
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.samples.get(index)
    }

    pub fn last(&self) -> Option<Value> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.iter().map(|v| v.as_f64()).collect()
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }
}
