//! Column storage: scalar and jagged (variable-length per-event) columns.

use jc_core::{Error, Result};

/// Element/shape type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Scalar 64-bit float.
    F64,
    /// Scalar 64-bit signed integer.
    I64,
    /// Scalar boolean.
    Bool,
    /// Variable-length float sequence per event.
    VecF64,
    /// Variable-length integer sequence per event.
    VecI64,
    /// Variable-length boolean sequence per event.
    VecBool,
}

impl ColumnType {
    /// Whether this is a per-event sequence type.
    pub fn is_vector(self) -> bool {
        matches!(self, ColumnType::VecF64 | ColumnType::VecI64 | ColumnType::VecBool)
    }

    /// Scalar type of one element of a vector column (identity for scalars).
    pub fn element(self) -> ColumnType {
        match self {
            ColumnType::VecF64 => ColumnType::F64,
            ColumnType::VecI64 => ColumnType::I64,
            ColumnType::VecBool => ColumnType::Bool,
            s => s,
        }
    }
}

/// One event's worth of a column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Scalar float.
    F64(f64),
    /// Scalar integer.
    I64(i64),
    /// Scalar boolean.
    Bool(bool),
    /// Float sequence.
    VecF64(Vec<f64>),
    /// Integer sequence.
    VecI64(Vec<i64>),
    /// Boolean sequence.
    VecBool(Vec<bool>),
}

impl ColumnValue {
    /// Shape/element type of this value.
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValue::F64(_) => ColumnType::F64,
            ColumnValue::I64(_) => ColumnType::I64,
            ColumnValue::Bool(_) => ColumnType::Bool,
            ColumnValue::VecF64(_) => ColumnType::VecF64,
            ColumnValue::VecI64(_) => ColumnType::VecI64,
            ColumnValue::VecBool(_) => ColumnType::VecBool,
        }
    }

    /// Coerce a scalar to `f64` (booleans map to 0/1).
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            ColumnValue::F64(v) => Ok(*v),
            ColumnValue::I64(v) => Ok(*v as f64),
            ColumnValue::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            other => Err(Error::TypeMismatch(format!(
                "expected scalar, got {:?}",
                other.column_type()
            ))),
        }
    }

    /// Coerce a scalar to `i64`.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            ColumnValue::I64(v) => Ok(*v),
            ColumnValue::F64(v) => Ok(*v as i64),
            ColumnValue::Bool(v) => Ok(i64::from(*v)),
            other => Err(Error::TypeMismatch(format!(
                "expected scalar integer, got {:?}",
                other.column_type()
            ))),
        }
    }

    /// Scalar truthiness: booleans as-is, numerics `> 0`.
    pub fn truthy(&self) -> Result<bool> {
        match self {
            ColumnValue::Bool(v) => Ok(*v),
            ColumnValue::F64(v) => Ok(*v > 0.0),
            ColumnValue::I64(v) => Ok(*v > 0),
            other => Err(Error::TypeMismatch(format!(
                "expected scalar predicate, got {:?}",
                other.column_type()
            ))),
        }
    }

    /// Sequence length, or `None` for scalars.
    pub fn seq_len(&self) -> Option<usize> {
        match self {
            ColumnValue::VecF64(v) => Some(v.len()),
            ColumnValue::VecI64(v) => Some(v.len()),
            ColumnValue::VecBool(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Element `i` of a sequence coerced to `f64`, or `None` out of range.
    pub fn element_f64(&self, i: usize) -> Option<f64> {
        match self {
            ColumnValue::VecF64(v) => v.get(i).copied(),
            ColumnValue::VecI64(v) => v.get(i).map(|&x| x as f64),
            ColumnValue::VecBool(v) => v.get(i).map(|&x| if x { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// View a numeric sequence as `f64`s, materializing only when the
    /// element type requires conversion.
    pub fn f64_seq(&self) -> Result<std::borrow::Cow<'_, [f64]>> {
        match self {
            ColumnValue::VecF64(v) => Ok(std::borrow::Cow::Borrowed(v)),
            ColumnValue::VecI64(v) => {
                Ok(std::borrow::Cow::Owned(v.iter().map(|&x| x as f64).collect()))
            }
            ColumnValue::VecBool(v) => Ok(std::borrow::Cow::Owned(
                v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect(),
            )),
            other => Err(Error::TypeMismatch(format!(
                "expected sequence, got {:?}",
                other.column_type()
            ))),
        }
    }
}

/// Jagged storage: flat values plus per-event offsets.
///
/// `offsets` has length `n_events + 1`; event `i` owns
/// `flat[offsets[i]..offsets[i + 1]]`.
#[derive(Debug, Clone, Default)]
pub struct Jagged<T> {
    /// Flat array of all values across all events.
    pub flat: Vec<T>,
    /// Event boundaries.
    pub offsets: Vec<usize>,
}

impl<T: Copy> Jagged<T> {
    /// Build from per-event rows.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Self {
        let mut flat = Vec::new();
        let mut offsets = Vec::with_capacity(rows.len() + 1);
        offsets.push(0);
        for row in rows {
            flat.extend_from_slice(&row);
            offsets.push(flat.len());
        }
        Self { flat, offsets }
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Slice for one event.
    pub fn row(&self, event: usize) -> &[T] {
        &self.flat[self.offsets[event]..self.offsets[event + 1]]
    }
}

/// Full-dataset storage for one column.
#[derive(Debug, Clone)]
pub enum ColumnData {
    /// Scalar floats.
    F64(Vec<f64>),
    /// Scalar integers.
    I64(Vec<i64>),
    /// Scalar booleans.
    Bool(Vec<bool>),
    /// Jagged floats.
    VecF64(Jagged<f64>),
    /// Jagged integers.
    VecI64(Jagged<i64>),
    /// Jagged booleans.
    VecBool(Jagged<bool>),
}

impl ColumnData {
    /// Shape/element type.
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::F64(_) => ColumnType::F64,
            ColumnData::I64(_) => ColumnType::I64,
            ColumnData::Bool(_) => ColumnType::Bool,
            ColumnData::VecF64(_) => ColumnType::VecF64,
            ColumnData::VecI64(_) => ColumnType::VecI64,
            ColumnData::VecBool(_) => ColumnType::VecBool,
        }
    }

    /// Number of events stored.
    pub fn n_events(&self) -> usize {
        match self {
            ColumnData::F64(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::VecF64(j) => j.n_events(),
            ColumnData::VecI64(j) => j.n_events(),
            ColumnData::VecBool(j) => j.n_events(),
        }
    }

    /// Materialize one event's value.
    pub fn value_at(&self, event: usize) -> ColumnValue {
        match self {
            ColumnData::F64(v) => ColumnValue::F64(v[event]),
            ColumnData::I64(v) => ColumnValue::I64(v[event]),
            ColumnData::Bool(v) => ColumnValue::Bool(v[event]),
            ColumnData::VecF64(j) => ColumnValue::VecF64(j.row(event).to_vec()),
            ColumnData::VecI64(j) => ColumnValue::VecI64(j.row(event).to_vec()),
            ColumnData::VecBool(j) => ColumnValue::VecBool(j.row(event).to_vec()),
        }
    }
}
