//! Typed column vectors with coercing scalar accessors.

use std::fmt;
use std::sync::Arc;

use vex_common::VexResult;

use crate::schema::ResolvedType;
use crate::vector::{TupleVector, Value};

/// Reference-counted value vector handle.
pub type VectorRef = Arc<dyn ValueVector>;

/// One column's values across a batch.
///
/// Implementations expose a per-row null indicator plus scalar accessors
/// that perform implicit coercion when the declared type differs from the
/// requested accessor (see [`Value`] for the coercion rules). Row indices
/// must be `< len()`; callers uphold this via the batch row count.
pub trait ValueVector: fmt::Debug + Send + Sync {
    /// Number of rows in this vector.
    fn len(&self) -> usize;

    /// Returns true if this vector has no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Declared type of this vector.
    fn resolved_type(&self) -> ResolvedType;

    /// Returns true if the value at `row` is NULL.
    fn is_null(&self, row: usize) -> bool;

    /// Returns the raw value at `row`.
    fn value(&self, row: usize) -> Value;

    /// Returns the boolean at `row`, coercing if necessary.
    fn get_boolean(&self, row: usize) -> VexResult<Option<bool>> {
        self.value(row).try_boolean()
    }

    /// Returns the 32-bit integer at `row`, coercing if necessary.
    fn get_int(&self, row: usize) -> VexResult<Option<i32>> {
        self.value(row).try_int()
    }

    /// Returns the 64-bit integer at `row`, coercing if necessary.
    fn get_long(&self, row: usize) -> VexResult<Option<i64>> {
        self.value(row).try_long()
    }

    /// Returns the 32-bit float at `row`, coercing if necessary.
    fn get_float(&self, row: usize) -> VexResult<Option<f32>> {
        self.value(row).try_float()
    }

    /// Returns the 64-bit float at `row`, coercing if necessary.
    fn get_double(&self, row: usize) -> VexResult<Option<f64>> {
        self.value(row).try_double()
    }

    /// Returns the string at `row`, coercing if necessary.
    fn get_string(&self, row: usize) -> VexResult<Option<String>> {
        self.value(row).try_string()
    }

    /// Returns the DateTime (epoch millis) at `row`, coercing if necessary.
    fn get_datetime(&self, row: usize) -> VexResult<Option<i64>> {
        self.value(row).try_datetime()
    }

    /// Returns the nested table at `row`, if any.
    fn get_table(&self, row: usize) -> Option<TupleVector> {
        match self.value(row) {
            Value::Table(v) => Some(v),
            _ => None,
        }
    }
}

/// A materialized vector backed by a `Vec<Value>`.
#[derive(Debug, Clone)]
pub struct TypedVector {
    ty: ResolvedType,
    values: Vec<Value>,
}

impl TypedVector {
    /// Creates a new vector with a declared type.
    #[must_use]
    pub fn new(ty: ResolvedType, values: Vec<Value>) -> Self {
        Self { ty, values }
    }

    /// Creates a vector inferring the type from the values.
    ///
    /// The type is the single non-null value type when unambiguous,
    /// otherwise [`ResolvedType::Any`].
    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Self {
        let mut ty: Option<ResolvedType> = None;
        for value in &values {
            if value.is_null() {
                continue;
            }
            let value_ty = value.resolved_type();
            match &ty {
                None => ty = Some(value_ty),
                Some(t) if *t == value_ty => {}
                Some(_) => {
                    ty = Some(ResolvedType::Any);
                    break;
                }
            }
        }
        Self::new(ty.unwrap_or(ResolvedType::Any), values)
    }

    /// Convenience constructor for an Int vector.
    #[must_use]
    pub fn ints(values: impl IntoIterator<Item = Option<i32>>) -> Self {
        Self::new(
            ResolvedType::Int,
            values
                .into_iter()
                .map(|v| v.map_or(Value::Null, Value::Int))
                .collect(),
        )
    }

    /// Convenience constructor for a String vector.
    #[must_use]
    pub fn strings<S: Into<String>>(values: impl IntoIterator<Item = Option<S>>) -> Self {
        Self::new(
            ResolvedType::String,
            values
                .into_iter()
                .map(|v| v.map_or(Value::Null, |s| Value::String(s.into())))
                .collect(),
        )
    }
}

impl ValueVector for TypedVector {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn resolved_type(&self) -> ResolvedType {
        self.ty.clone()
    }

    fn is_null(&self, row: usize) -> bool {
        self.values[row].is_null()
    }

    fn value(&self, row: usize) -> Value {
        self.values[row].clone()
    }
}

/// A vector repeating one value, used for literals and null fill.
#[derive(Debug, Clone)]
pub struct ConstantVector {
    value: Value,
    ty: ResolvedType,
    len: usize,
}

impl ConstantVector {
    /// Creates a constant vector of `len` copies of `value`.
    #[must_use]
    pub fn new(value: Value, len: usize) -> Self {
        let ty = value.resolved_type();
        Self { value, ty, len }
    }

    /// Creates an all-null vector with the given declared type.
    #[must_use]
    pub fn nulls(ty: ResolvedType, len: usize) -> Self {
        Self {
            value: Value::Null,
            ty,
            len,
        }
    }
}

impl ValueVector for ConstantVector {
    fn len(&self) -> usize {
        self.len
    }

    fn resolved_type(&self) -> ResolvedType {
        self.ty.clone()
    }

    fn is_null(&self, _row: usize) -> bool {
        self.value.is_null()
    }

    fn value(&self, _row: usize) -> Value {
        self.value.clone()
    }
}
