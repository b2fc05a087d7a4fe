//! Boolean vectors with SQL three-valued logic.

use bitvec::prelude::{bitvec, BitVec};
use vex_common::{VexError, VexResult};

use crate::schema::ResolvedType;
use crate::vector::{Value, ValueVector};

/// A boolean [`ValueVector`] backed by a value bitset and an optional
/// null bitset.
///
/// `and`/`or`/`not` follow SQL three-valued logic:
/// `null AND false = false`, `null AND true = null`,
/// `null OR true = true`, `null OR false = null`.
#[derive(Debug, Clone)]
pub struct BitSetVector {
    values: BitVec,
    nulls: Option<BitVec>,
}

impl BitSetVector {
    /// Creates an empty vector with reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: BitVec::with_capacity(capacity),
            nulls: None,
        }
    }

    /// Creates a vector from three-valued booleans.
    pub fn from_options(values: impl IntoIterator<Item = Option<bool>>) -> Self {
        let mut result = Self::with_capacity(0);
        for value in values {
            result.push(value);
        }
        result
    }

    /// Creates an all-true vector of `len` rows.
    #[must_use]
    pub fn all_true(len: usize) -> Self {
        Self {
            values: bitvec![1; len],
            nulls: None,
        }
    }

    /// Creates an all-false vector of `len` rows.
    #[must_use]
    pub fn all_false(len: usize) -> Self {
        Self {
            values: bitvec![0; len],
            nulls: None,
        }
    }

    /// Appends a three-valued boolean.
    pub fn push(&mut self, value: Option<bool>) {
        match value {
            Some(b) => {
                self.values.push(b);
                if let Some(nulls) = &mut self.nulls {
                    nulls.push(false);
                }
            }
            None => {
                self.values.push(false);
                let len = self.values.len();
                let nulls = self
                    .nulls
                    .get_or_insert_with(|| bitvec![0; len - 1]);
                nulls.push(true);
            }
        }
    }

    /// Returns the three-valued boolean at `row`.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<bool> {
        if self.nulls.as_ref().is_some_and(|n| n[row]) {
            None
        } else {
            Some(self.values[row])
        }
    }

    /// Number of definite-true rows (nulls excluded).
    #[must_use]
    pub fn true_count(&self) -> usize {
        match &self.nulls {
            None => self.values.count_ones(),
            Some(nulls) => (0..self.values.len())
                .filter(|&i| self.values[i] && !nulls[i])
                .count(),
        }
    }

    /// Indices of definite-true rows, in order.
    #[must_use]
    pub fn true_indices(&self) -> Vec<usize> {
        (0..self.values.len())
            .filter(|&i| self.get(i) == Some(true))
            .collect()
    }

    /// Logical AND against another boolean vector.
    pub fn and(&self, other: &dyn ValueVector) -> VexResult<BitSetVector> {
        let other = check_operand(self.len(), other)?;
        let mut result = Self::with_capacity(self.len());
        for row in 0..self.len() {
            let value = match (self.get(row), other.get_boolean(row)?) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            };
            result.push(value);
        }
        Ok(result)
    }

    /// Logical OR against another boolean vector.
    pub fn or(&self, other: &dyn ValueVector) -> VexResult<BitSetVector> {
        let other = check_operand(self.len(), other)?;
        let mut result = Self::with_capacity(self.len());
        for row in 0..self.len() {
            let value = match (self.get(row), other.get_boolean(row)?) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            };
            result.push(value);
        }
        Ok(result)
    }

    /// Logical NOT. Nulls stay null.
    #[must_use]
    pub fn not(&self) -> BitSetVector {
        // Null slots keep an arbitrary payload bit; flip everything and
        // let the null bitset mask them out.
        BitSetVector {
            values: !self.values.clone(),
            nulls: self.nulls.clone(),
        }
    }
}

/// Validates size and type of a binary-operation operand.
fn check_operand<'a>(
    len: usize,
    other: &'a dyn ValueVector,
) -> VexResult<&'a dyn ValueVector> {
    if other.len() != len {
        return Err(VexError::invariant(format!(
            "boolean operand has {} rows, expected {}",
            other.len(),
            len
        )));
    }
    let ty = other.resolved_type();
    if !matches!(ty, ResolvedType::Boolean | ResolvedType::Any) {
        return Err(VexError::invariant(format!(
            "boolean operation against a {} vector",
            ty.name()
        )));
    }
    Ok(other)
}

impl ValueVector for BitSetVector {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn resolved_type(&self) -> ResolvedType {
        ResolvedType::Boolean
    }

    fn is_null(&self, row: usize) -> bool {
        self.get(row).is_none()
    }

    fn value(&self, row: usize) -> Value {
        self.get(row).map_or(Value::Null, Value::Boolean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::TypedVector;

    const T: Option<bool> = Some(true);
    const F: Option<bool> = Some(false);
    const N: Option<bool> = None;

    #[test]
    fn three_valued_and() {
        let a = BitSetVector::from_options([T, T, T, F, F, F, N, N, N]);
        let b = BitSetVector::from_options([T, F, N, T, F, N, T, F, N]);
        let result = a.and(&b).unwrap();
        let expected = [T, F, F, F, F, F, N, F, N];
        for (row, want) in expected.iter().enumerate() {
            assert_eq!(result.get(row), *want, "row {row}");
        }
    }

    #[test]
    fn three_valued_or() {
        let a = BitSetVector::from_options([T, T, T, F, F, F, N, N, N]);
        let b = BitSetVector::from_options([T, F, N, T, F, N, T, F, N]);
        let result = a.or(&b).unwrap();
        let expected = [T, T, T, T, F, N, T, N, N];
        for (row, want) in expected.iter().enumerate() {
            assert_eq!(result.get(row), *want, "row {row}");
        }
    }

    #[test]
    fn double_negation_roundtrips() {
        let v = BitSetVector::from_options([T, F, N, T]);
        let back = v.not().not();
        for row in 0..v.len() {
            assert_eq!(back.get(row), v.get(row));
        }
    }

    #[test]
    fn rejects_mismatched_sizes() {
        let a = BitSetVector::from_options([T, F]);
        let b = BitSetVector::from_options([T]);
        assert!(a.and(&b).is_err());
    }

    #[test]
    fn rejects_non_boolean_operand() {
        let a = BitSetVector::from_options([T, F]);
        let ints = TypedVector::ints([Some(1), Some(0)]);
        assert!(a.or(&ints).is_err());
    }

    #[test]
    fn works_against_foreign_boolean_vectors() {
        let a = BitSetVector::from_options([T, F, N]);
        let foreign = TypedVector::new(
            ResolvedType::Boolean,
            vec![Value::Boolean(false), Value::Null, Value::Boolean(true)],
        );
        let result = a.and(&foreign).unwrap();
        assert_eq!(result.get(0), F);
        assert_eq!(result.get(1), F);
        assert_eq!(result.get(2), N);
    }
}
