//! Zero-copy filtered and grouped views over batches.
//!
//! These are the vectorized building blocks of the join operators: a
//! boolean selection applied to a batch, the outer×inner cartesian
//! pairing a join predicate is evaluated over, and the per-outer-row
//! grouping of matched inner rows used by populate joins.

use std::sync::Arc;

use vex_common::{VexError, VexResult};

use crate::schema::{resolve, ResolvedType, SchemaRef};
use crate::vector::{ConstantVector, TupleVector, TypedVector, Value, ValueVector, VectorRef};

/// A row remapping shared by every column of a view.
#[derive(Debug, Clone)]
pub enum RowMap {
    /// Explicit source row per output row.
    Indices(Arc<Vec<usize>>),
    /// Each source row repeated `times` times (outer side of a cartesian
    /// pairing).
    RepeatEach {
        /// Repetition count per source row.
        times: usize,
    },
    /// The whole source cycled `times` times (inner side of a cartesian
    /// pairing).
    Cycle {
        /// Number of full cycles.
        times: usize,
    },
}

impl RowMap {
    /// Output length for a source of `source_len` rows.
    #[must_use]
    pub fn output_len(&self, source_len: usize) -> usize {
        match self {
            Self::Indices(indices) => indices.len(),
            Self::RepeatEach { times } | Self::Cycle { times } => source_len * times,
        }
    }

    /// Maps an output row to its source row.
    #[must_use]
    pub fn source_row(&self, row: usize, source_len: usize) -> usize {
        match self {
            Self::Indices(indices) => indices[row],
            Self::RepeatEach { times } => row / times,
            Self::Cycle { .. } => row % source_len,
        }
    }
}

/// A zero-copy view remapping the rows of a backing vector.
#[derive(Debug, Clone)]
pub struct SelectionVector {
    source: VectorRef,
    map: RowMap,
}

impl SelectionVector {
    /// Creates a view over `source` through `map`.
    #[must_use]
    pub fn new(source: VectorRef, map: RowMap) -> Self {
        Self { source, map }
    }
}

impl ValueVector for SelectionVector {
    fn len(&self) -> usize {
        self.map.output_len(self.source.len())
    }

    fn resolved_type(&self) -> ResolvedType {
        self.source.resolved_type()
    }

    fn is_null(&self, row: usize) -> bool {
        self.source
            .is_null(self.map.source_row(row, self.source.len()))
    }

    fn value(&self, row: usize) -> Value {
        self.source
            .value(self.map.source_row(row, self.source.len()))
    }
}

/// Checks that `filter` is a boolean vector covering `len` rows.
fn check_filter(filter: &dyn ValueVector, len: usize) -> VexResult<()> {
    if filter.len() != len {
        return Err(VexError::invariant(format!(
            "filter vector has {} rows, expected {}",
            filter.len(),
            len
        )));
    }
    let ty = filter.resolved_type();
    if !matches!(ty, ResolvedType::Boolean | ResolvedType::Any) {
        return Err(VexError::invariant(format!(
            "filter vector must be Boolean, got {}",
            ty.name()
        )));
    }
    Ok(())
}

/// Collects the indices where `filter` is definite true (null = false).
fn selected_indices(filter: &dyn ValueVector) -> VexResult<Vec<usize>> {
    let mut indices = Vec::new();
    for row in 0..filter.len() {
        if filter.get_boolean(row)? == Some(true) {
            indices.push(row);
        }
    }
    Ok(indices)
}

/// Returns a zero-copy view of `source` exposing only the rows selected
/// by the boolean `filter` (null treated as false).
pub fn filter_view(source: &TupleVector, filter: &dyn ValueVector) -> VexResult<TupleVector> {
    check_filter(filter, source.row_count())?;
    let indices = selected_indices(filter)?;
    Ok(source.select(Arc::new(indices)))
}

/// Like [`filter_view`], widened to a superset schema.
///
/// Target columns missing from the source (matched by name) are filled
/// with typed nulls.
pub fn filter_view_widened(
    source: &TupleVector,
    filter: &dyn ValueVector,
    target: SchemaRef,
) -> VexResult<TupleVector> {
    let narrow = filter_view(source, filter)?;
    let row_count = narrow.row_count();
    let columns = target
        .columns()
        .iter()
        .map(|column| match source.schema().index_of(&column.name) {
            Some(ordinal) => narrow.column(ordinal).clone(),
            None => {
                Arc::new(ConstantVector::nulls(column.ty.clone(), row_count)) as VectorRef
            }
        })
        .collect();
    TupleVector::new(target, columns, row_count)
}

/// Returns the zero-copy outer×inner cartesian pairing.
///
/// Row `k` of the pairing combines outer row `k / n` with inner row
/// `k % n` where `n` is the inner row count. The schema is the
/// positional concatenation of both schemas.
pub fn cartesian(outer: &TupleVector, inner: &TupleVector) -> VexResult<TupleVector> {
    let m = outer.row_count();
    let n = inner.row_count();
    let schema = Arc::new(resolve::concat(outer.schema(), inner.schema()));

    let mut columns = Vec::with_capacity(outer.column_count() + inner.column_count());
    for column in outer.columns() {
        columns.push(Arc::new(SelectionVector::new(
            column.clone(),
            RowMap::RepeatEach { times: n },
        )) as VectorRef);
    }
    for column in inner.columns() {
        columns.push(Arc::new(SelectionVector::new(
            column.clone(),
            RowMap::Cycle { times: m },
        )) as VectorRef);
    }
    TupleVector::new(schema, columns, m * n)
}

/// Filters an outer×inner cartesian pairing and groups surviving inner
/// rows per outer row as one nested-table column.
///
/// `filter` must be the flat boolean vector of the pairing (`m * n`
/// rows). An outer row with zero surviving matches gets a NULL nested
/// table (not an empty one) and is dropped entirely unless
/// `keep_unmatched` is set (left-outer semantics).
pub fn populate_view(
    outer: &TupleVector,
    inner: &TupleVector,
    filter: &dyn ValueVector,
    populated: SchemaRef,
    keep_unmatched: bool,
) -> VexResult<TupleVector> {
    let m = outer.row_count();
    let n = inner.row_count();
    check_filter(filter, m * n)?;

    let mut kept_outer = Vec::new();
    let mut nested = Vec::new();
    for i in 0..m {
        let mut matches = Vec::new();
        for j in 0..n {
            if filter.get_boolean(i * n + j)? == Some(true) {
                matches.push(j);
            }
        }
        if matches.is_empty() {
            if keep_unmatched {
                kept_outer.push(i);
                nested.push(Value::Null);
            }
        } else {
            kept_outer.push(i);
            nested.push(Value::Table(inner.select(Arc::new(matches))));
        }
    }

    let narrowed = outer.select(Arc::new(kept_outer));
    let nested_ty = ResolvedType::TupleVector(inner.schema().clone());
    let mut columns: Vec<VectorRef> = narrowed.columns().to_vec();
    columns.push(Arc::new(TypedVector::new(nested_ty, nested)));
    TupleVector::new(populated, columns, narrowed.row_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{schema_of, BitSetVector};

    fn source() -> TupleVector {
        let schema = schema_of(&[("a", ResolvedType::Int), ("b", ResolvedType::String)]);
        TupleVector::from_columns(
            schema,
            vec![
                Arc::new(TypedVector::ints([Some(1), Some(2), Some(3)])),
                Arc::new(TypedVector::strings([Some("x"), Some("y"), Some("z")])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn all_true_filter_preserves_source() {
        let batch = source();
        let filtered = filter_view(&batch, &BitSetVector::all_true(3)).unwrap();
        assert_eq!(filtered.row_count(), batch.row_count());
        for col in 0..batch.column_count() {
            for row in 0..batch.row_count() {
                assert_eq!(filtered.value(col, row), batch.value(col, row));
            }
        }
    }

    #[test]
    fn all_false_filter_yields_zero_rows() {
        let filtered = filter_view(&source(), &BitSetVector::all_false(3)).unwrap();
        assert_eq!(filtered.row_count(), 0);
    }

    #[test]
    fn null_filter_rows_are_dropped() {
        let filter = BitSetVector::from_options([Some(true), None, Some(false)]);
        let filtered = filter_view(&source(), &filter).unwrap();
        assert_eq!(filtered.row_count(), 1);
        assert_eq!(filtered.value(0, 0), Value::Int(1));
    }

    #[test]
    fn widened_view_fills_missing_columns_with_nulls() {
        let target = schema_of(&[
            ("a", ResolvedType::Int),
            ("b", ResolvedType::String),
            ("c", ResolvedType::Long),
        ]);
        let widened =
            filter_view_widened(&source(), &BitSetVector::all_true(3), target).unwrap();
        assert_eq!(widened.column_count(), 3);
        assert!(widened.column(2).is_null(0));
        assert_eq!(widened.column(2).resolved_type(), ResolvedType::Long);
    }

    #[test]
    fn cartesian_pairs_every_row() {
        let outer = source();
        let inner_schema = schema_of(&[("c", ResolvedType::Int)]);
        let inner = TupleVector::from_columns(
            inner_schema,
            vec![Arc::new(TypedVector::ints([Some(10), Some(20)]))],
        )
        .unwrap();

        let paired = cartesian(&outer, &inner).unwrap();
        assert_eq!(paired.row_count(), 6);
        assert_eq!(paired.column_count(), 3);
        // Row 3 combines outer row 1 with inner row 1.
        assert_eq!(paired.value(0, 3), Value::Int(2));
        assert_eq!(paired.value(2, 3), Value::Int(20));
    }

    #[test]
    fn populate_groups_matches_per_outer_row() {
        let outer = source();
        let inner_schema = schema_of(&[("c", ResolvedType::Int)]);
        let inner = TupleVector::from_columns(
            inner_schema.clone(),
            vec![Arc::new(TypedVector::ints([Some(10), Some(20)]))],
        )
        .unwrap();
        // Outer row 0 matches both inner rows, row 1 matches none,
        // row 2 matches inner row 1.
        let filter = BitSetVector::from_options([
            Some(true),
            Some(true),
            Some(false),
            Some(false),
            None,
            Some(true),
        ]);
        let populated = Arc::new(resolve::join_schema(
            outer.schema(),
            &inner_schema,
            Some("p"),
        ));

        let flat = populate_view(&outer, &inner, &filter, populated.clone(), false).unwrap();
        assert_eq!(flat.row_count(), 2);
        let first = flat.column(2).get_table(0).unwrap();
        assert_eq!(first.row_count(), 2);
        let second = flat.column(2).get_table(1).unwrap();
        assert_eq!(second.value(0, 0), Value::Int(20));

        let kept = populate_view(&outer, &inner, &filter, populated, true).unwrap();
        assert_eq!(kept.row_count(), 3);
        assert!(kept.column(2).is_null(1));
    }
}
