//! The columnar batch type.

use std::sync::Arc;

use vex_common::{VexError, VexResult};

use crate::schema::{Column, ResolvedType, Schema, SchemaRef};
use crate::vector::predicated::{RowMap, SelectionVector};
use crate::vector::{TypedVector, Value, ValueVector, VectorRef};

/// One immutable batch of rows with a fixed schema.
///
/// Invariants, checked at construction: every column has exactly
/// `row_count` rows, and the schema has exactly one column per vector.
/// Cloning a batch is cheap; the column vectors are shared.
#[derive(Debug, Clone)]
pub struct TupleVector {
    schema: SchemaRef,
    columns: Vec<VectorRef>,
    row_count: usize,
}

impl TupleVector {
    /// Creates a new batch, validating the size invariants.
    ///
    /// The explicit `row_count` allows zero-column batches (the seed row
    /// of a constant scan).
    pub fn new(
        schema: SchemaRef,
        columns: Vec<VectorRef>,
        row_count: usize,
    ) -> VexResult<Self> {
        if schema.len() != columns.len() {
            return Err(VexError::invariant(format!(
                "schema has {} columns but batch has {}",
                schema.len(),
                columns.len()
            )));
        }
        for (i, column) in columns.iter().enumerate() {
            if column.len() != row_count {
                return Err(VexError::invariant(format!(
                    "column {} has {} rows, expected {}",
                    i,
                    column.len(),
                    row_count
                )));
            }
        }
        Ok(Self {
            schema,
            columns,
            row_count,
        })
    }

    /// Creates a batch taking the row count from the first column.
    pub fn from_columns(schema: SchemaRef, columns: Vec<VectorRef>) -> VexResult<Self> {
        let row_count = columns.first().map_or(0, |c| c.len());
        Self::new(schema, columns, row_count)
    }

    /// Creates an empty batch with the given schema.
    #[must_use]
    pub fn empty(schema: SchemaRef) -> Self {
        let columns = schema
            .columns()
            .iter()
            .map(|c| {
                Arc::new(TypedVector::new(c.ty.clone(), Vec::new())) as VectorRef
            })
            .collect();
        Self {
            schema,
            columns,
            row_count: 0,
        }
    }

    /// The zero-column single row used as the seed for scalar-only
    /// queries.
    #[must_use]
    pub fn constant_scan() -> Self {
        Self {
            schema: Arc::new(Schema::empty()),
            columns: Vec::new(),
            row_count: 1,
        }
    }

    /// Returns the schema of this batch.
    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Returns the number of addressable columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns the column at `ordinal`.
    #[must_use]
    pub fn column(&self, ordinal: usize) -> &VectorRef {
        &self.columns[ordinal]
    }

    /// Returns all columns.
    #[must_use]
    pub fn columns(&self) -> &[VectorRef] {
        &self.columns
    }

    /// Returns the value at (`ordinal`, `row`).
    #[must_use]
    pub fn value(&self, ordinal: usize, row: usize) -> Value {
        self.columns[ordinal].value(row)
    }

    /// Re-stamps this batch with another schema of the same width.
    pub fn with_schema(&self, schema: SchemaRef) -> VexResult<Self> {
        Self::new(schema, self.columns.clone(), self.row_count)
    }

    /// Returns a zero-copy view containing the given rows, in order.
    #[must_use]
    pub fn select(&self, indices: Arc<Vec<usize>>) -> Self {
        self.select_map(RowMap::Indices(indices))
    }

    /// Returns a zero-copy view remapping rows through `map`.
    #[must_use]
    pub fn select_map(&self, map: RowMap) -> Self {
        let row_count = map.output_len(self.row_count);
        let columns = self
            .columns
            .iter()
            .map(|c| Arc::new(SelectionVector::new(c.clone(), map.clone())) as VectorRef)
            .collect();
        Self {
            schema: self.schema.clone(),
            columns,
            row_count,
        }
    }

    /// Returns a single-row zero-copy view.
    #[must_use]
    pub fn row_view(&self, row: usize) -> Self {
        self.select(Arc::new(vec![row]))
    }

    /// Materializes all columns into owned [`TypedVector`]s, collapsing
    /// any view chains.
    #[must_use]
    pub fn materialize(&self) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let values = (0..self.row_count).map(|row| c.value(row)).collect();
                Arc::new(TypedVector::new(c.resolved_type(), values)) as VectorRef
            })
            .collect();
        Self {
            schema: self.schema.clone(),
            columns,
            row_count: self.row_count,
        }
    }

    /// Concatenates batches into one materialized batch.
    ///
    /// All batches must share the given schema's width. An empty slice
    /// yields an empty batch.
    pub fn concat(schema: SchemaRef, batches: &[TupleVector]) -> VexResult<Self> {
        if batches.is_empty() {
            return Ok(Self::empty(schema));
        }
        let width = schema.len();
        let total_rows: usize = batches.iter().map(TupleVector::row_count).sum();
        let mut columns = Vec::with_capacity(width);
        for ordinal in 0..width {
            let mut values = Vec::with_capacity(total_rows);
            let mut ty = ResolvedType::Any;
            for batch in batches {
                if batch.column_count() != width {
                    return Err(VexError::invariant(format!(
                        "cannot concatenate batch with {} columns into schema of {}",
                        batch.column_count(),
                        width
                    )));
                }
                let column = batch.column(ordinal);
                if ty.is_any() {
                    ty = column.resolved_type();
                }
                for row in 0..batch.row_count() {
                    values.push(column.value(row));
                }
            }
            columns.push(Arc::new(TypedVector::new(ty, values)) as VectorRef);
        }
        Self::new(schema, columns, total_rows)
    }

    /// Returns the schema with deferred `Any` column types replaced by
    /// the concrete types observed in the column vectors.
    #[must_use]
    pub fn refined_schema(&self) -> SchemaRef {
        let needs_refine = self
            .schema
            .columns()
            .iter()
            .zip(&self.columns)
            .any(|(c, v)| c.ty.is_any() && !v.resolved_type().is_any());
        if !needs_refine {
            return self.schema.clone();
        }
        let columns = self
            .schema
            .columns()
            .iter()
            .zip(&self.columns)
            .map(|(c, v)| {
                if c.ty.is_any() && !v.resolved_type().is_any() {
                    let mut refined = c.clone();
                    refined.ty = v.resolved_type();
                    refined
                } else {
                    c.clone()
                }
            })
            .collect();
        Arc::new(Schema::new(columns))
    }
}

/// Builds a schema ref from (name, type) pairs. Test and fixture helper.
#[must_use]
pub fn schema_of(columns: &[(&str, ResolvedType)]) -> SchemaRef {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|(name, ty)| Column::new(*name, ty.clone()))
            .collect(),
    ))
}
