//! Full sort over the child's output.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use vex_common::{VexError, VexResult};

use crate::context::ExecutionContext;
use crate::expr::ExprRef;
use crate::operators::{Operator, OperatorRef};
use crate::schema::SchemaRef;
use crate::vector::{TupleVector, Value, ValueVector, VectorRef};

/// Sort direction of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Placement of NULLs relative to values for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrder {
    /// NULLs before all values.
    First,
    /// NULLs after all values.
    Last,
    /// Caller does not care. Sorts as [`NullOrder::Last`].
    Undefined,
}

/// Where a sort key takes its values from.
#[derive(Debug, Clone)]
pub enum SortKeySource {
    /// An expression over the input batch.
    Expr(ExprRef),
    /// A 1-based output column ordinal.
    Ordinal(usize),
}

/// One key of a sort specification.
#[derive(Debug, Clone)]
pub struct SortKey {
    /// Value source.
    pub source: SortKeySource,
    /// Direction.
    pub order: SortOrder,
    /// NULL placement.
    pub null_order: NullOrder,
}

impl SortKey {
    /// Ascending key over an expression, NULL placement unspecified.
    #[must_use]
    pub fn asc(expr: ExprRef) -> Self {
        Self {
            source: SortKeySource::Expr(expr),
            order: SortOrder::Ascending,
            null_order: NullOrder::Undefined,
        }
    }

    /// Descending key over an expression, NULL placement unspecified.
    #[must_use]
    pub fn desc(expr: ExprRef) -> Self {
        Self {
            source: SortKeySource::Expr(expr),
            order: SortOrder::Descending,
            null_order: NullOrder::Undefined,
        }
    }

    fn label(&self) -> String {
        let source = match &self.source {
            SortKeySource::Expr(expr) => expr.label(),
            SortKeySource::Ordinal(ordinal) => ordinal.to_string(),
        };
        let direction = match self.order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        format!("{source} {direction}")
    }
}

/// Materializing sort.
///
/// Drains and buffers the whole child output, sorts it stably by the
/// given keys, and re-emits it in batches of the configured size. The
/// child is closed as soon as it is drained.
#[derive(Debug)]
pub struct SortExec {
    child: OperatorRef,
    keys: Vec<SortKey>,
    pending: Option<VecDeque<TupleVector>>,
}

impl SortExec {
    /// Sorts `child` by `keys`, most significant first.
    #[must_use]
    pub fn new(child: OperatorRef, keys: Vec<SortKey>) -> Self {
        Self {
            child,
            keys,
            pending: None,
        }
    }

    fn key_vector(
        &self,
        key: &SortKey,
        data: &TupleVector,
        ctx: &mut ExecutionContext,
    ) -> VexResult<VectorRef> {
        match &key.source {
            SortKeySource::Expr(expr) => expr.eval(data, ctx),
            SortKeySource::Ordinal(ordinal) => {
                if *ordinal == 0 || *ordinal > data.column_count() {
                    return Err(VexError::invariant(format!(
                        "sort ordinal {} out of range 1..={}",
                        ordinal,
                        data.column_count()
                    )));
                }
                Ok(data.column(ordinal - 1).clone())
            }
        }
    }

    fn sort(&mut self, ctx: &mut ExecutionContext) -> VexResult<VecDeque<TupleVector>> {
        let mut batches = Vec::new();
        let mut schema: Option<SchemaRef> = None;
        while let Some(batch) = self.child.next_batch(ctx)? {
            ctx.check_abort()?;
            schema = Some(batch.schema().clone());
            batches.push(batch);
        }
        self.child.close();

        let Some(schema) = schema else {
            return Ok(VecDeque::new());
        };
        let data = TupleVector::concat(schema, &batches)?;
        drop(batches);

        let key_vectors = self
            .keys
            .iter()
            .map(|key| self.key_vector(key, &data, ctx))
            .collect::<VexResult<Vec<_>>>()?;

        let mut indices = ctx.allocator().alloc_indices(data.row_count());
        indices.extend(0..data.row_count());
        indices.sort_by(|&a, &b| {
            for (key, vector) in self.keys.iter().zip(&key_vectors) {
                let ordering = compare_rows(key, vector.value(a), vector.value(b));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        let sorted = data.select(Arc::new(indices));
        let mut pending = VecDeque::new();
        let batch_size = ctx.batch_size();
        let mut start = 0;
        while start < sorted.row_count() {
            let end = (start + batch_size).min(sorted.row_count());
            let slice: Vec<usize> = (start..end).collect();
            pending.push_back(sorted.select(Arc::new(slice)).materialize());
            start = end;
        }
        Ok(pending)
    }
}

/// Compares two key values under the key's direction and NULL placement.
fn compare_rows(key: &SortKey, a: Value, b: Value) -> Ordering {
    let ordering = match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => match key.null_order {
            NullOrder::First => return Ordering::Less,
            NullOrder::Last | NullOrder::Undefined => return Ordering::Greater,
        },
        (false, true) => match key.null_order {
            NullOrder::First => return Ordering::Greater,
            NullOrder::Last | NullOrder::Undefined => return Ordering::Less,
        },
        (false, false) => a.compare(&b).unwrap_or(Ordering::Equal),
    };
    match key.order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    }
}

impl Operator for SortExec {
    fn schema(&self) -> SchemaRef {
        self.child.schema()
    }

    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        ctx.check_abort()?;
        if self.pending.is_none() {
            let sorted = self.sort(ctx)?;
            self.pending = Some(sorted);
        }
        Ok(self.pending.as_mut().and_then(VecDeque::pop_front))
    }

    fn reset(&mut self) -> VexResult<()> {
        self.pending = None;
        self.child.reset()
    }

    fn close(&mut self) {
        self.pending = None;
        self.child.close();
    }

    fn describe(&self) -> String {
        let keys: Vec<String> = self.keys.iter().map(SortKey::label).collect();
        format!("Sort({})", keys.join(", "))
    }
}
