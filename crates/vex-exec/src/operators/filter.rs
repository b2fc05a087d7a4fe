//! Row filtering.

use vex_common::VexResult;

use crate::context::ExecutionContext;
use crate::expr::ExprRef;
use crate::operators::{Operator, OperatorRef};
use crate::schema::SchemaRef;
use crate::vector::{predicated, TupleVector};

/// Keeps the rows where the predicate is definite true.
///
/// NULL predicate results drop the row, same as false. Batches filtered
/// down to zero rows are skipped, never emitted.
#[derive(Debug)]
pub struct FilterExec {
    child: OperatorRef,
    predicate: ExprRef,
}

impl FilterExec {
    /// Filters `child` by `predicate`.
    #[must_use]
    pub fn new(child: OperatorRef, predicate: ExprRef) -> Self {
        Self { child, predicate }
    }
}

impl Operator for FilterExec {
    fn schema(&self) -> SchemaRef {
        self.child.schema()
    }

    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        loop {
            ctx.check_abort()?;
            let Some(batch) = self.child.next_batch(ctx)? else {
                return Ok(None);
            };
            let mask = self.predicate.eval(&batch, ctx)?;
            let filtered = predicated::filter_view(&batch, mask.as_ref())?;
            if filtered.row_count() > 0 {
                return Ok(Some(filtered));
            }
        }
    }

    fn reset(&mut self) -> VexResult<()> {
        self.child.reset()
    }

    fn close(&mut self) {
        self.child.close();
    }

    fn describe(&self) -> String {
        format!("Filter({})", self.predicate.label())
    }
}
