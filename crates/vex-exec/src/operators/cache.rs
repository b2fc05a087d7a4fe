//! Result caching for repeatedly executed subplans.

use std::sync::Arc;

use tracing::debug;
use vex_common::VexResult;

use crate::context::ExecutionContext;
use crate::operators::{Estimates, Operator, OperatorRef};
use crate::schema::SchemaRef;
use crate::vector::TupleVector;

/// Materializes the child's output once and replays it on every reset.
///
/// The child executes exactly once, no matter how many times the parent
/// resets and re-drains this operator. Joins wrap their inner plan in a
/// cache when it is uncorrelated but repeatedly executed.
#[derive(Debug)]
pub struct CacheExec {
    child: OperatorRef,
    cached: Option<TupleVector>,
    cursor: usize,
}

impl CacheExec {
    /// Caches the output of `child`.
    #[must_use]
    pub fn new(child: OperatorRef) -> Self {
        Self {
            child,
            cached: None,
            cursor: 0,
        }
    }

    fn materialize(&mut self, ctx: &mut ExecutionContext) -> VexResult<()> {
        if self.cached.is_none() {
            let mut batches = Vec::new();
            let mut schema: Option<SchemaRef> = None;
            while let Some(batch) = self.child.next_batch(ctx)? {
                ctx.check_abort()?;
                schema = Some(batch.schema().clone());
                batches.push(batch);
            }
            self.child.close();
            let schema = schema.unwrap_or_else(|| self.child.schema());
            let data = TupleVector::concat(schema, &batches)?;
            debug!(rows = data.row_count(), "subplan cached");
            self.cached = Some(data);
        }
        Ok(())
    }
}

impl Operator for CacheExec {
    fn schema(&self) -> SchemaRef {
        self.cached
            .as_ref()
            .map_or_else(|| self.child.schema(), |c| c.schema().clone())
    }

    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        ctx.check_abort()?;
        let batch_size = ctx.batch_size();
        self.materialize(ctx)?;
        let Some(data) = self.cached.as_ref() else {
            return Ok(None);
        };
        if self.cursor >= data.row_count() {
            return Ok(None);
        }
        let end = (self.cursor + batch_size).min(data.row_count());
        let indices: Vec<usize> = (self.cursor..end).collect();
        let batch = data.select(Arc::new(indices));
        self.cursor = end;
        Ok(Some(batch))
    }

    fn reset(&mut self) -> VexResult<()> {
        // Rewind only. The cached data survives, the child is not rerun.
        self.cursor = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.cached = None;
        self.child.close();
    }

    fn estimates(&self) -> Estimates {
        match &self.cached {
            Some(data) => Estimates {
                rows: Some(data.row_count()),
                batches: None,
            },
            None => self.child.estimates(),
        }
    }

    fn describe(&self) -> String {
        "Cache".to_string()
    }
}
