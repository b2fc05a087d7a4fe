//! Row-count limiting and enforcement.

use std::sync::Arc;

use vex_common::{VexError, VexResult};

use crate::context::ExecutionContext;
use crate::expr::ExprRef;
use crate::operators::{Estimates, Operator, OperatorRef};
use crate::schema::SchemaRef;
use crate::vector::{TupleVector, ValueVector};

/// Where a limit takes its row count from.
#[derive(Debug, Clone)]
pub enum LimitCount {
    /// A fixed count.
    Constant(usize),
    /// An expression evaluated once, before the first batch is pulled.
    Expr(ExprRef),
}

impl LimitCount {
    fn resolve(&self, ctx: &mut ExecutionContext) -> VexResult<usize> {
        match self {
            Self::Constant(count) => Ok(*count),
            Self::Expr(expr) => {
                let seed = TupleVector::constant_scan();
                let value = expr.eval(&seed, ctx)?.get_long(0)?.ok_or_else(|| {
                    VexError::invariant("limit expression evaluated to NULL")
                })?;
                usize::try_from(value).map_err(|_| {
                    VexError::invariant(format!("limit expression evaluated to {value}"))
                })
            }
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Constant(count) => count.to_string(),
            Self::Expr(expr) => expr.label(),
        }
    }
}

/// Emits at most N rows, then closes the child immediately.
///
/// The early close releases scan resources as soon as the limit is
/// reached instead of waiting for the plan to finish.
#[derive(Debug)]
pub struct LimitExec {
    child: OperatorRef,
    count: LimitCount,
    remaining: Option<usize>,
    done: bool,
}

impl LimitExec {
    /// Limits `child` to `count` rows.
    #[must_use]
    pub fn new(child: OperatorRef, count: LimitCount) -> Self {
        Self {
            child,
            count,
            remaining: None,
            done: false,
        }
    }
}

impl Operator for LimitExec {
    fn schema(&self) -> SchemaRef {
        self.child.schema()
    }

    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        if self.done {
            return Ok(None);
        }
        let remaining = match self.remaining {
            Some(remaining) => remaining,
            None => {
                let count = self.count.resolve(ctx)?;
                self.remaining = Some(count);
                count
            }
        };
        if remaining == 0 {
            self.done = true;
            self.child.close();
            return Ok(None);
        }
        let Some(batch) = self.child.next_batch(ctx)? else {
            self.done = true;
            self.child.close();
            return Ok(None);
        };
        if batch.row_count() <= remaining {
            self.remaining = Some(remaining - batch.row_count());
            if batch.row_count() == remaining {
                self.done = true;
                self.child.close();
            }
            return Ok(Some(batch));
        }
        let indices: Vec<usize> = (0..remaining).collect();
        self.remaining = Some(0);
        self.done = true;
        self.child.close();
        Ok(Some(batch.select(Arc::new(indices))))
    }

    fn reset(&mut self) -> VexResult<()> {
        self.remaining = None;
        self.done = false;
        self.child.reset()
    }

    fn close(&mut self) {
        self.done = true;
        self.child.close();
    }

    fn estimates(&self) -> Estimates {
        let child = self.child.estimates();
        match (&self.count, child.rows) {
            (LimitCount::Constant(count), Some(rows)) => Estimates {
                rows: Some(rows.min(*count)),
                batches: child.batches,
            },
            (LimitCount::Constant(count), None) => Estimates {
                rows: Some(*count),
                batches: None,
            },
            _ => child,
        }
    }

    fn describe(&self) -> String {
        format!("Limit({})", self.count.label())
    }
}

/// Fails the query when the child produces more than N rows.
///
/// Guards plans whose correctness depends on a bounded subtree, such as
/// scalar subqueries.
#[derive(Debug)]
pub struct MaxRowCountExec {
    child: OperatorRef,
    max_rows: usize,
    seen: usize,
}

impl MaxRowCountExec {
    /// Enforces `max_rows` on `child`.
    #[must_use]
    pub fn new(child: OperatorRef, max_rows: usize) -> Self {
        Self {
            child,
            max_rows,
            seen: 0,
        }
    }
}

impl Operator for MaxRowCountExec {
    fn schema(&self) -> SchemaRef {
        self.child.schema()
    }

    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        let Some(batch) = self.child.next_batch(ctx)? else {
            return Ok(None);
        };
        self.seen += batch.row_count();
        if self.seen > self.max_rows {
            return Err(VexError::RowCountExceeded {
                limit: self.max_rows,
            });
        }
        Ok(Some(batch))
    }

    fn reset(&mut self) -> VexResult<()> {
        self.seen = 0;
        self.child.reset()
    }

    fn close(&mut self) {
        self.child.close();
    }

    fn describe(&self) -> String {
        format!("MaxRowCount({})", self.max_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NodeId;
    use crate::datasource::MemoryDataSource;
    use crate::expr::LiteralExpr;
    use crate::operators::TableScanExec;
    use crate::schema::ResolvedType;
    use crate::vector::{schema_of, TypedVector, Value};

    fn scan(n: i32) -> (OperatorRef, Arc<MemoryDataSource>) {
        let schema = schema_of(&[("x", ResolvedType::Int)]);
        let source = MemoryDataSource::new(
            TupleVector::from_columns(
                schema,
                vec![Arc::new(TypedVector::ints((0..n).map(Some)))],
            )
            .unwrap(),
        );
        (
            Box::new(TableScanExec::new(NodeId(0), source.clone())),
            source,
        )
    }

    #[test]
    fn limit_truncates_and_closes_the_child_early() {
        let (child, source) = scan(10);
        let mut limit = LimitExec::new(child, LimitCount::Constant(3));
        let mut ctx = ExecutionContext::new(vex_common::ExecutionConfig::with_batch_size(4));

        let batch = limit.next_batch(&mut ctx).unwrap().unwrap();
        assert_eq!(batch.row_count(), 3);
        // The child is closed as soon as the limit is hit.
        assert_eq!(source.close_count(), 1);
        assert!(limit.next_batch(&mut ctx).unwrap().is_none());
        limit.close();
        assert_eq!(source.close_count(), 1);
    }

    #[test]
    fn limit_zero_emits_nothing() {
        let (child, source) = scan(5);
        let mut limit = LimitExec::new(child, LimitCount::Constant(0));
        let mut ctx = ExecutionContext::default();
        assert!(limit.next_batch(&mut ctx).unwrap().is_none());
        limit.close();
        assert_eq!(source.open_count(), 0);
    }

    #[test]
    fn limit_count_from_expression() {
        let (child, _) = scan(5);
        let mut limit =
            LimitExec::new(child, LimitCount::Expr(LiteralExpr::new(Value::Long(2))));
        let mut ctx = ExecutionContext::default();
        let batch = limit.next_batch(&mut ctx).unwrap().unwrap();
        assert_eq!(batch.row_count(), 2);
        limit.close();
    }

    #[test]
    fn negative_limit_expression_is_rejected() {
        let (child, _) = scan(5);
        let mut limit =
            LimitExec::new(child, LimitCount::Expr(LiteralExpr::new(Value::Long(-1))));
        let mut ctx = ExecutionContext::default();
        assert!(limit.next_batch(&mut ctx).is_err());
        limit.close();
    }

    #[test]
    fn max_row_count_fails_past_the_bound() {
        let (child, _) = scan(5);
        let mut guard = MaxRowCountExec::new(child, 4);
        let mut ctx = ExecutionContext::default();
        let err = loop {
            match guard.next_batch(&mut ctx) {
                Ok(Some(_)) => {}
                Ok(None) => panic!("expected row count violation"),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, VexError::RowCountExceeded { limit: 4 }));
        guard.close();
    }

    #[test]
    fn max_row_count_passes_bounded_input() {
        let (child, _) = scan(4);
        let mut guard = MaxRowCountExec::new(child, 4);
        let mut ctx = ExecutionContext::default();
        let mut total = 0;
        while let Some(batch) = guard.next_batch(&mut ctx).unwrap() {
            total += batch.row_count();
        }
        assert_eq!(total, 4);
        guard.close();
    }
}
