//! Sequential concatenation and the constant-scan seed.

use std::sync::Arc;

use vex_common::VexResult;

use crate::context::ExecutionContext;
use crate::operators::{Estimates, Operator, OperatorRef};
use crate::schema::{Schema, SchemaRef};
use crate::vector::TupleVector;

/// Emits every child's output in order, one child at a time.
///
/// Each child is closed as soon as it is drained. Children must agree
/// on output width; the first child's schema stands for all of them.
#[derive(Debug)]
pub struct ConcatenationExec {
    children: Vec<OperatorRef>,
    current: usize,
}

impl ConcatenationExec {
    /// Concatenates `children` in order.
    #[must_use]
    pub fn new(children: Vec<OperatorRef>) -> Self {
        Self {
            children,
            current: 0,
        }
    }
}

impl Operator for ConcatenationExec {
    fn schema(&self) -> SchemaRef {
        self.children
            .first()
            .map_or_else(|| Arc::new(Schema::empty()), |c| c.schema())
    }

    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        while self.current < self.children.len() {
            ctx.check_abort()?;
            let child = &mut self.children[self.current];
            match child.next_batch(ctx)? {
                Some(batch) => return Ok(Some(batch)),
                None => {
                    child.close();
                    self.current += 1;
                }
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> VexResult<()> {
        self.current = 0;
        for child in &mut self.children {
            child.reset()?;
        }
        Ok(())
    }

    fn close(&mut self) {
        for child in &mut self.children {
            child.close();
        }
        self.current = self.children.len();
    }

    fn estimates(&self) -> Estimates {
        let mut rows = Some(0usize);
        let mut batches = Some(0usize);
        for child in &self.children {
            let estimate = child.estimates();
            rows = rows.zip(estimate.rows).map(|(a, b)| a + b);
            batches = batches.zip(estimate.batches).map(|(a, b)| a + b);
        }
        Estimates { rows, batches }
    }

    fn describe(&self) -> String {
        format!("Concatenation({} children)", self.children.len())
    }
}

/// Emits the one-row, zero-column seed batch exactly once.
///
/// Roots plans without a table source: a projection above this seed
/// evaluates scalar expressions once.
#[derive(Debug, Default)]
pub struct ConstantScanExec {
    emitted: bool,
}

impl ConstantScanExec {
    /// Creates the seed scan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operator for ConstantScanExec {
    fn schema(&self) -> SchemaRef {
        Arc::new(Schema::empty())
    }

    fn next_batch(
        &mut self,
        _ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        Ok(Some(TupleVector::constant_scan()))
    }

    fn reset(&mut self) -> VexResult<()> {
        self.emitted = false;
        Ok(())
    }

    fn close(&mut self) {
        self.emitted = true;
    }

    fn estimates(&self) -> Estimates {
        Estimates::exact(1, 1)
    }

    fn describe(&self) -> String {
        "ConstantScan".to_string()
    }
}
