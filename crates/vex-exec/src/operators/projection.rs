//! Column projection and expression evaluation.

use std::sync::Arc;

use vex_common::VexResult;

use crate::context::ExecutionContext;
use crate::expr::ExprRef;
use crate::operators::{Estimates, Operator, OperatorRef};
use crate::schema::{Column, Schema, SchemaRef};
use crate::vector::{TupleVector, VectorRef};

/// Evaluates one expression per output column.
///
/// Output types unknown at compile time surface as `Any` and are
/// refined from the first produced batch.
#[derive(Debug)]
pub struct ProjectionExec {
    child: OperatorRef,
    projections: Vec<(String, ExprRef)>,
    compile_schema: SchemaRef,
    resolved: Option<SchemaRef>,
}

impl ProjectionExec {
    /// Projects `child` through the named expressions.
    #[must_use]
    pub fn new(child: OperatorRef, projections: Vec<(String, ExprRef)>) -> Self {
        let columns = projections
            .iter()
            .map(|(name, expr)| Column::new(name.clone(), expr.resolved_type()))
            .collect();
        let compile_schema = Arc::new(Schema::new(columns));
        Self {
            child,
            projections,
            compile_schema,
            resolved: None,
        }
    }
}

impl Operator for ProjectionExec {
    fn schema(&self) -> SchemaRef {
        self.resolved
            .clone()
            .unwrap_or_else(|| self.compile_schema.clone())
    }

    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        let Some(batch) = self.child.next_batch(ctx)? else {
            return Ok(None);
        };
        let columns = self
            .projections
            .iter()
            .map(|(_, expr)| expr.eval(&batch, ctx))
            .collect::<VexResult<Vec<VectorRef>>>()?;
        let projected =
            TupleVector::new(self.compile_schema.clone(), columns, batch.row_count())?;
        let resolved = match &self.resolved {
            Some(schema) => schema.clone(),
            None => {
                let schema = projected.refined_schema();
                self.resolved = Some(schema.clone());
                schema
            }
        };
        Ok(Some(projected.with_schema(resolved)?))
    }

    fn reset(&mut self) -> VexResult<()> {
        self.child.reset()
    }

    fn close(&mut self) {
        self.child.close();
    }

    fn estimates(&self) -> Estimates {
        self.child.estimates()
    }

    fn describe(&self) -> String {
        let labels: Vec<String> = self
            .projections
            .iter()
            .map(|(name, expr)| format!("{name}: {}", expr.label()))
            .collect();
        format!("Projection({})", labels.join(", "))
    }
}
