//! Nested-loop join.

use std::collections::VecDeque;
use std::sync::Arc;

use vex_common::VexResult;

use crate::context::ExecutionContext;
use crate::expr::ExprRef;
use crate::operators::{JoinType, Operator, OperatorRef};
use crate::schema::{resolve, ResolvedType, SchemaRef};
use crate::vector::{
    predicated, BitSetVector, ConstantVector, TupleVector, TypedVector, Value, ValueVector,
    VectorRef,
};

/// Nested-loop join of an outer and an inner plan.
///
/// For every outer batch the inner plan is reset and fully drained;
/// every outer×inner pairing is evaluated against the predicate. Wrap
/// an uncorrelated inner plan in a cache to avoid re-executing it.
///
/// Modes:
/// - **flat**: matched pairs are emitted side by side. A left join
///   additionally emits each unmatched outer row exactly once, inner
///   columns NULL.
/// - **populate**: matched inner rows are grouped per outer row into one
///   nested-table column named by the populate alias. Unmatched outer
///   rows carry NULL there (left join) or are dropped (inner join).
/// - **correlated**: the inner plan reads the current outer row through
///   the context's outer-tuple slot; the join binds it per outer row,
///   resets the inner plan, and restores the previous binding even on
///   error.
///
/// A zero-column single-row outer (the constant-scan seed) with no
/// predicate, inner join, flat and uncorrelated, degenerates to a
/// passthrough of the inner plan.
#[derive(Debug)]
pub struct NestedLoopJoinExec {
    outer: OperatorRef,
    inner: OperatorRef,
    join_type: JoinType,
    predicate: Option<ExprRef>,
    populate: Option<String>,
    outer_references: bool,
    pending: VecDeque<TupleVector>,
    passthrough: Option<bool>,
    inner_schema: Option<SchemaRef>,
    done: bool,
}

impl NestedLoopJoinExec {
    /// Creates an unconditional flat join.
    #[must_use]
    pub fn new(outer: OperatorRef, inner: OperatorRef, join_type: JoinType) -> Self {
        Self {
            outer,
            inner,
            join_type,
            predicate: None,
            populate: None,
            outer_references: false,
            pending: VecDeque::new(),
            passthrough: None,
            inner_schema: None,
            done: false,
        }
    }

    /// Joins on the given predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: ExprRef) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Groups matched inner rows into one nested-table column.
    #[must_use]
    pub fn with_populate(mut self, alias: impl Into<String>) -> Self {
        self.populate = Some(alias.into());
        self
    }

    /// Marks the inner plan as correlated: it reads the outer row from
    /// the context and is re-executed per outer row.
    #[must_use]
    pub fn with_outer_references(mut self) -> Self {
        self.outer_references = true;
        self
    }

    fn resolved_inner_schema(&self) -> SchemaRef {
        self.inner_schema
            .clone()
            .unwrap_or_else(|| self.inner.schema())
    }

    /// Joins one outer batch against a full pass over the inner plan,
    /// queueing output batches.
    fn join_batch(
        &mut self,
        outer_batch: &TupleVector,
        ctx: &mut ExecutionContext,
    ) -> VexResult<()> {
        self.inner.reset()?;
        let m = outer_batch.row_count();
        let mut matched = vec![false; m];
        // Populate mode retains the inner batches and per-row match refs.
        let mut inner_batches: Vec<TupleVector> = Vec::new();
        let mut match_refs: Vec<Vec<(usize, usize)>> = vec![Vec::new(); m];

        while let Some(inner_batch) = self.inner.next_batch(ctx)? {
            ctx.check_abort()?;
            self.inner_schema = Some(inner_batch.schema().clone());
            let n = inner_batch.row_count();
            let paired = predicated::cartesian(outer_batch, &inner_batch)?;
            let mask: VectorRef = match &self.predicate {
                Some(predicate) => predicate.eval(&paired, ctx)?,
                None => Arc::new(BitSetVector::all_true(paired.row_count())),
            };

            if self.populate.is_some() {
                let batch_index = inner_batches.len();
                for i in 0..m {
                    for j in 0..n {
                        if mask.get_boolean(i * n + j)? == Some(true) {
                            match_refs[i].push((batch_index, j));
                            matched[i] = true;
                        }
                    }
                }
                inner_batches.push(inner_batch);
            } else {
                let flat = predicated::filter_view(&paired, mask.as_ref())?;
                if flat.row_count() > 0 {
                    self.pending.push_back(flat);
                }
                for i in 0..m {
                    if matched[i] {
                        continue;
                    }
                    for j in 0..n {
                        if mask.get_boolean(i * n + j)? == Some(true) {
                            matched[i] = true;
                            break;
                        }
                    }
                }
            }
        }

        if let Some(alias) = self.populate.clone() {
            self.emit_populated(outer_batch, &inner_batches, &match_refs, &alias)?;
        } else if self.join_type.keeps_unmatched() {
            self.emit_unmatched(outer_batch, &matched)?;
        }
        Ok(())
    }

    /// Builds the populated output batch for one outer batch.
    fn emit_populated(
        &mut self,
        outer_batch: &TupleVector,
        inner_batches: &[TupleVector],
        match_refs: &[Vec<(usize, usize)>],
        alias: &str,
    ) -> VexResult<()> {
        let inner_schema = self.resolved_inner_schema();
        let mut kept = Vec::new();
        let mut nested = Vec::new();
        for (i, refs) in match_refs.iter().enumerate() {
            if refs.is_empty() {
                if self.join_type.keeps_unmatched() {
                    kept.push(i);
                    nested.push(Value::Null);
                }
            } else {
                let rows: Vec<TupleVector> = refs
                    .iter()
                    .map(|&(batch, row)| inner_batches[batch].row_view(row))
                    .collect();
                kept.push(i);
                nested.push(Value::Table(TupleVector::concat(
                    inner_schema.clone(),
                    &rows,
                )?));
            }
        }
        if kept.is_empty() {
            return Ok(());
        }
        let schema = Arc::new(resolve::join_schema(
            outer_batch.schema(),
            &inner_schema,
            Some(alias),
        ));
        let narrowed = outer_batch.select(Arc::new(kept));
        let mut columns: Vec<VectorRef> = narrowed.columns().to_vec();
        columns.push(Arc::new(TypedVector::new(
            ResolvedType::TupleVector(inner_schema),
            nested,
        )));
        self.pending
            .push_back(TupleVector::new(schema, columns, narrowed.row_count())?);
        Ok(())
    }

    /// Null-extends the unmatched outer rows of a flat left join.
    fn emit_unmatched(
        &mut self,
        outer_batch: &TupleVector,
        matched: &[bool],
    ) -> VexResult<()> {
        let unmatched: Vec<usize> = matched
            .iter()
            .enumerate()
            .filter(|(_, m)| !**m)
            .map(|(i, _)| i)
            .collect();
        if unmatched.is_empty() {
            return Ok(());
        }
        let inner_schema = self.resolved_inner_schema();
        let schema = Arc::new(resolve::concat(outer_batch.schema(), &inner_schema));
        let narrowed = outer_batch.select(Arc::new(unmatched));
        let mut columns: Vec<VectorRef> = narrowed.columns().to_vec();
        for column in inner_schema.columns() {
            columns.push(Arc::new(ConstantVector::nulls(
                column.ty.clone(),
                narrowed.row_count(),
            )));
        }
        self.pending
            .push_back(TupleVector::new(schema, columns, narrowed.row_count())?);
        Ok(())
    }

    /// Runs the correlated protocol: bind the outer row, reset and drain
    /// the inner plan, restore the previous binding.
    fn join_correlated(
        &mut self,
        outer_batch: &TupleVector,
        ctx: &mut ExecutionContext,
    ) -> VexResult<()> {
        for i in 0..outer_batch.row_count() {
            ctx.check_abort()?;
            let row = outer_batch.row_view(i).materialize();
            let previous = ctx.swap_outer_tuple(Some(row.clone()));
            let result = self.join_batch(&row, ctx);
            ctx.swap_outer_tuple(previous);
            result?;
        }
        Ok(())
    }
}

impl Operator for NestedLoopJoinExec {
    fn schema(&self) -> SchemaRef {
        Arc::new(resolve::join_schema(
            &self.outer.schema(),
            &self.resolved_inner_schema(),
            self.populate.as_deref(),
        ))
    }

    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        loop {
            ctx.check_abort()?;
            if let Some(batch) = self.pending.pop_front() {
                return Ok(Some(batch));
            }
            if self.done {
                return Ok(None);
            }
            if self.passthrough == Some(true) {
                match self.inner.next_batch(ctx)? {
                    Some(batch) => {
                        self.inner_schema = Some(batch.schema().clone());
                        return Ok(Some(batch));
                    }
                    None => {
                        self.done = true;
                        return Ok(None);
                    }
                }
            }

            let Some(outer_batch) = self.outer.next_batch(ctx)? else {
                self.done = true;
                continue;
            };
            if self.passthrough.is_none() {
                let pass = outer_batch.column_count() == 0
                    && outer_batch.row_count() == 1
                    && self.join_type == JoinType::Inner
                    && self.predicate.is_none()
                    && self.populate.is_none()
                    && !self.outer_references;
                self.passthrough = Some(pass);
                if pass {
                    continue;
                }
            }
            if self.outer_references {
                self.join_correlated(&outer_batch, ctx)?;
            } else {
                self.join_batch(&outer_batch, ctx)?;
            }
        }
    }

    fn reset(&mut self) -> VexResult<()> {
        self.pending.clear();
        self.passthrough = None;
        self.done = false;
        self.outer.reset()?;
        self.inner.reset()
    }

    fn close(&mut self) {
        self.pending.clear();
        self.done = true;
        self.outer.close();
        self.inner.close();
    }

    fn describe(&self) -> String {
        let mut parts = vec![match self.join_type {
            JoinType::Inner => "inner".to_string(),
            JoinType::Left => "left".to_string(),
        }];
        if let Some(predicate) = &self.predicate {
            parts.push(format!("on: {}", predicate.label()));
        }
        if let Some(alias) = &self.populate {
            parts.push(format!("populate: {alias}"));
        }
        if self.outer_references {
            parts.push("correlated".to_string());
        }
        format!("NestedLoopJoin({})", parts.join(", "))
    }
}
