//! Plan execution entry points.

use std::time::Instant;

use tracing::debug;
use vex_common::{ExecutionConfig, VexResult};

use crate::context::ExecutionContext;
use crate::operators::Operator;
use crate::schema::SchemaRef;
use crate::vector::TupleVector;
use crate::writer::{write_batch, OutputWriter};

/// A fully drained query result.
#[derive(Debug)]
pub struct QueryResult {
    /// Resolved output schema.
    pub schema: SchemaRef,
    /// Result batches, in order.
    pub batches: Vec<TupleVector>,
    /// Total row count across batches.
    pub total_rows: usize,
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
}

/// Executes operator trees against fresh contexts.
///
/// The engine guarantees the close discipline at the root: the tree is
/// closed exactly once whether execution drains, fails or is cancelled.
#[derive(Debug, Default)]
pub struct ExecutionEngine {
    config: ExecutionConfig,
}

impl ExecutionEngine {
    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    /// Creates a context carrying this engine's configuration.
    #[must_use]
    pub fn new_context(&self) -> ExecutionContext {
        ExecutionContext::new(self.config.clone())
    }

    /// Drains `root` to completion, collecting all batches.
    pub fn execute(
        &self,
        root: &mut dyn Operator,
        ctx: &mut ExecutionContext,
    ) -> VexResult<QueryResult> {
        let started = Instant::now();
        if self.config.trace_operators {
            debug!(plan = %root.describe(), "executing plan");
        }
        let outcome = drain(root, ctx);
        root.close();
        let batches = outcome?;

        let schema = batches
            .first()
            .map_or_else(|| root.schema(), |b| b.schema().clone());
        let total_rows = batches.iter().map(TupleVector::row_count).sum();
        let execution_time_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(rows = total_rows, elapsed_ms = execution_time_ms, "query drained");
        Ok(QueryResult {
            schema,
            batches,
            total_rows,
            execution_time_ms,
        })
    }

    /// Streams `root` through an output writer, returning the row count.
    pub fn write(
        &self,
        root: &mut dyn Operator,
        writer: &mut dyn OutputWriter,
        ctx: &mut ExecutionContext,
    ) -> VexResult<usize> {
        let outcome = stream(root, writer, ctx);
        root.close();
        outcome
    }
}

fn drain(root: &mut dyn Operator, ctx: &mut ExecutionContext) -> VexResult<Vec<TupleVector>> {
    let mut batches = Vec::new();
    while let Some(batch) = root.next_batch(ctx)? {
        batches.push(batch);
    }
    Ok(batches)
}

fn stream(
    root: &mut dyn Operator,
    writer: &mut dyn OutputWriter,
    ctx: &mut ExecutionContext,
) -> VexResult<usize> {
    let mut rows = 0;
    let mut initialized = false;
    while let Some(batch) = root.next_batch(ctx)? {
        if !initialized {
            writer.init(batch.schema())?;
            initialized = true;
        }
        rows += batch.row_count();
        write_batch(writer, &batch)?;
    }
    if !initialized {
        writer.init(&root.schema())?;
    }
    Ok(rows)
}
