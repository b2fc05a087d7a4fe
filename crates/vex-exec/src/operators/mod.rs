//! Pull-based relational operators.
//!
//! Every operator implements [`Operator`] and is owned by its parent as
//! an [`OperatorRef`]. The protocol:
//!
//! - `next_batch` produces the next batch, or `None` once drained. After
//!   `None`, further calls keep returning `None`.
//! - `reset` rewinds the operator (and its children) so it can be
//!   executed again; correlated joins reset their inner plan per outer
//!   row.
//! - `close` releases resources exactly once down the whole subtree and
//!   is idempotent. Parents close children on drain, error and early
//!   termination alike.

mod cache;
mod concat;
mod filter;
mod hash_aggregate;
mod hash_match;
mod limit;
mod nested_loop;
mod projection;
mod scan;
mod sort;

pub use cache::CacheExec;
pub use concat::{ConcatenationExec, ConstantScanExec};
pub use filter::FilterExec;
pub use hash_aggregate::{GroupProjection, HashAggregateExec};
pub use hash_match::HashMatchExec;
pub use limit::{LimitCount, LimitExec, MaxRowCountExec};
pub use nested_loop::NestedLoopJoinExec;
pub use projection::ProjectionExec;
pub use scan::{IndexSeekExec, TableScanExec};
pub use sort::{NullOrder, SortExec, SortKey, SortKeySource, SortOrder};

use std::fmt;

use vex_common::VexResult;

use crate::context::ExecutionContext;
use crate::schema::SchemaRef;
use crate::vector::TupleVector;

/// Boxed operator handle, owned by the parent.
pub type OperatorRef = Box<dyn Operator>;

/// A pull-based operator in a physical plan.
pub trait Operator: fmt::Debug {
    /// Compile-time output schema. The empty sentinel or asterisk
    /// columns defer to runtime.
    fn schema(&self) -> SchemaRef;

    /// Produces the next batch, or `None` once drained.
    fn next_batch(&mut self, ctx: &mut ExecutionContext)
        -> VexResult<Option<TupleVector>>;

    /// Rewinds this operator and its children for re-execution.
    fn reset(&mut self) -> VexResult<()>;

    /// Releases resources. Idempotent; cascades to children.
    fn close(&mut self);

    /// Cardinality estimates, when known.
    fn estimates(&self) -> Estimates {
        Estimates::unknown()
    }

    /// One-line description for plan output.
    fn describe(&self) -> String;
}

/// Cardinality estimates an operator exposes to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Estimates {
    /// Estimated row count, if known.
    pub rows: Option<usize>,
    /// Estimated batch count, if known.
    pub batches: Option<usize>,
}

impl Estimates {
    /// No estimate available.
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Exact row count with the given batch size.
    #[must_use]
    pub fn exact(rows: usize, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            rows: Some(rows),
            batches: Some(rows.div_ceil(batch_size)),
        }
    }
}

/// Join flavor shared by the join operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Emit matched pairs only.
    Inner,
    /// Additionally emit unmatched outer rows, inner side NULL.
    Left,
}

impl JoinType {
    /// Returns true for joins keeping unmatched outer rows.
    #[must_use]
    pub fn keeps_unmatched(self) -> bool {
        matches!(self, Self::Left)
    }
}
