//! # vex-exec
//!
//! Vectorized relational query-execution runtime.
//!
//! Given a physical operator tree, the runtime pulls columnar batches from
//! leaf scans, applies joins, aggregation, filtering and sorting, and
//! produces result batches. Execution is single-threaded, synchronous and
//! pull-based: operators produce [`TupleVector`] batches on demand.
//!
//! # Architecture
//!
//! - **Batch model** ([`vector`]): [`TupleVector`] batches of [`ValueVector`]
//!   columns with coercing scalar accessors.
//! - **Schema model** ([`schema`]): compile-time schemas (possibly asterisk)
//!   reconciled against runtime schemas observed from data sources.
//! - **Operators** ([`operators`]): pull-based relational operators bound
//!   together by the [`Operator`] protocol, including nested-loop and hash
//!   equi-joins and hash aggregation.
//! - **Context** ([`context`]): per-execution state such as the outer-tuple
//!   slot for correlated joins, the runtime-schema cache and the abort flag.
//!
//! # Execution model
//!
//! ```ignore
//! let mut ctx = ExecutionContext::default();
//! let mut root = build_plan(...);
//! while let Some(batch) = root.next_batch(&mut ctx)? {
//!     // process batch
//! }
//! root.close();
//! ```

#![warn(clippy::all)]

pub mod context;
pub mod datasource;
pub mod engine;
pub mod expr;
pub mod operators;
pub mod schema;
pub mod vector;
pub mod writer;

pub use context::{BufferAllocator, ExecutionContext, NodeId};
pub use engine::{ExecutionEngine, QueryResult};
pub use expr::{AggregateExpr, ExprRef, VectorExpr};
pub use operators::{Estimates, JoinType, Operator, OperatorRef};
pub use schema::{Column, ColumnKind, ResolvedType, Schema, SchemaRef};
pub use vector::{TupleVector, Value, ValueVector, VectorRef};

// Re-export the foundational crate for downstream convenience.
pub use vex_common::{ErrorCode, ExecutionConfig, VexError, VexResult};
