//! Per-query execution state shared down the operator tree.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use vex_common::{ExecutionConfig, VexError, VexResult};

use crate::schema::SchemaRef;
use crate::vector::{TupleVector, Value};

/// Identifier of a plan node, unique within one plan.
///
/// Used to key per-node runtime state such as resolved schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Tracks buffer allocations made while executing a query.
///
/// Operators route their working buffers through the allocator so a
/// query's memory churn is observable in one place.
#[derive(Debug, Default)]
pub struct BufferAllocator {
    value_buffers: AtomicU64,
    values_allocated: AtomicU64,
    index_buffers: AtomicU64,
    indices_allocated: AtomicU64,
}

impl BufferAllocator {
    /// Creates a fresh allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a value buffer of the given capacity.
    #[must_use]
    pub fn alloc_values(&self, capacity: usize) -> Vec<Value> {
        self.value_buffers.fetch_add(1, Ordering::Relaxed);
        self.values_allocated
            .fetch_add(capacity as u64, Ordering::Relaxed);
        Vec::with_capacity(capacity)
    }

    /// Allocates a row-index buffer of the given capacity.
    #[must_use]
    pub fn alloc_indices(&self, capacity: usize) -> Vec<usize> {
        self.index_buffers.fetch_add(1, Ordering::Relaxed);
        self.indices_allocated
            .fetch_add(capacity as u64, Ordering::Relaxed);
        Vec::with_capacity(capacity)
    }

    /// Returns (value buffers, value slots, index buffers, index slots)
    /// allocated so far.
    #[must_use]
    pub fn stats(&self) -> (u64, u64, u64, u64) {
        (
            self.value_buffers.load(Ordering::Relaxed),
            self.values_allocated.load(Ordering::Relaxed),
            self.index_buffers.load(Ordering::Relaxed),
            self.indices_allocated.load(Ordering::Relaxed),
        )
    }
}

/// Shared handle to runtime-resolved schemas, keyed by plan node.
pub type RuntimeSchemaCache = Arc<RwLock<HashMap<NodeId, SchemaRef>>>;

/// Mutable state threaded through `next_batch` calls.
///
/// The context carries the execution configuration, the allocator, the
/// cooperative abort flag, the runtime schema cache, and the current
/// outer tuple slot used by correlated inner plans.
#[derive(Debug)]
pub struct ExecutionContext {
    config: ExecutionConfig,
    allocator: Arc<BufferAllocator>,
    runtime_schemas: RuntimeSchemaCache,
    outer_tuple: Option<TupleVector>,
    abort: Arc<AtomicBool>,
}

impl ExecutionContext {
    /// Creates a context with the given configuration.
    #[must_use]
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            allocator: Arc::new(BufferAllocator::new()),
            runtime_schemas: Arc::new(RwLock::new(HashMap::new())),
            outer_tuple: None,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the execution configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Target batch size for operators that build batches.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Returns the buffer allocator.
    #[must_use]
    pub fn allocator(&self) -> &BufferAllocator {
        &self.allocator
    }

    /// Installs a new outer tuple for a correlated inner plan, returning
    /// the previous one. Callers restore the previous value when the
    /// inner plan is drained, including on error paths.
    pub fn swap_outer_tuple(&mut self, outer: Option<TupleVector>) -> Option<TupleVector> {
        std::mem::replace(&mut self.outer_tuple, outer)
    }

    /// Returns the current outer tuple, if a correlated plan is active.
    #[must_use]
    pub fn outer_tuple(&self) -> Option<&TupleVector> {
        self.outer_tuple.as_ref()
    }

    /// Records the runtime-resolved schema for a plan node.
    pub fn cache_runtime_schema(&self, node: NodeId, schema: SchemaRef) {
        self.runtime_schemas.write().insert(node, schema);
    }

    /// Returns the runtime-resolved schema for a plan node, if any.
    #[must_use]
    pub fn runtime_schema(&self, node: NodeId) -> Option<SchemaRef> {
        self.runtime_schemas.read().get(&node).cloned()
    }

    /// Shared handle to the runtime schema cache, for observers outside
    /// the operator tree.
    #[must_use]
    pub fn runtime_schema_handle(&self) -> RuntimeSchemaCache {
        self.runtime_schemas.clone()
    }

    /// Handle another thread can use to request cancellation.
    #[must_use]
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// Requests cooperative cancellation of the running query.
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Fails with [`VexError::Cancelled`] once an abort was requested.
    /// Operators call this at loop boundaries.
    pub fn check_abort(&self) -> VexResult<()> {
        if self.abort.load(Ordering::Relaxed) {
            Err(VexError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(ExecutionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ResolvedType, Schema};
    use crate::vector::schema_of;

    #[test]
    fn outer_tuple_swap_restores() {
        let mut ctx = ExecutionContext::default();
        assert!(ctx.outer_tuple().is_none());

        let prev = ctx.swap_outer_tuple(Some(TupleVector::constant_scan()));
        assert!(prev.is_none());
        assert_eq!(ctx.outer_tuple().unwrap().row_count(), 1);

        let restored = ctx.swap_outer_tuple(prev);
        assert!(restored.is_some());
        assert!(ctx.outer_tuple().is_none());
    }

    #[test]
    fn abort_surfaces_as_cancelled() {
        let ctx = ExecutionContext::default();
        assert!(ctx.check_abort().is_ok());
        ctx.abort_handle().store(true, Ordering::Relaxed);
        assert!(matches!(ctx.check_abort(), Err(VexError::Cancelled)));
    }

    #[test]
    fn runtime_schemas_are_shared() {
        let ctx = ExecutionContext::default();
        let handle = ctx.runtime_schema_handle();
        let node = NodeId(7);
        assert!(ctx.runtime_schema(node).is_none());

        ctx.cache_runtime_schema(node, schema_of(&[("x", ResolvedType::Int)]));
        assert_eq!(ctx.runtime_schema(node).unwrap().len(), 1);
        assert_eq!(handle.read().len(), 1);

        ctx.cache_runtime_schema(node, Arc::new(Schema::empty()));
        assert!(ctx.runtime_schema(node).unwrap().is_empty());
    }

    #[test]
    fn allocator_tracks_buffers() {
        let ctx = ExecutionContext::default();
        let _values = ctx.allocator().alloc_values(16);
        let _indices = ctx.allocator().alloc_indices(4);
        let (vb, vs, ib, is) = ctx.allocator().stats();
        assert_eq!((vb, vs, ib, is), (1, 16, 1, 4));
    }
}
