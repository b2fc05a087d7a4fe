//! Leaf operators reading from data sources.

use tracing::debug;
use vex_common::VexResult;

use crate::context::{ExecutionContext, NodeId};
use crate::datasource::{DataSourceRef, ScanOptions, SeekPredicate, SourceIterator};
use crate::operators::{Estimates, Operator};
use crate::schema::{resolve, SchemaRef};
use crate::vector::TupleVector;

use std::sync::Arc;

/// Full scan over a data source.
///
/// The compile-time schema may defer columns to runtime; the first
/// produced batch resolves it, the resolution is cached per plan node,
/// and every batch is re-stamped with the resolved schema.
#[derive(Debug)]
pub struct TableScanExec {
    node: NodeId,
    source: DataSourceRef,
    compile_schema: SchemaRef,
    projection: Option<Vec<String>>,
    iterator: Option<Box<dyn SourceIterator>>,
    resolved: Option<SchemaRef>,
    rows_produced: usize,
    done: bool,
}

impl TableScanExec {
    /// Creates a scan over `source` with the source's compile schema.
    #[must_use]
    pub fn new(node: NodeId, source: DataSourceRef) -> Self {
        let compile_schema = source.schema();
        Self {
            node,
            source,
            compile_schema,
            projection: None,
            iterator: None,
            resolved: None,
            rows_produced: 0,
            done: false,
        }
    }

    /// Restricts the scan to the named columns.
    #[must_use]
    pub fn with_projection(mut self, projection: Vec<String>) -> Self {
        self.projection = Some(projection);
        self
    }

    fn open(&mut self, ctx: &mut ExecutionContext) -> VexResult<()> {
        let options = ScanOptions {
            projection: self.projection.clone(),
            batch_size: ctx.batch_size(),
            seek_keys: None,
        };
        self.iterator = Some(self.source.execute(ctx, &options)?);
        Ok(())
    }

    fn finish(&mut self) {
        if let Some(mut iterator) = self.iterator.take() {
            iterator.close();
        }
        self.done = true;
        debug!(node = self.node.0, rows = self.rows_produced, "scan drained");
    }

    fn resolve_batch(
        &mut self,
        ctx: &mut ExecutionContext,
        batch: TupleVector,
    ) -> VexResult<TupleVector> {
        let resolved = match &self.resolved {
            Some(schema) => schema.clone(),
            None => {
                let runtime = batch.refined_schema();
                let schema =
                    Arc::new(resolve::validate_runtime(&self.compile_schema, &runtime)?);
                ctx.cache_runtime_schema(self.node, schema.clone());
                self.resolved = Some(schema.clone());
                schema
            }
        };
        self.rows_produced += batch.row_count();
        batch.with_schema(resolved)
    }
}

impl Operator for TableScanExec {
    fn schema(&self) -> SchemaRef {
        self.resolved
            .clone()
            .unwrap_or_else(|| self.compile_schema.clone())
    }

    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        ctx.check_abort()?;
        if self.done {
            return Ok(None);
        }
        if self.iterator.is_none() {
            self.open(ctx)?;
        }
        loop {
            let batch = match self.iterator.as_mut() {
                Some(iterator) => iterator.next_batch()?,
                None => None,
            };
            match batch {
                Some(batch) if batch.row_count() == 0 => continue,
                Some(batch) => return Ok(Some(self.resolve_batch(ctx, batch)?)),
                None => {
                    self.finish();
                    return Ok(None);
                }
            }
        }
    }

    fn reset(&mut self) -> VexResult<()> {
        if let Some(mut iterator) = self.iterator.take() {
            iterator.close();
        }
        self.rows_produced = 0;
        self.done = false;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut iterator) = self.iterator.take() {
            iterator.close();
        }
        self.done = true;
    }

    fn estimates(&self) -> Estimates {
        Estimates {
            rows: self.source.estimated_rows(),
            batches: None,
        }
    }

    fn describe(&self) -> String {
        match &self.projection {
            Some(projection) => format!("TableScan(projection: {})", projection.join(", ")),
            None => "TableScan".to_string(),
        }
    }
}

/// Index scan restricted to runtime-resolved seek keys.
///
/// The seek predicate resolves its keys when the scan opens, typically
/// from the bound outer tuple of a correlated plan. An empty key list
/// short-circuits: the source is never opened.
#[derive(Debug)]
pub struct IndexSeekExec {
    node: NodeId,
    source: DataSourceRef,
    seek: Arc<dyn SeekPredicate>,
    compile_schema: SchemaRef,
    projection: Option<Vec<String>>,
    iterator: Option<Box<dyn SourceIterator>>,
    resolved: Option<SchemaRef>,
    rows_produced: usize,
    done: bool,
}

impl IndexSeekExec {
    /// Creates an index seek over `source` driven by `seek`.
    #[must_use]
    pub fn new(node: NodeId, source: DataSourceRef, seek: Arc<dyn SeekPredicate>) -> Self {
        let compile_schema = source.schema();
        Self {
            node,
            source,
            seek,
            compile_schema,
            projection: None,
            iterator: None,
            resolved: None,
            rows_produced: 0,
            done: false,
        }
    }

    /// Restricts the scan to the named columns.
    #[must_use]
    pub fn with_projection(mut self, projection: Vec<String>) -> Self {
        self.projection = Some(projection);
        self
    }

    fn open(&mut self, ctx: &mut ExecutionContext) -> VexResult<()> {
        let seek_keys = self.seek.seek_keys(ctx)?;
        if let Some(keys) = &seek_keys {
            if keys.keys.is_empty() {
                debug!(
                    node = self.node.0,
                    index = self.seek.index_name(),
                    "seek keys empty, source not opened"
                );
                self.done = true;
                return Ok(());
            }
        }
        let options = ScanOptions {
            projection: self.projection.clone(),
            batch_size: ctx.config().seek_batch_size,
            seek_keys,
        };
        self.iterator = Some(self.source.execute(ctx, &options)?);
        Ok(())
    }
}

impl Operator for IndexSeekExec {
    fn schema(&self) -> SchemaRef {
        self.resolved
            .clone()
            .unwrap_or_else(|| self.compile_schema.clone())
    }

    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        ctx.check_abort()?;
        if self.done {
            return Ok(None);
        }
        if self.iterator.is_none() {
            self.open(ctx)?;
            if self.done {
                return Ok(None);
            }
        }
        loop {
            let batch = match self.iterator.as_mut() {
                Some(iterator) => iterator.next_batch()?,
                None => None,
            };
            match batch {
                Some(batch) if batch.row_count() == 0 => continue,
                Some(batch) => {
                    let resolved = match &self.resolved {
                        Some(schema) => schema.clone(),
                        None => {
                            let runtime = batch.refined_schema();
                            let schema = Arc::new(resolve::validate_runtime(
                                &self.compile_schema,
                                &runtime,
                            )?);
                            ctx.cache_runtime_schema(self.node, schema.clone());
                            self.resolved = Some(schema.clone());
                            schema
                        }
                    };
                    self.rows_produced += batch.row_count();
                    return Ok(Some(batch.with_schema(resolved)?));
                }
                None => {
                    if let Some(mut iterator) = self.iterator.take() {
                        iterator.close();
                    }
                    self.done = true;
                    debug!(
                        node = self.node.0,
                        index = self.seek.index_name(),
                        rows = self.rows_produced,
                        "seek drained"
                    );
                    return Ok(None);
                }
            }
        }
    }

    fn reset(&mut self) -> VexResult<()> {
        if let Some(mut iterator) = self.iterator.take() {
            iterator.close();
        }
        self.rows_produced = 0;
        self.done = false;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut iterator) = self.iterator.take() {
            iterator.close();
        }
        self.done = true;
    }

    fn estimates(&self) -> Estimates {
        // A seek fetches at most the source's rows, usually far fewer.
        Estimates {
            rows: self.source.estimated_rows(),
            batches: None,
        }
    }

    fn describe(&self) -> String {
        format!(
            "IndexSeek(index: {}, keys: {})",
            self.seek.index_name(),
            self.seek.key_columns().join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{MemoryDataSource, OuterKeySeek};
    use crate::schema::ResolvedType;
    use crate::vector::{schema_of, TypedVector, Value};

    fn rows() -> Arc<MemoryDataSource> {
        let schema = schema_of(&[("id", ResolvedType::Int), ("v", ResolvedType::String)]);
        MemoryDataSource::new(
            TupleVector::from_columns(
                schema,
                vec![
                    Arc::new(TypedVector::ints([Some(1), Some(2), Some(3)])),
                    Arc::new(TypedVector::strings([Some("a"), Some("b"), Some("c")])),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn scan_drains_and_closes_once() {
        let source = rows();
        let mut scan = TableScanExec::new(NodeId(0), source.clone());
        let mut ctx = ExecutionContext::default();

        let mut total = 0;
        while let Some(batch) = scan.next_batch(&mut ctx).unwrap() {
            total += batch.row_count();
        }
        assert_eq!(total, 3);
        assert!(scan.next_batch(&mut ctx).unwrap().is_none());
        scan.close();
        scan.close();
        assert_eq!(source.open_count(), 1);
        assert_eq!(source.close_count(), 1);
    }

    #[test]
    fn scan_caches_its_runtime_schema() {
        let source = rows();
        let mut scan = TableScanExec::new(NodeId(4), source);
        let mut ctx = ExecutionContext::default();
        let batch = scan.next_batch(&mut ctx).unwrap().unwrap();
        assert_eq!(ctx.runtime_schema(NodeId(4)).unwrap(), *batch.schema());
        scan.close();
    }

    #[test]
    fn reset_reopens_the_source() {
        let source = rows();
        let mut scan = TableScanExec::new(NodeId(0), source.clone());
        let mut ctx = ExecutionContext::default();
        while scan.next_batch(&mut ctx).unwrap().is_some() {}
        scan.reset().unwrap();
        assert!(scan.next_batch(&mut ctx).unwrap().is_some());
        scan.close();
        assert_eq!(source.open_count(), 2);
        assert_eq!(source.close_count(), 2);
    }

    #[test]
    fn empty_seek_keys_skip_the_source() {
        let source = rows();
        let seek = Arc::new(OuterKeySeek::new(
            "ix_id",
            vec!["id".to_string()],
            vec!["ref_id".to_string()],
        ));
        let mut scan = IndexSeekExec::new(NodeId(1), source.clone(), seek);
        let mut ctx = ExecutionContext::default();

        // Outer tuple with only NULL keys yields an empty key list.
        let outer_schema = schema_of(&[("ref_id", ResolvedType::Int)]);
        let outer = TupleVector::from_columns(
            outer_schema,
            vec![Arc::new(TypedVector::ints([None]))],
        )
        .unwrap();
        let prev = ctx.swap_outer_tuple(Some(outer));
        assert!(scan.next_batch(&mut ctx).unwrap().is_none());
        ctx.swap_outer_tuple(prev);
        scan.close();
        assert_eq!(source.open_count(), 0);
        assert_eq!(source.close_count(), 0);
    }

    #[test]
    fn seek_restricts_rows_to_the_outer_keys() {
        let source = rows();
        let seek = Arc::new(OuterKeySeek::new(
            "ix_id",
            vec!["id".to_string()],
            vec!["ref_id".to_string()],
        ));
        let mut scan = IndexSeekExec::new(NodeId(1), source, seek);
        let mut ctx = ExecutionContext::default();

        let outer_schema = schema_of(&[("ref_id", ResolvedType::Int)]);
        let outer = TupleVector::from_columns(
            outer_schema,
            vec![Arc::new(TypedVector::ints([Some(2), Some(3)]))],
        )
        .unwrap();
        let prev = ctx.swap_outer_tuple(Some(outer));
        let batch = scan.next_batch(&mut ctx).unwrap().unwrap();
        assert_eq!(batch.row_count(), 2);
        assert_eq!(batch.value(1, 0), Value::string("b"));
        ctx.swap_outer_tuple(prev);
        scan.close();
    }
}
