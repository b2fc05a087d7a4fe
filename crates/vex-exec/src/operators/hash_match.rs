//! Hash equi-join.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::debug;
use vex_common::VexResult;

use crate::context::ExecutionContext;
use crate::expr::ExprRef;
use crate::operators::{JoinType, Operator, OperatorRef};
use crate::schema::{resolve, ResolvedType, SchemaRef};
use crate::vector::{NormalizedKey, TupleVector, TypedVector, Value, ValueVector, VectorRef};

/// Reference to a build-side row: (batch index, row index).
type RowRef = (usize, usize);

/// Hash table over normalized composite keys with explicit equality
/// re-checks, so hash collisions can never produce false matches.
#[derive(Debug, Default)]
struct HashTable {
    buckets: HashMap<u64, Vec<BucketEntry>>,
    rows: usize,
}

#[derive(Debug)]
struct BucketEntry {
    key: Vec<NormalizedKey>,
    rows: Vec<RowRef>,
}

fn hash_key(key: &[NormalizedKey]) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

impl HashTable {
    fn insert(&mut self, key: Vec<NormalizedKey>, row: RowRef) {
        self.rows += 1;
        let bucket = self.buckets.entry(hash_key(&key)).or_default();
        if let Some(entry) = bucket.iter_mut().find(|e| e.key == key) {
            entry.rows.push(row);
        } else {
            bucket.push(BucketEntry {
                key,
                rows: vec![row],
            });
        }
    }

    fn probe(&self, key: &[NormalizedKey]) -> Option<&[RowRef]> {
        self.buckets
            .get(&hash_key(key))?
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.rows.as_slice())
    }
}

/// Normalizes one row's composite key. `None` when any part is NULL or
/// not normalizable; such rows never match.
fn row_key(vectors: &[VectorRef], row: usize) -> Option<Vec<NormalizedKey>> {
    vectors
        .iter()
        .map(|v| NormalizedKey::from_value(&v.value(row)))
        .collect()
}

/// Hash equi-join of an outer (probe) and an inner (build) plan.
///
/// The inner side is drained once into a hash table keyed by the
/// normalized inner key values; outer batches then probe it. Output
/// preserves probe-row order. NULL keys never match on either side.
///
/// Modes mirror the nested-loop join: flat or populate output, inner or
/// left semantics. The indexed mode additionally binds each outer batch
/// to the context's outer-tuple slot and re-executes the inner plan per
/// outer batch, for inner plans rooted at an index seek that reads its
/// keys from the outer rows.
#[derive(Debug)]
pub struct HashMatchExec {
    outer: OperatorRef,
    inner: OperatorRef,
    outer_keys: Vec<ExprRef>,
    inner_keys: Vec<ExprRef>,
    join_type: JoinType,
    populate: Option<String>,
    indexed: bool,
    table: Option<HashTable>,
    inner_batches: Vec<TupleVector>,
    inner_schema: Option<SchemaRef>,
    pending: VecDeque<TupleVector>,
    done: bool,
}

impl HashMatchExec {
    /// Creates a flat hash join on the given key expressions.
    #[must_use]
    pub fn new(
        outer: OperatorRef,
        inner: OperatorRef,
        outer_keys: Vec<ExprRef>,
        inner_keys: Vec<ExprRef>,
        join_type: JoinType,
    ) -> Self {
        Self {
            outer,
            inner,
            outer_keys,
            inner_keys,
            join_type,
            populate: None,
            indexed: false,
            table: None,
            inner_batches: Vec::new(),
            inner_schema: None,
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Groups matched inner rows into one nested-table column.
    #[must_use]
    pub fn with_populate(mut self, alias: impl Into<String>) -> Self {
        self.populate = Some(alias.into());
        self
    }

    /// Re-executes the inner plan per outer batch with the batch bound
    /// to the outer-tuple slot, for index-seek inner plans.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    fn resolved_inner_schema(&self) -> SchemaRef {
        self.inner_schema
            .clone()
            .unwrap_or_else(|| self.inner.schema())
    }

    /// Drains the inner plan into the hash table.
    fn build(&mut self, ctx: &mut ExecutionContext) -> VexResult<()> {
        let mut table = HashTable::default();
        while let Some(batch) = self.inner.next_batch(ctx)? {
            ctx.check_abort()?;
            self.inner_schema = Some(batch.schema().clone());
            let key_vectors = self
                .inner_keys
                .iter()
                .map(|k| k.eval(&batch, ctx))
                .collect::<VexResult<Vec<_>>>()?;
            let batch_index = self.inner_batches.len();
            for row in 0..batch.row_count() {
                if let Some(key) = row_key(&key_vectors, row) {
                    table.insert(key, (batch_index, row));
                }
            }
            self.inner_batches.push(batch);
        }
        debug!(rows = table.rows, buckets = table.buckets.len(), "hash table built");
        self.table = Some(table);
        Ok(())
    }

    /// Probes one outer batch, queueing output batches.
    fn probe_batch(
        &mut self,
        outer_batch: &TupleVector,
        ctx: &mut ExecutionContext,
    ) -> VexResult<()> {
        let key_vectors = self
            .outer_keys
            .iter()
            .map(|k| k.eval(outer_batch, ctx))
            .collect::<VexResult<Vec<_>>>()?;

        // Matches per probe row, in probe-row order.
        let mut matches: Vec<Vec<RowRef>> = Vec::with_capacity(outer_batch.row_count());
        for row in 0..outer_batch.row_count() {
            let rows = row_key(&key_vectors, row)
                .as_deref()
                .and_then(|key| self.table.as_ref().and_then(|t| t.probe(key)))
                .map(<[RowRef]>::to_vec)
                .unwrap_or_default();
            matches.push(rows);
        }

        if let Some(alias) = self.populate.clone() {
            self.emit_populated(outer_batch, &matches, &alias)?;
        } else {
            self.emit_flat(outer_batch, &matches)?;
        }
        Ok(())
    }

    /// Emits matched pairs side by side, plus null-extended unmatched
    /// probe rows for a left join, all in probe-row order.
    fn emit_flat(
        &mut self,
        outer_batch: &TupleVector,
        matches: &[Vec<RowRef>],
    ) -> VexResult<()> {
        let mut outer_rows = Vec::new();
        let mut inner_rows: Vec<Option<RowRef>> = Vec::new();
        for (i, rows) in matches.iter().enumerate() {
            if rows.is_empty() {
                if self.join_type.keeps_unmatched() {
                    outer_rows.push(i);
                    inner_rows.push(None);
                }
            } else {
                for &row in rows {
                    outer_rows.push(i);
                    inner_rows.push(Some(row));
                }
            }
        }
        if outer_rows.is_empty() {
            return Ok(());
        }

        let inner_schema = self.resolved_inner_schema();
        let schema = Arc::new(resolve::concat(outer_batch.schema(), &inner_schema));
        let narrowed = outer_batch.select(Arc::new(outer_rows));
        let mut columns: Vec<VectorRef> = narrowed.columns().to_vec();
        for (ordinal, column) in inner_schema.columns().iter().enumerate() {
            let values: Vec<Value> = inner_rows
                .iter()
                .map(|r| match *r {
                    Some((batch, row)) => self.inner_batches[batch].value(ordinal, row),
                    None => Value::Null,
                })
                .collect();
            columns.push(Arc::new(TypedVector::new(column.ty.clone(), values)));
        }
        self.pending
            .push_back(TupleVector::new(schema, columns, narrowed.row_count())?);
        Ok(())
    }

    /// Emits one row per kept probe row with matches grouped into a
    /// nested table.
    fn emit_populated(
        &mut self,
        outer_batch: &TupleVector,
        matches: &[Vec<RowRef>],
        alias: &str,
    ) -> VexResult<()> {
        let inner_schema = self.resolved_inner_schema();
        let mut kept = Vec::new();
        let mut nested = Vec::new();
        for (i, rows) in matches.iter().enumerate() {
            if rows.is_empty() {
                if self.join_type.keeps_unmatched() {
                    kept.push(i);
                    nested.push(Value::Null);
                }
            } else {
                let views: Vec<TupleVector> = rows
                    .iter()
                    .map(|&(batch, row)| self.inner_batches[batch].row_view(row))
                    .collect();
                kept.push(i);
                nested.push(Value::Table(TupleVector::concat(
                    inner_schema.clone(),
                    &views,
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

    /// Indexed protocol: bind the outer batch, re-execute the inner
    /// plan, build a per-batch table, probe, discard.
    fn probe_indexed(
        &mut self,
        outer_batch: &TupleVector,
        ctx: &mut ExecutionContext,
    ) -> VexResult<()> {
        self.table = None;
        self.inner_batches.clear();
        self.inner.reset()?;

        let previous = ctx.swap_outer_tuple(Some(outer_batch.materialize()));
        let result = self.build(ctx);
        ctx.swap_outer_tuple(previous);
        result?;

        self.probe_batch(outer_batch, ctx)
    }
}

impl Operator for HashMatchExec {
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
            if !self.indexed && self.table.is_none() {
                self.build(ctx)?;
            }
            let Some(outer_batch) = self.outer.next_batch(ctx)? else {
                self.done = true;
                continue;
            };
            if self.indexed {
                self.probe_indexed(&outer_batch, ctx)?;
            } else {
                self.probe_batch(&outer_batch, ctx)?;
            }
        }
    }

    fn reset(&mut self) -> VexResult<()> {
        self.pending.clear();
        self.table = None;
        self.inner_batches.clear();
        self.done = false;
        self.outer.reset()?;
        self.inner.reset()
    }

    fn close(&mut self) {
        self.pending.clear();
        self.table = None;
        self.inner_batches.clear();
        self.done = true;
        self.outer.close();
        self.inner.close();
    }

    fn describe(&self) -> String {
        let keys: Vec<String> = self
            .outer_keys
            .iter()
            .zip(&self.inner_keys)
            .map(|(o, i)| format!("{} = {}", o.label(), i.label()))
            .collect();
        let mut parts = vec![
            match self.join_type {
                JoinType::Inner => "inner".to_string(),
                JoinType::Left => "left".to_string(),
            },
            format!("on: {}", keys.join(" and ")),
        ];
        if let Some(alias) = &self.populate {
            parts.push(format!("populate: {alias}"));
        }
        if self.indexed {
            parts.push("indexed".to_string());
        }
        format!("HashMatch({})", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NodeId;
    use crate::datasource::{MemoryDataSource, OuterKeySeek};
    use crate::expr::ColumnExpr;
    use crate::operators::{IndexSeekExec, TableScanExec};
    use crate::vector::{schema_of, ValueVector};

    fn outer_scan() -> OperatorRef {
        let schema = schema_of(&[("col0", ResolvedType::Int), ("col1", ResolvedType::Int)]);
        let source = MemoryDataSource::new(
            TupleVector::from_columns(
                schema,
                vec![
                    Arc::new(TypedVector::ints([Some(0), Some(1), Some(2)])),
                    Arc::new(TypedVector::ints([Some(4), Some(5), Some(6)])),
                ],
            )
            .unwrap(),
        );
        Box::new(TableScanExec::new(NodeId(0), source))
    }

    fn inner_source() -> Arc<MemoryDataSource> {
        let schema = schema_of(&[("col2", ResolvedType::Int), ("col3", ResolvedType::Int)]);
        MemoryDataSource::new(
            TupleVector::from_columns(
                schema,
                vec![
                    Arc::new(TypedVector::ints([Some(0), Some(0), Some(1)])),
                    Arc::new(TypedVector::ints([Some(1), Some(2), Some(3)])),
                ],
            )
            .unwrap(),
        )
    }

    fn inner_scan() -> OperatorRef {
        Box::new(TableScanExec::new(NodeId(1), inner_source()))
    }

    fn collect_rows(op: &mut dyn Operator) -> Vec<Vec<Value>> {
        let mut ctx = ExecutionContext::default();
        let mut rows = Vec::new();
        while let Some(batch) = op.next_batch(&mut ctx).unwrap() {
            for row in 0..batch.row_count() {
                rows.push(
                    (0..batch.column_count())
                        .map(|c| batch.value(c, row))
                        .collect(),
                );
            }
        }
        op.close();
        rows
    }

    fn ints(row: &[i32]) -> Vec<Value> {
        row.iter().map(|&v| Value::Int(v)).collect()
    }

    #[test]
    fn inner_join_matches_pairs_in_probe_order() {
        let mut join = HashMatchExec::new(
            outer_scan(),
            inner_scan(),
            vec![ColumnExpr::new("col0")],
            vec![ColumnExpr::new("col2")],
            JoinType::Inner,
        );
        let rows = collect_rows(&mut join);
        assert_eq!(
            rows,
            vec![
                ints(&[0, 4, 0, 1]),
                ints(&[0, 4, 0, 2]),
                ints(&[1, 5, 1, 3]),
            ]
        );
    }

    #[test]
    fn left_join_null_extends_unmatched_probe_rows() {
        let mut join = HashMatchExec::new(
            outer_scan(),
            inner_scan(),
            vec![ColumnExpr::new("col0")],
            vec![ColumnExpr::new("col2")],
            JoinType::Left,
        );
        let rows = collect_rows(&mut join);
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[3],
            vec![Value::Int(2), Value::Int(6), Value::Null, Value::Null]
        );
    }

    #[test]
    fn null_keys_never_match() {
        let outer_schema = schema_of(&[("k", ResolvedType::Int)]);
        let outer = MemoryDataSource::new(
            TupleVector::from_columns(
                outer_schema,
                vec![Arc::new(TypedVector::ints([None, Some(1)]))],
            )
            .unwrap(),
        );
        let inner_schema = schema_of(&[("k2", ResolvedType::Int)]);
        let inner = MemoryDataSource::new(
            TupleVector::from_columns(
                inner_schema,
                vec![Arc::new(TypedVector::ints([None, Some(1)]))],
            )
            .unwrap(),
        );
        let mut join = HashMatchExec::new(
            Box::new(TableScanExec::new(NodeId(0), outer)),
            Box::new(TableScanExec::new(NodeId(1), inner)),
            vec![ColumnExpr::new("k")],
            vec![ColumnExpr::new("k2")],
            JoinType::Inner,
        );
        let rows = collect_rows(&mut join);
        assert_eq!(rows, vec![vec![Value::Int(1), Value::Int(1)]]);
    }

    #[test]
    fn cross_type_keys_normalize() {
        // Long 1 on one side, Int 1 on the other: same normalized key.
        let outer_schema = schema_of(&[("k", ResolvedType::Long)]);
        let outer = MemoryDataSource::new(
            TupleVector::from_columns(
                outer_schema,
                vec![Arc::new(TypedVector::new(
                    ResolvedType::Long,
                    vec![Value::Long(1)],
                ))],
            )
            .unwrap(),
        );
        let mut join = HashMatchExec::new(
            Box::new(TableScanExec::new(NodeId(0), outer)),
            inner_scan(),
            vec![ColumnExpr::new("k")],
            vec![ColumnExpr::new("col2")],
            JoinType::Inner,
        );
        let rows = collect_rows(&mut join);
        assert_eq!(rows, vec![vec![Value::Long(1), Value::Int(1), Value::Int(3)]]);
    }

    #[test]
    fn populate_groups_matches_per_probe_row() {
        let mut join = HashMatchExec::new(
            outer_scan(),
            inner_scan(),
            vec![ColumnExpr::new("col0")],
            vec![ColumnExpr::new("col2")],
            JoinType::Left,
        )
        .with_populate("hits");
        let mut ctx = ExecutionContext::default();
        let batch = join.next_batch(&mut ctx).unwrap().unwrap();
        assert_eq!(batch.row_count(), 3);
        assert_eq!(batch.column(2).get_table(0).unwrap().row_count(), 2);
        assert!(batch.column(2).is_null(2));
        join.close();
    }

    #[test]
    fn indexed_mode_reexecutes_the_seek_per_outer_batch() {
        let source = inner_source();
        let seek = Arc::new(OuterKeySeek::new(
            "ix_col2",
            vec!["col2".to_string()],
            vec!["col0".to_string()],
        ));
        let inner = Box::new(IndexSeekExec::new(NodeId(1), source.clone(), seek));
        let mut join = HashMatchExec::new(
            outer_scan(),
            inner,
            vec![ColumnExpr::new("col0")],
            vec![ColumnExpr::new("col2")],
            JoinType::Inner,
        )
        .indexed();
        let rows = collect_rows(&mut join);
        assert_eq!(
            rows,
            vec![
                ints(&[0, 4, 0, 1]),
                ints(&[0, 4, 0, 2]),
                ints(&[1, 5, 1, 3]),
            ]
        );
        assert_eq!(source.open_count(), source.close_count());
    }
}
