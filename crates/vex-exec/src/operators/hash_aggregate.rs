//! Hash grouping and aggregation.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::debug;
use vex_common::{VexError, VexResult};

use crate::context::ExecutionContext;
use crate::expr::{AggregateExpr, ExprRef};
use crate::operators::{Operator, OperatorRef};
use crate::schema::{Column, ResolvedType, Schema, SchemaRef};
use crate::vector::{NormalizedKey, TupleVector, TypedVector, Value, ValueVector, VectorRef};

/// One output column of a [`HashAggregateExec`].
#[derive(Debug)]
pub enum GroupProjection {
    /// A grouping key, by index into the group-by expressions. Emits
    /// the group's key value.
    Key {
        /// Output column name.
        name: String,
        /// Index into the group-by expression list.
        index: usize,
    },
    /// An aggregate folded over the group's rows.
    Aggregate {
        /// Output column name.
        name: String,
        /// The aggregate.
        expr: Arc<dyn AggregateExpr>,
    },
    /// A non-aggregated expression over the group. Emits the per-row
    /// results as one vector value.
    Scalar {
        /// Output column name.
        name: String,
        /// The expression.
        expr: ExprRef,
    },
}

impl GroupProjection {
    fn name(&self) -> &str {
        match self {
            Self::Key { name, .. }
            | Self::Aggregate { name, .. }
            | Self::Scalar { name, .. } => name,
        }
    }
}

/// Group key: one normalized value per group-by expression, `None`
/// standing for NULL. Unlike join keys, NULLs group together.
type GroupKey = Vec<Option<NormalizedKey>>;

/// Hash aggregation.
///
/// Drains the child, partitions rows by the normalized group-by keys
/// (NULL keys form their own group), then evaluates one projection per
/// output column against each group. Group output order follows first
/// encounter. With no group-by expressions the whole input is a single
/// group, which exists even for empty input.
#[derive(Debug)]
pub struct HashAggregateExec {
    child: OperatorRef,
    group_by: Vec<ExprRef>,
    projections: Vec<GroupProjection>,
    schema: SchemaRef,
    pending: Option<VecDeque<TupleVector>>,
}

impl HashAggregateExec {
    /// Aggregates `child` grouped by `group_by`.
    #[must_use]
    pub fn new(
        child: OperatorRef,
        group_by: Vec<ExprRef>,
        projections: Vec<GroupProjection>,
    ) -> Self {
        let columns = projections
            .iter()
            .map(|p| {
                let ty = match p {
                    GroupProjection::Key { index, .. } => group_by
                        .get(*index)
                        .map_or(ResolvedType::Any, |e| e.resolved_type()),
                    GroupProjection::Aggregate { .. } | GroupProjection::Scalar { .. } => {
                        ResolvedType::Any
                    }
                };
                Column::new(p.name(), ty)
            })
            .collect();
        let schema = Arc::new(Schema::new(columns));
        Self {
            child,
            group_by,
            projections,
            schema,
            pending: None,
        }
    }

    /// Drains the child and partitions its rows into groups, returning
    /// the retained batches and the per-group row refs in encounter
    /// order.
    fn partition(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<(Vec<TupleVector>, Vec<Vec<(usize, usize)>>)> {
        let mut batches = Vec::new();
        let mut groups: Vec<Vec<(usize, usize)>> = Vec::new();
        let mut index: HashMap<GroupKey, usize> = HashMap::new();

        while let Some(batch) = self.child.next_batch(ctx)? {
            ctx.check_abort()?;
            let key_vectors = self
                .group_by
                .iter()
                .map(|k| k.eval(&batch, ctx))
                .collect::<VexResult<Vec<_>>>()?;
            let batch_index = batches.len();
            for row in 0..batch.row_count() {
                let key: GroupKey = key_vectors
                    .iter()
                    .map(|v| NormalizedKey::from_value(&v.value(row)))
                    .collect();
                let group = match index.entry(key) {
                    Entry::Occupied(slot) => *slot.get(),
                    Entry::Vacant(slot) => {
                        let next = groups.len();
                        groups.push(Vec::new());
                        *slot.insert(next)
                    }
                };
                groups[group].push((batch_index, row));
            }
            batches.push(batch);
        }
        self.child.close();

        // A global aggregate has exactly one group, even over no rows.
        if self.group_by.is_empty() && groups.is_empty() {
            groups.push(Vec::new());
        }
        debug!(groups = groups.len(), "aggregation partitioned");
        Ok((batches, groups))
    }

    fn aggregate(&mut self, ctx: &mut ExecutionContext) -> VexResult<VecDeque<TupleVector>> {
        let (batches, groups) = self.partition(ctx)?;

        let child_schema = batches
            .first()
            .map_or_else(|| self.child.schema(), |b| b.schema().clone());
        let mut output: Vec<Vec<Value>> = self
            .projections
            .iter()
            .map(|_| ctx.allocator().alloc_values(groups.len()))
            .collect();

        for rows in &groups {
            let views: Vec<TupleVector> = rows
                .iter()
                .map(|&(batch, row)| batches[batch].row_view(row))
                .collect();
            let group = TupleVector::concat(child_schema.clone(), &views)?;

            for (ordinal, projection) in self.projections.iter().enumerate() {
                let value = match projection {
                    GroupProjection::Key { index, .. } => {
                        let expr = self.group_by.get(*index).ok_or_else(|| {
                            VexError::invariant(format!(
                                "key projection index {index} out of range"
                            ))
                        })?;
                        if group.row_count() == 0 {
                            Value::Null
                        } else {
                            expr.eval(&group, ctx)?.value(0)
                        }
                    }
                    GroupProjection::Aggregate { expr, .. } => {
                        expr.aggregate(&group, ctx)?
                    }
                    GroupProjection::Scalar { expr, .. } => {
                        Value::Vector(expr.eval(&group, ctx)?)
                    }
                };
                output[ordinal].push(value);
            }
        }

        let columns = output
            .into_iter()
            .map(|values| Arc::new(TypedVector::from_values(values)) as VectorRef)
            .collect();
        let result = TupleVector::new(self.schema.clone(), columns, groups.len())?;
        let resolved = result.refined_schema();
        self.schema = resolved.clone();
        let result = result.with_schema(resolved)?;

        let mut pending = VecDeque::new();
        let batch_size = ctx.batch_size();
        let mut start = 0;
        while start < result.row_count() {
            let end = (start + batch_size).min(result.row_count());
            let slice: Vec<usize> = (start..end).collect();
            pending.push_back(result.select(Arc::new(slice)));
            start = end;
        }
        Ok(pending)
    }
}

impl Operator for HashAggregateExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(
        &mut self,
        ctx: &mut ExecutionContext,
    ) -> VexResult<Option<TupleVector>> {
        ctx.check_abort()?;
        if self.pending.is_none() {
            let result = self.aggregate(ctx)?;
            self.pending = Some(result);
        }
        Ok(self.pending.as_mut().and_then(VecDeque::pop_front))
    }

    fn reset(&mut self) -> VexResult<()> {
        self.pending = None;
        self.child.reset()
    }

    fn close(&mut self) {
        self.pending = None;
        self.child.close();
    }

    fn describe(&self) -> String {
        let keys: Vec<String> = self.group_by.iter().map(|e| e.label()).collect();
        format!("HashAggregate(by: {})", keys.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NodeId;
    use crate::datasource::MemoryDataSource;
    use crate::expr::{ColumnExpr, CountAgg, MinAgg, SumAgg};
    use crate::operators::TableScanExec;
    use crate::schema::ResolvedType;
    use crate::vector::{schema_of, ValueVector};

    fn scan() -> OperatorRef {
        let schema = schema_of(&[("k", ResolvedType::String), ("v", ResolvedType::Int)]);
        let source = MemoryDataSource::new(
            TupleVector::from_columns(
                schema,
                vec![
                    Arc::new(crate::vector::TypedVector::strings([
                        Some("a"),
                        Some("b"),
                        Some("a"),
                        None,
                        Some("b"),
                    ])),
                    Arc::new(crate::vector::TypedVector::ints([
                        Some(1),
                        Some(2),
                        Some(3),
                        Some(4),
                        None,
                    ])),
                ],
            )
            .unwrap(),
        );
        Box::new(TableScanExec::new(NodeId(0), source))
    }

    fn run(op: &mut dyn Operator) -> TupleVector {
        let mut ctx = ExecutionContext::default();
        let mut batches = Vec::new();
        while let Some(batch) = op.next_batch(&mut ctx).unwrap() {
            batches.push(batch);
        }
        let schema = op.schema();
        op.close();
        TupleVector::concat(schema, &batches).unwrap()
    }

    #[test]
    fn groups_in_encounter_order_with_null_group() {
        let mut agg = HashAggregateExec::new(
            scan(),
            vec![ColumnExpr::new("k")],
            vec![
                GroupProjection::Key {
                    name: "k".to_string(),
                    index: 0,
                },
                GroupProjection::Aggregate {
                    name: "n".to_string(),
                    expr: CountAgg::star(),
                },
                GroupProjection::Aggregate {
                    name: "total".to_string(),
                    expr: SumAgg::over(ColumnExpr::new("v")),
                },
            ],
        );
        let result = run(&mut agg);
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.value(0, 0), Value::string("a"));
        assert_eq!(result.value(1, 0), Value::Long(2));
        assert_eq!(result.value(2, 0), Value::Long(4));
        // The b group has one NULL v; sum skips it.
        assert_eq!(result.value(0, 1), Value::string("b"));
        assert_eq!(result.value(2, 1), Value::Long(2));
        // NULL keys form their own group.
        assert_eq!(result.value(0, 2), Value::Null);
        assert_eq!(result.value(1, 2), Value::Long(1));
    }

    #[test]
    fn global_aggregate_over_empty_input_yields_one_row() {
        let schema = schema_of(&[("v", ResolvedType::Int)]);
        let source = MemoryDataSource::new(
            TupleVector::from_columns(
                schema,
                vec![Arc::new(crate::vector::TypedVector::ints([]))],
            )
            .unwrap(),
        );
        let child = Box::new(TableScanExec::new(NodeId(0), source));
        let mut agg = HashAggregateExec::new(
            child,
            Vec::new(),
            vec![
                GroupProjection::Aggregate {
                    name: "n".to_string(),
                    expr: CountAgg::star(),
                },
                GroupProjection::Aggregate {
                    name: "lo".to_string(),
                    expr: MinAgg::over(ColumnExpr::new("v")),
                },
            ],
        );
        let result = run(&mut agg);
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.value(0, 0), Value::Long(0));
        assert_eq!(result.value(1, 0), Value::Null);
    }

    #[test]
    fn scalar_projection_emits_the_group_vector() {
        let mut agg = HashAggregateExec::new(
            scan(),
            vec![ColumnExpr::new("k")],
            vec![
                GroupProjection::Key {
                    name: "k".to_string(),
                    index: 0,
                },
                GroupProjection::Scalar {
                    name: "vs".to_string(),
                    expr: ColumnExpr::new("v"),
                },
            ],
        );
        let result = run(&mut agg);
        let Value::Vector(values) = result.value(1, 0) else {
            panic!("expected a vector value");
        };
        assert_eq!(values.len(), 2);
        assert_eq!(values.get_int(0).unwrap(), Some(1));
        assert_eq!(values.get_int(1).unwrap(), Some(3));
    }
}
