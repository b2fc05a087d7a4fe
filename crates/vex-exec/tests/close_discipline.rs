//! Resource lifecycle: every opened scan is closed exactly once.

use std::sync::Arc;

use vex_exec::context::NodeId;
use vex_exec::datasource::MemoryDataSource;
use vex_exec::expr::{ColumnExpr, LiteralExpr};
use vex_exec::operators::{
    CacheExec, LimitCount, LimitExec, MaxRowCountExec, Operator, SortExec, SortKey,
    TableScanExec,
};
use vex_exec::schema::ResolvedType;
use vex_exec::vector::{schema_of, TupleVector, TypedVector, Value};
use vex_exec::{ExecutionContext, ExecutionEngine, VexError};

fn source(n: i32) -> Arc<MemoryDataSource> {
    let schema = schema_of(&[("x", ResolvedType::Int)]);
    MemoryDataSource::new(
        TupleVector::from_columns(
            schema,
            vec![Arc::new(TypedVector::ints((0..n).map(Some)))],
        )
        .unwrap(),
    )
}

#[test]
fn cache_executes_its_child_once_across_executions() {
    let src = source(5);
    let mut cache = CacheExec::new(Box::new(TableScanExec::new(NodeId(0), src.clone())));
    let mut ctx = ExecutionContext::default();

    let mut first = Vec::new();
    while let Some(batch) = cache.next_batch(&mut ctx).unwrap() {
        for row in 0..batch.row_count() {
            first.push(batch.value(0, row));
        }
    }
    cache.reset().unwrap();
    let mut second = Vec::new();
    while let Some(batch) = cache.next_batch(&mut ctx).unwrap() {
        for row in 0..batch.row_count() {
            second.push(batch.value(0, row));
        }
    }
    cache.close();

    assert_eq!(first, second);
    assert_eq!(src.open_count(), 1);
    assert_eq!(src.close_count(), 1);
}

#[test]
fn limit_closes_the_scan_before_the_plan_finishes() {
    let src = source(100);
    let scan = Box::new(TableScanExec::new(NodeId(0), src.clone()));
    let mut limit = LimitExec::new(scan, LimitCount::Constant(1));
    let mut ctx = ExecutionContext::default();

    let batch = limit.next_batch(&mut ctx).unwrap().unwrap();
    assert_eq!(batch.row_count(), 1);
    assert_eq!(src.close_count(), 1);
    limit.close();
    assert_eq!(src.close_count(), 1);
}

#[test]
fn engine_closes_the_tree_when_execution_fails() {
    let src = source(10);
    let scan = Box::new(TableScanExec::new(NodeId(0), src.clone()));
    let mut guard = MaxRowCountExec::new(scan, 3);

    let engine = ExecutionEngine::default();
    let mut ctx = engine.new_context();
    let err = engine.execute(&mut guard, &mut ctx).unwrap_err();
    assert!(matches!(err, VexError::RowCountExceeded { limit: 3 }));
    assert_eq!(src.open_count(), 1);
    assert_eq!(src.close_count(), 1);
}

#[test]
fn sort_closes_its_child_after_buffering() {
    let src = source(10);
    let scan = Box::new(TableScanExec::new(NodeId(0), src.clone()));
    let mut sort = SortExec::new(scan, vec![SortKey::desc(ColumnExpr::new("x"))]);
    let mut ctx = ExecutionContext::default();

    let batch = sort.next_batch(&mut ctx).unwrap().unwrap();
    assert_eq!(batch.value(0, 0), Value::Int(9));
    // The child was drained and closed while the sort is still emitting.
    assert_eq!(src.close_count(), 1);
    sort.close();
    assert_eq!(src.close_count(), 1);
}

#[test]
fn cancellation_surfaces_and_leaves_no_open_scans() {
    let src = source(10);
    let scan = Box::new(TableScanExec::new(NodeId(0), src.clone()));
    let mut limit = LimitExec::new(scan, LimitCount::Expr(LiteralExpr::new(Value::Long(5))));

    let engine = ExecutionEngine::default();
    let mut ctx = engine.new_context();
    ctx.request_abort();
    let err = engine.execute(&mut limit, &mut ctx).unwrap_err();
    assert!(matches!(err, VexError::Cancelled));
    assert_eq!(src.open_count(), src.close_count());
}
