//! Vectorized expressions evaluated against batches.
//!
//! Operators hold expressions behind [`ExprRef`] and know nothing about
//! their shape. The built-in expressions here cover column access,
//! literals, comparisons and boolean combinators, enough to drive the
//! filter, join and aggregation operators; richer frontends plug in
//! their own implementations of the traits.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use vex_common::{VexError, VexResult};

use crate::context::ExecutionContext;
use crate::schema::ResolvedType;
use crate::vector::{BitSetVector, ConstantVector, TupleVector, Value, ValueVector, VectorRef};

/// Reference-counted expression handle.
pub type ExprRef = Arc<dyn VectorExpr>;

/// An expression producing one vector per input batch.
pub trait VectorExpr: fmt::Debug + Send + Sync {
    /// Evaluates against a batch, producing one value per input row.
    fn eval(&self, batch: &TupleVector, ctx: &mut ExecutionContext) -> VexResult<VectorRef>;

    /// Compile-time type of this expression, when known.
    fn resolved_type(&self) -> ResolvedType {
        ResolvedType::Any
    }

    /// Short display form for plan output and column naming.
    fn label(&self) -> String;
}

/// An expression folding a whole group of rows into one value.
pub trait AggregateExpr: fmt::Debug + Send + Sync {
    /// Folds the rows of `group` into a single value.
    fn aggregate(&self, group: &TupleVector, ctx: &mut ExecutionContext) -> VexResult<Value>;

    /// Short display form for plan output and column naming.
    fn label(&self) -> String;
}

/// Reads a column of the input batch, resolved by name.
#[derive(Debug, Clone)]
pub struct ColumnExpr {
    name: String,
}

impl ColumnExpr {
    /// References the column `name` (case-insensitive).
    pub fn new(name: impl Into<String>) -> ExprRef {
        Arc::new(Self { name: name.into() })
    }
}

impl VectorExpr for ColumnExpr {
    fn eval(&self, batch: &TupleVector, _ctx: &mut ExecutionContext) -> VexResult<VectorRef> {
        let ordinal = batch.schema().index_of(&self.name).ok_or_else(|| {
            VexError::schema_mismatch(format!(
                "column '{}' not found in {}",
                self.name,
                batch.schema()
            ))
        })?;
        Ok(batch.column(ordinal).clone())
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}

/// Reads a column of the current outer tuple in a correlated plan.
///
/// Produces a constant vector repeating the outer row's value across the
/// input batch. Fails when no outer tuple is bound.
#[derive(Debug, Clone)]
pub struct OuterColumnExpr {
    name: String,
}

impl OuterColumnExpr {
    /// References the outer column `name` (case-insensitive).
    pub fn new(name: impl Into<String>) -> ExprRef {
        Arc::new(Self { name: name.into() })
    }
}

impl VectorExpr for OuterColumnExpr {
    fn eval(&self, batch: &TupleVector, ctx: &mut ExecutionContext) -> VexResult<VectorRef> {
        let outer = ctx.outer_tuple().ok_or_else(|| {
            VexError::internal(format!(
                "outer column '{}' referenced outside a correlated plan",
                self.name
            ))
        })?;
        let ordinal = outer.schema().index_of(&self.name).ok_or_else(|| {
            VexError::schema_mismatch(format!(
                "outer column '{}' not found in {}",
                self.name,
                outer.schema()
            ))
        })?;
        let value = outer.value(ordinal, 0);
        Ok(Arc::new(ConstantVector::new(value, batch.row_count())))
    }

    fn label(&self) -> String {
        format!("outer.{}", self.name)
    }
}

/// A constant expression.
#[derive(Debug, Clone)]
pub struct LiteralExpr {
    value: Value,
}

impl LiteralExpr {
    /// Wraps a constant value.
    pub fn new(value: Value) -> ExprRef {
        Arc::new(Self { value })
    }
}

impl VectorExpr for LiteralExpr {
    fn eval(&self, batch: &TupleVector, _ctx: &mut ExecutionContext) -> VexResult<VectorRef> {
        Ok(Arc::new(ConstantVector::new(
            self.value.clone(),
            batch.row_count(),
        )))
    }

    fn resolved_type(&self) -> ResolvedType {
        self.value.resolved_type()
    }

    fn label(&self) -> String {
        self.value.to_string()
    }
}

/// Comparison operator of a [`ComparisonExpr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }

    fn evaluate(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::NotEq => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::LtEq => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::GtEq => ordering != Ordering::Less,
        }
    }
}

/// Row-wise comparison producing a three-valued boolean vector.
///
/// A NULL on either side yields NULL, never true or false.
#[derive(Debug)]
pub struct ComparisonExpr {
    op: CmpOp,
    left: ExprRef,
    right: ExprRef,
}

impl ComparisonExpr {
    /// Compares `left` against `right` with `op`.
    pub fn new(op: CmpOp, left: ExprRef, right: ExprRef) -> ExprRef {
        Arc::new(Self { op, left, right })
    }

    /// Shorthand for an equality comparison.
    pub fn eq(left: ExprRef, right: ExprRef) -> ExprRef {
        Self::new(CmpOp::Eq, left, right)
    }
}

impl VectorExpr for ComparisonExpr {
    fn eval(&self, batch: &TupleVector, ctx: &mut ExecutionContext) -> VexResult<VectorRef> {
        let left = self.left.eval(batch, ctx)?;
        let right = self.right.eval(batch, ctx)?;
        let mut result = BitSetVector::with_capacity(batch.row_count());
        for row in 0..batch.row_count() {
            let outcome = left
                .value(row)
                .compare(&right.value(row))
                .map(|o| self.op.evaluate(o));
            result.push(outcome);
        }
        Ok(Arc::new(result))
    }

    fn resolved_type(&self) -> ResolvedType {
        ResolvedType::Boolean
    }

    fn label(&self) -> String {
        format!(
            "{} {} {}",
            self.left.label(),
            self.op.symbol(),
            self.right.label()
        )
    }
}

/// Boolean combinator of a [`LogicalExpr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    /// Three-valued AND.
    And,
    /// Three-valued OR.
    Or,
}

/// Three-valued AND/OR over two boolean expressions.
#[derive(Debug)]
pub struct LogicalExpr {
    op: BoolOp,
    left: ExprRef,
    right: ExprRef,
}

impl LogicalExpr {
    /// Combines `left` and `right` with `op`.
    pub fn new(op: BoolOp, left: ExprRef, right: ExprRef) -> ExprRef {
        Arc::new(Self { op, left, right })
    }
}

impl VectorExpr for LogicalExpr {
    fn eval(&self, batch: &TupleVector, ctx: &mut ExecutionContext) -> VexResult<VectorRef> {
        let left = self.left.eval(batch, ctx)?;
        let right = self.right.eval(batch, ctx)?;
        let mut lhs = BitSetVector::with_capacity(batch.row_count());
        for row in 0..batch.row_count() {
            lhs.push(left.get_boolean(row)?);
        }
        let combined = match self.op {
            BoolOp::And => lhs.and(right.as_ref())?,
            BoolOp::Or => lhs.or(right.as_ref())?,
        };
        Ok(Arc::new(combined))
    }

    fn resolved_type(&self) -> ResolvedType {
        ResolvedType::Boolean
    }

    fn label(&self) -> String {
        let op = match self.op {
            BoolOp::And => "AND",
            BoolOp::Or => "OR",
        };
        format!("{} {} {}", self.left.label(), op, self.right.label())
    }
}

/// `COUNT(*)` or `COUNT(expr)`.
///
/// Without an argument every row counts; with one, NULL results are
/// skipped.
#[derive(Debug)]
pub struct CountAgg {
    arg: Option<ExprRef>,
}

impl CountAgg {
    /// `COUNT(*)`.
    #[must_use]
    pub fn star() -> Arc<dyn AggregateExpr> {
        Arc::new(Self { arg: None })
    }

    /// `COUNT(expr)`.
    pub fn over(arg: ExprRef) -> Arc<dyn AggregateExpr> {
        Arc::new(Self { arg: Some(arg) })
    }
}

impl AggregateExpr for CountAgg {
    fn aggregate(&self, group: &TupleVector, ctx: &mut ExecutionContext) -> VexResult<Value> {
        let count = match &self.arg {
            None => group.row_count(),
            Some(arg) => {
                let values = arg.eval(group, ctx)?;
                (0..group.row_count()).filter(|&r| !values.is_null(r)).count()
            }
        };
        Ok(Value::Long(count as i64))
    }

    fn label(&self) -> String {
        match &self.arg {
            None => "count(*)".to_string(),
            Some(arg) => format!("count({})", arg.label()),
        }
    }
}

/// `SUM(expr)` over a group. NULLs are skipped; an all-NULL group sums
/// to NULL. Integer inputs sum as Long, floating inputs as Double.
#[derive(Debug)]
pub struct SumAgg {
    arg: ExprRef,
}

impl SumAgg {
    /// `SUM(expr)`.
    pub fn over(arg: ExprRef) -> Arc<dyn AggregateExpr> {
        Arc::new(Self { arg })
    }
}

impl AggregateExpr for SumAgg {
    fn aggregate(&self, group: &TupleVector, ctx: &mut ExecutionContext) -> VexResult<Value> {
        let values = self.arg.eval(group, ctx)?;
        let mut long_sum: i64 = 0;
        let mut double_sum: f64 = 0.0;
        let mut fractional = false;
        let mut seen = false;
        for row in 0..group.row_count() {
            let value = values.value(row);
            if value.is_null() {
                continue;
            }
            seen = true;
            match &value {
                Value::Float(_) | Value::Double(_) => {
                    fractional = true;
                    double_sum += value.try_double()?.unwrap_or(0.0);
                }
                _ => {
                    let v = value.try_long()?.ok_or_else(|| {
                        VexError::cast(&value, "Long")
                    })?;
                    long_sum += v;
                    double_sum += v as f64;
                }
            }
        }
        if !seen {
            return Ok(Value::Null);
        }
        Ok(if fractional {
            Value::Double(double_sum)
        } else {
            Value::Long(long_sum)
        })
    }

    fn label(&self) -> String {
        format!("sum({})", self.arg.label())
    }
}

/// `MIN(expr)` over a group. NULLs are skipped.
#[derive(Debug)]
pub struct MinAgg {
    arg: ExprRef,
}

impl MinAgg {
    /// `MIN(expr)`.
    pub fn over(arg: ExprRef) -> Arc<dyn AggregateExpr> {
        Arc::new(Self { arg })
    }
}

impl AggregateExpr for MinAgg {
    fn aggregate(&self, group: &TupleVector, ctx: &mut ExecutionContext) -> VexResult<Value> {
        let values = self.arg.eval(group, ctx)?;
        let mut min: Option<Value> = None;
        for row in 0..group.row_count() {
            let value = values.value(row);
            if value.is_null() {
                continue;
            }
            let smaller = match &min {
                None => true,
                Some(current) => value.compare(current) == Some(Ordering::Less),
            };
            if smaller {
                min = Some(value);
            }
        }
        Ok(min.unwrap_or(Value::Null))
    }

    fn label(&self) -> String {
        format!("min({})", self.arg.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{schema_of, TypedVector};

    fn batch() -> TupleVector {
        let schema = schema_of(&[("a", ResolvedType::Int), ("b", ResolvedType::Int)]);
        TupleVector::from_columns(
            schema,
            vec![
                Arc::new(TypedVector::ints([Some(1), Some(2), None, Some(4)])),
                Arc::new(TypedVector::ints([Some(2), Some(2), Some(3), None])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn comparison_yields_null_for_null_operands() {
        let mut ctx = ExecutionContext::default();
        let expr = ComparisonExpr::eq(ColumnExpr::new("a"), ColumnExpr::new("b"));
        let result = expr.eval(&batch(), &mut ctx).unwrap();
        assert_eq!(result.get_boolean(0).unwrap(), Some(false));
        assert_eq!(result.get_boolean(1).unwrap(), Some(true));
        assert_eq!(result.get_boolean(2).unwrap(), None);
        assert_eq!(result.get_boolean(3).unwrap(), None);
    }

    #[test]
    fn ordering_comparisons() {
        let mut ctx = ExecutionContext::default();
        let lt = ComparisonExpr::new(CmpOp::Lt, ColumnExpr::new("a"), ColumnExpr::new("b"));
        let result = lt.eval(&batch(), &mut ctx).unwrap();
        assert_eq!(result.get_boolean(0).unwrap(), Some(true));
        assert_eq!(result.get_boolean(1).unwrap(), Some(false));
    }

    #[test]
    fn logical_and_follows_three_valued_logic() {
        let mut ctx = ExecutionContext::default();
        // a = b AND a < b: (F,T,N,N) AND (T,F,N,N) per row.
        let expr = LogicalExpr::new(
            BoolOp::And,
            ComparisonExpr::eq(ColumnExpr::new("a"), ColumnExpr::new("b")),
            ComparisonExpr::new(CmpOp::Lt, ColumnExpr::new("a"), ColumnExpr::new("b")),
        );
        let result = expr.eval(&batch(), &mut ctx).unwrap();
        assert_eq!(result.get_boolean(0).unwrap(), Some(false));
        assert_eq!(result.get_boolean(1).unwrap(), Some(false));
        assert_eq!(result.get_boolean(2).unwrap(), None);
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let mut ctx = ExecutionContext::default();
        let expr = ColumnExpr::new("nope");
        let err = expr.eval(&batch(), &mut ctx).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn outer_column_requires_correlated_plan() {
        let mut ctx = ExecutionContext::default();
        let expr = OuterColumnExpr::new("a");
        assert!(expr.eval(&batch(), &mut ctx).is_err());

        let prev = ctx.swap_outer_tuple(Some(batch().row_view(1)));
        let result = expr.eval(&batch(), &mut ctx).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result.get_int(3).unwrap(), Some(2));
        ctx.swap_outer_tuple(prev);
    }

    #[test]
    fn count_and_sum_skip_nulls() {
        let mut ctx = ExecutionContext::default();
        let group = batch();
        assert_eq!(
            CountAgg::star().aggregate(&group, &mut ctx).unwrap(),
            Value::Long(4)
        );
        assert_eq!(
            CountAgg::over(ColumnExpr::new("a"))
                .aggregate(&group, &mut ctx)
                .unwrap(),
            Value::Long(3)
        );
        assert_eq!(
            SumAgg::over(ColumnExpr::new("a"))
                .aggregate(&group, &mut ctx)
                .unwrap(),
            Value::Long(7)
        );
        assert_eq!(
            MinAgg::over(ColumnExpr::new("b"))
                .aggregate(&group, &mut ctx)
                .unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn sum_of_all_nulls_is_null() {
        let mut ctx = ExecutionContext::default();
        let schema = schema_of(&[("x", ResolvedType::Int)]);
        let group = TupleVector::from_columns(
            schema,
            vec![Arc::new(TypedVector::ints([None, None]))],
        )
        .unwrap();
        assert_eq!(
            SumAgg::over(ColumnExpr::new("x"))
                .aggregate(&group, &mut ctx)
                .unwrap(),
            Value::Null
        );
    }
}
