//! Schema resolution: concatenation, join output schemas and the
//! reconciliation of compile-time schemas against runtime batches.

use vex_common::{VexError, VexResult};

use crate::schema::{Column, ColumnKind, ColumnReference, ResolvedType, Schema, SchemaRef};

/// Positional concatenation of two schemas (flat join output).
#[must_use]
pub fn concat(left: &SchemaRef, right: &SchemaRef) -> Schema {
    let mut columns = Vec::with_capacity(left.len() + right.len());
    columns.extend_from_slice(left.columns());
    columns.extend_from_slice(right.columns());
    Schema::new(columns)
}

/// Output schema of a join.
///
/// A populate join keeps the outer columns and appends one nested-table
/// column named after the populate alias. A flat join concatenates both
/// sides.
#[must_use]
pub fn join_schema(outer: &SchemaRef, inner: &SchemaRef, populate_alias: Option<&str>) -> Schema {
    match populate_alias {
        Some(alias) => {
            let mut columns = outer.columns().to_vec();
            columns.push(Column::new(alias, ResolvedType::TupleVector(inner.clone())));
            Schema::new(columns)
        }
        None => concat(outer, inner),
    }
}

/// Returns true if the schema defers any columns to runtime.
///
/// The empty sentinel schema counts as asterisk: the source promised
/// nothing at compile time.
#[must_use]
pub fn is_asterisk(schema: &Schema) -> bool {
    schema.is_empty() || schema.columns().iter().any(Column::is_asterisk)
}

/// Reconciles a compile-time schema against the schema of the first
/// runtime batch, producing the resolved output schema.
///
/// Regular columns must line up positionally with matching names
/// (case-insensitive); a deferred `Any` type adopts the runtime type.
/// At most one asterisk column is allowed and it expands in place to
/// the runtime columns not claimed by the regular columns around it.
/// Expanded columns become regular references against the asterisk's
/// table source. An asterisk that expands to zero columns is a
/// mismatch: the source produced nothing to stand in for it.
pub fn validate_runtime(compile: &Schema, runtime: &Schema) -> VexResult<Schema> {
    if compile.is_empty() {
        if runtime.is_empty() {
            return Err(VexError::schema_mismatch(
                "deferred schema resolved to zero runtime columns",
            ));
        }
        return Ok(runtime.clone());
    }

    let asterisks = compile
        .columns()
        .iter()
        .filter(|c| c.is_asterisk())
        .count();
    if asterisks > 1 {
        return Err(VexError::schema_mismatch(format!(
            "schema has {asterisks} asterisk columns, at most one is allowed"
        )));
    }

    if asterisks == 0 {
        if compile.len() != runtime.len() {
            return Err(VexError::schema_mismatch(format!(
                "expected {} columns, runtime batch has {}",
                compile.len(),
                runtime.len()
            )));
        }
        let columns = compile
            .columns()
            .iter()
            .zip(runtime.columns())
            .map(|(c, r)| reconcile_column(c, r))
            .collect::<VexResult<Vec<_>>>()?;
        return Ok(Schema::new(columns));
    }

    // One asterisk: regular columns before it claim the runtime prefix,
    // regular columns after it claim the runtime suffix, the asterisk
    // expands to whatever is left in between.
    let position = compile
        .columns()
        .iter()
        .position(Column::is_asterisk)
        .unwrap_or(0);
    let before = &compile.columns()[..position];
    let after = &compile.columns()[position + 1..];
    let claimed = before.len() + after.len();
    if runtime.len() <= claimed {
        return Err(VexError::schema_mismatch(format!(
            "asterisk expands to zero columns, runtime batch has {} of {} claimed",
            runtime.len(),
            claimed
        )));
    }

    let expanded = runtime.len() - claimed;
    let asterisk = &compile.columns()[position];
    let mut columns = Vec::with_capacity(runtime.len());
    for (c, r) in before.iter().zip(&runtime.columns()[..position]) {
        columns.push(reconcile_column(c, r)?);
    }
    for r in &runtime.columns()[position..position + expanded] {
        columns.push(expand_column(asterisk, r));
    }
    for (c, r) in after.iter().zip(&runtime.columns()[position + expanded..]) {
        columns.push(reconcile_column(c, r)?);
    }
    Ok(Schema::new(columns))
}

/// Reconciles one regular column against its runtime counterpart.
fn reconcile_column(compile: &Column, runtime: &Column) -> VexResult<Column> {
    if !compile.name.eq_ignore_ascii_case(&runtime.name) {
        return Err(VexError::schema_mismatch(format!(
            "expected column '{}', runtime batch has '{}'",
            compile.name, runtime.name
        )));
    }
    let ty = match (&compile.ty, &runtime.ty) {
        (ResolvedType::Any, runtime_ty) => runtime_ty.clone(),
        (compile_ty, ResolvedType::Any) => compile_ty.clone(),
        (compile_ty, runtime_ty) if compile_ty == runtime_ty => compile_ty.clone(),
        (compile_ty, runtime_ty) => {
            return Err(VexError::schema_mismatch(format!(
                "column '{}' declared {} but runtime batch has {}",
                compile.name, compile_ty, runtime_ty
            )));
        }
    };
    let mut resolved = compile.clone();
    resolved.ty = ty;
    Ok(resolved)
}

/// Materializes one runtime column out of an asterisk placeholder.
fn expand_column(asterisk: &Column, runtime: &Column) -> Column {
    let reference = asterisk.reference.as_ref().map(|r| ColumnReference {
        table_source: r.table_source,
        name: runtime.name.clone(),
        kind: ColumnKind::Regular,
    });
    Column {
        name: runtime.name.clone(),
        output_name: runtime.output_name.clone(),
        ty: runtime.ty.clone(),
        reference,
        internal: asterisk.internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableSourceRegistry;
    use crate::vector::schema_of;

    #[test]
    fn concat_preserves_order() {
        let left = schema_of(&[("a", ResolvedType::Int)]);
        let right = schema_of(&[("b", ResolvedType::String)]);
        let joined = concat(&left, &right);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.column(0).unwrap().name, "a");
        assert_eq!(joined.column(1).unwrap().name, "b");
    }

    #[test]
    fn populate_join_nests_the_inner_schema() {
        let outer = schema_of(&[("a", ResolvedType::Int)]);
        let inner = schema_of(&[("b", ResolvedType::String)]);
        let joined = join_schema(&outer, &inner, Some("rows"));
        assert_eq!(joined.len(), 2);
        let nested = joined.column(1).unwrap();
        assert_eq!(nested.name, "rows");
        assert_eq!(nested.ty, ResolvedType::TupleVector(inner));
    }

    #[test]
    fn empty_schema_adopts_runtime() {
        let compile = Schema::empty();
        let runtime = schema_of(&[("x", ResolvedType::Int)]);
        let resolved = validate_runtime(&compile, &runtime).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.column(0).unwrap().name, "x");

        assert!(validate_runtime(&compile, &Schema::empty()).is_err());
    }

    #[test]
    fn any_columns_adopt_runtime_types() {
        let compile = schema_of(&[("a", ResolvedType::Any), ("b", ResolvedType::Int)]);
        let runtime = schema_of(&[("a", ResolvedType::String), ("b", ResolvedType::Int)]);
        let resolved = validate_runtime(&compile, &runtime).unwrap();
        assert_eq!(resolved.column(0).unwrap().ty, ResolvedType::String);
        assert_eq!(resolved.column(1).unwrap().ty, ResolvedType::Int);
    }

    #[test]
    fn conflicting_types_are_rejected() {
        let compile = schema_of(&[("a", ResolvedType::Int)]);
        let runtime = schema_of(&[("a", ResolvedType::String)]);
        let err = validate_runtime(&compile, &runtime).unwrap_err();
        assert!(err.to_string().contains("declared Int"));
    }

    #[test]
    fn name_mismatch_is_rejected() {
        let compile = schema_of(&[("a", ResolvedType::Int)]);
        let runtime = schema_of(&[("b", ResolvedType::Int)]);
        assert!(validate_runtime(&compile, &runtime).is_err());
    }

    #[test]
    fn asterisk_expands_to_runtime_columns() {
        let mut registry = TableSourceRegistry::new();
        let source = registry.register("", "t", "t");
        let compile = Schema::new(vec![Column::asterisk(source.id)]);
        assert!(is_asterisk(&compile));

        let runtime = schema_of(&[("x", ResolvedType::Int), ("y", ResolvedType::String)]);
        let resolved = validate_runtime(&compile, &runtime).unwrap();
        assert_eq!(resolved.len(), 2);
        let x = resolved.column(0).unwrap();
        assert_eq!(x.name, "x");
        assert!(!x.is_asterisk());
        assert_eq!(
            x.reference.as_ref().unwrap().table_source,
            source.id
        );
    }

    #[test]
    fn asterisk_with_surrounding_regulars() {
        let mut registry = TableSourceRegistry::new();
        let source = registry.register("", "t", "t");
        let compile = Schema::new(vec![
            Column::new("head", ResolvedType::Int),
            Column::asterisk(source.id),
            Column::new("tail", ResolvedType::String),
        ]);
        let runtime = schema_of(&[
            ("head", ResolvedType::Int),
            ("m1", ResolvedType::Long),
            ("m2", ResolvedType::Double),
            ("tail", ResolvedType::String),
        ]);
        let resolved = validate_runtime(&compile, &runtime).unwrap();
        assert_eq!(resolved.len(), 4);
        assert_eq!(resolved.column(1).unwrap().name, "m1");
        assert_eq!(resolved.column(2).unwrap().name, "m2");
    }

    #[test]
    fn asterisk_needs_at_least_one_runtime_column() {
        let mut registry = TableSourceRegistry::new();
        let source = registry.register("", "t", "t");
        let compile = Schema::new(vec![
            Column::new("a", ResolvedType::Int),
            Column::asterisk(source.id),
        ]);
        let runtime = schema_of(&[("a", ResolvedType::Int)]);
        assert!(validate_runtime(&compile, &runtime).is_err());
    }

    #[test]
    fn deferred_sentinel_detection() {
        assert!(is_asterisk(&Schema::empty()));
        let concrete = schema_of(&[("a", ResolvedType::Int)]);
        assert!(!is_asterisk(&concrete));
    }
}
