//! Schema representation for the execution runtime.
//!
//! Schemas describe the columns of every batch flowing between operators.
//! Two regimes exist: statically-typed sources carry a known compile-time
//! schema, while schema-less sources defer their real columns to the first
//! produced batch by carrying a single asterisk column. The [`resolve`]
//! module reconciles the two.

pub mod resolve;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Type alias for schema reference.
pub type SchemaRef = Arc<Schema>;

/// The resolved type of a column or expression.
///
/// Equality is structural: nested variants compare their payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolvedType {
    /// Type unknown until runtime.
    Any,
    /// Boolean value.
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit floating point.
    Float,
    /// 64-bit floating point.
    Double,
    /// UTF-8 string.
    String,
    /// Date and time, epoch milliseconds.
    DateTime,
    /// A value that writes itself to an output writer.
    OutputWritable,
    /// A nested table with the given schema (populate joins).
    TupleVector(SchemaRef),
    /// A vector of values of the given type (scalar-over-group results).
    ValueVector(Box<ResolvedType>),
}

impl ResolvedType {
    /// Returns a short name for error messages and display.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::Boolean => "Boolean",
            Self::Int => "Int",
            Self::Long => "Long",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::OutputWritable => "OutputWritable",
            Self::TupleVector(_) => "TupleVector",
            Self::ValueVector(_) => "ValueVector",
        }
    }

    /// Returns true if this is the deferred [`ResolvedType::Any`] type.
    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl fmt::Display for ResolvedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TupleVector(schema) => write!(f, "TupleVector({schema})"),
            Self::ValueVector(inner) => write!(f, "ValueVector({inner})"),
            other => f.write_str(other.name()),
        }
    }
}

/// The kind of a column reference.
///
/// Asterisk kinds mark columns whose real runtime columns are unknown
/// until a data source produces its first batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    /// An ordinary, statically planned column.
    Regular,
    /// A placeholder expanding to N runtime columns.
    Asterisk,
    /// A renamed asterisk placeholder.
    NamedAsterisk,
}

impl ColumnKind {
    /// Returns true for [`ColumnKind::Asterisk`] and
    /// [`ColumnKind::NamedAsterisk`].
    #[must_use]
    pub fn is_asterisk(self) -> bool {
        matches!(self, Self::Asterisk | Self::NamedAsterisk)
    }
}

/// Identity of a scanned table or table function.
///
/// Equality is by value. Ids are handed out by [`TableSourceRegistry`];
/// columns link back to their source by id, never by pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSourceReference {
    /// Registry id of this source.
    pub id: TableSourceId,
    /// Alias of the owning catalog.
    pub catalog_alias: String,
    /// Qualified name of the table or function.
    pub qualified_name: String,
    /// Alias the source was planned under.
    pub alias: String,
}

impl fmt::Display for TableSourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.qualified_name, self.alias)
    }
}

/// Identifier of a [`TableSourceReference`] in a [`TableSourceRegistry`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TableSourceId(pub u32);

/// Side table of table sources referenced by plan columns.
#[derive(Debug, Default)]
pub struct TableSourceRegistry {
    sources: Vec<TableSourceReference>,
}

impl TableSourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table source and returns its reference.
    pub fn register(
        &mut self,
        catalog_alias: impl Into<String>,
        qualified_name: impl Into<String>,
        alias: impl Into<String>,
    ) -> TableSourceReference {
        let id = TableSourceId(u32::try_from(self.sources.len()).unwrap_or(u32::MAX));
        let source = TableSourceReference {
            id,
            catalog_alias: catalog_alias.into(),
            qualified_name: qualified_name.into(),
            alias: alias.into(),
        };
        self.sources.push(source.clone());
        source
    }

    /// Looks up a table source by id.
    #[must_use]
    pub fn get(&self, id: TableSourceId) -> Option<&TableSourceReference> {
        self.sources.get(id.0 as usize)
    }
}

/// A non-owning link from a column back to the table source it was
/// planned against. Used for provenance, never for ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnReference {
    /// Id of the owning table source.
    pub table_source: TableSourceId,
    /// Column name within the source.
    pub name: String,
    /// Kind of the reference.
    pub kind: ColumnKind,
}

impl ColumnReference {
    /// Creates a regular column reference.
    pub fn regular(table_source: TableSourceId, name: impl Into<String>) -> Self {
        Self {
            table_source,
            name: name.into(),
            kind: ColumnKind::Regular,
        }
    }

    /// Creates an asterisk reference for a schema-less source.
    #[must_use]
    pub fn asterisk(table_source: TableSourceId) -> Self {
        Self {
            table_source,
            name: "*".to_string(),
            kind: ColumnKind::Asterisk,
        }
    }

    /// Renames this reference.
    ///
    /// Renaming an asterisk yields a named asterisk; a regular reference
    /// stays regular.
    #[must_use]
    pub fn rename(&self, name: impl Into<String>) -> Self {
        let kind = match self.kind {
            ColumnKind::Regular => ColumnKind::Regular,
            ColumnKind::Asterisk | ColumnKind::NamedAsterisk => ColumnKind::NamedAsterisk,
        };
        Self {
            table_source: self.table_source,
            name: name.into(),
            kind,
        }
    }

    /// Returns true if this reference is an asterisk placeholder.
    #[must_use]
    pub fn is_asterisk(&self) -> bool {
        self.kind.is_asterisk()
    }
}

/// A column in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Optional serialization override. A computed expression keeps an
    /// internal alias in `name` but displays its source text here.
    pub output_name: Option<String>,
    /// Resolved type.
    pub ty: ResolvedType,
    /// Back-reference to the table source this column was planned
    /// against, if any.
    pub reference: Option<ColumnReference>,
    /// Internal columns are planner plumbing and excluded from output.
    pub internal: bool,
}

impl Column {
    /// Creates a new column.
    pub fn new(name: impl Into<String>, ty: ResolvedType) -> Self {
        Self {
            name: name.into(),
            output_name: None,
            ty,
            reference: None,
            internal: false,
        }
    }

    /// Attaches a column reference.
    #[must_use]
    pub fn with_reference(mut self, reference: ColumnReference) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Overrides the serialization name.
    #[must_use]
    pub fn with_output_name(mut self, output_name: impl Into<String>) -> Self {
        self.output_name = Some(output_name.into());
        self
    }

    /// Marks this column as internal.
    #[must_use]
    pub fn into_internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Creates an asterisk placeholder column for a schema-less source.
    #[must_use]
    pub fn asterisk(table_source: TableSourceId) -> Self {
        Self::new("*", ResolvedType::Any).with_reference(ColumnReference::asterisk(table_source))
    }

    /// Returns the name used for serialization.
    #[must_use]
    pub fn output_name(&self) -> &str {
        self.output_name.as_deref().unwrap_or(&self.name)
    }

    /// Returns true if this column is an asterisk placeholder.
    #[must_use]
    pub fn is_asterisk(&self) -> bool {
        self.reference
            .as_ref()
            .is_some_and(ColumnReference::is_asterisk)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.output_name(), self.ty)
    }
}

/// An ordered list of columns.
///
/// Insertion order is significant: it defines the column ordinals. The
/// empty schema is the sentinel for "schema not known until runtime".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Creates a new schema from columns.
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// The empty sentinel schema.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if this is the empty sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the column at the given ordinal.
    #[must_use]
    pub fn column(&self, ordinal: usize) -> Option<&Column> {
        self.columns.get(ordinal)
    }

    /// Returns all columns.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the ordinal of the first column matching `name`
    /// (case-insensitive).
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{column}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_asterisk_yields_named_asterisk() {
        let mut registry = TableSourceRegistry::new();
        let source = registry.register("", "sys#tables", "t");

        let asterisk = ColumnReference::asterisk(source.id);
        let renamed = asterisk.rename("x");
        assert_eq!(renamed.kind, ColumnKind::NamedAsterisk);
        assert!(renamed.is_asterisk());

        let regular = ColumnReference::regular(source.id, "col");
        assert_eq!(regular.rename("other").kind, ColumnKind::Regular);
    }

    #[test]
    fn registry_hands_out_sequential_ids() {
        let mut registry = TableSourceRegistry::new();
        let a = registry.register("", "a", "a");
        let b = registry.register("", "b", "b");
        assert_eq!(a.id, TableSourceId(0));
        assert_eq!(b.id, TableSourceId(1));
        assert_eq!(registry.get(b.id).unwrap().qualified_name, "b");
    }

    #[test]
    fn output_name_overrides_name() {
        let col = Column::new("__expr0", ResolvedType::Int).with_output_name("a + b");
        assert_eq!(col.output_name(), "a + b");
        assert_eq!(col.name, "__expr0");
    }

    #[test]
    fn resolved_type_equality_is_structural() {
        let inner = Arc::new(Schema::new(vec![Column::new("x", ResolvedType::Int)]));
        let a = ResolvedType::TupleVector(inner.clone());
        let b = ResolvedType::TupleVector(Arc::new(Schema::new(vec![Column::new(
            "x",
            ResolvedType::Int,
        )])));
        assert_eq!(a, b);
        assert_ne!(a, ResolvedType::TupleVector(Arc::new(Schema::empty())));
        let _ = inner;
    }

    #[test]
    fn index_of_is_case_insensitive() {
        let schema = Schema::new(vec![
            Column::new("Id", ResolvedType::Int),
            Column::new("Name", ResolvedType::String),
        ]);
        assert_eq!(schema.index_of("id"), Some(0));
        assert_eq!(schema.index_of("NAME"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
    }
}
