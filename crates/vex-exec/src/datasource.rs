//! Data source abstraction feeding the scan operators.
//!
//! Scans are the only operators that talk to storage. A [`DataSource`]
//! opens a [`SourceIterator`] per execution; the iterator owns whatever
//! storage resources the scan holds and releases them in `close`. Scan
//! operators close their iterator exactly once, on drain, error or
//! early termination alike.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vex_common::{VexError, VexResult};

use crate::context::ExecutionContext;
use crate::schema::{Schema, SchemaRef};
use crate::vector::{TupleVector, Value};

/// Reference-counted data source handle.
pub type DataSourceRef = Arc<dyn DataSource>;

/// Options passed to a data source when a scan opens it.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Columns the plan needs, by name. `None` means all columns.
    pub projection: Option<Vec<String>>,
    /// Preferred batch size. Sources may produce smaller batches.
    pub batch_size: usize,
    /// Index keys to seek to, for index scans.
    pub seek_keys: Option<SeekKeys>,
}

/// Key values an index seek restricts a scan to.
///
/// Each entry of `keys` is one composite key, with one value per column
/// in `columns`.
#[derive(Debug, Clone)]
pub struct SeekKeys {
    /// Key columns, in index order.
    pub columns: Vec<String>,
    /// Composite key values to seek to.
    pub keys: Vec<Vec<Value>>,
}

/// A source of batches, typically a table or a table function.
pub trait DataSource: fmt::Debug + Send + Sync {
    /// Compile-time schema. The empty sentinel defers to the first
    /// produced batch.
    fn schema(&self) -> SchemaRef;

    /// Opens an iterator over the source's rows.
    fn execute(
        &self,
        ctx: &mut ExecutionContext,
        options: &ScanOptions,
    ) -> VexResult<Box<dyn SourceIterator>>;

    /// Row count hint for buffer pre-sizing. `None` when unknown.
    fn estimated_rows(&self) -> Option<usize> {
        None
    }
}

/// One opened scan over a data source.
pub trait SourceIterator: fmt::Debug {
    /// Produces the next batch, or `None` once drained.
    fn next_batch(&mut self) -> VexResult<Option<TupleVector>>;

    /// Releases the resources of this scan.
    fn close(&mut self);
}

/// Computes the seek keys of an index scan at execution time.
///
/// Implementations typically read the bound outer tuple of a correlated
/// plan. Returning `Ok(None)` means the keys are unknown and the seek
/// degrades to a full scan; an empty key list means nothing can match
/// and the source is not opened at all.
pub trait SeekPredicate: fmt::Debug + Send + Sync {
    /// Name of the index being sought, for plan output.
    fn index_name(&self) -> &str;

    /// The index key columns, in order.
    fn key_columns(&self) -> &[String];

    /// Resolves the key values for the current execution.
    fn seek_keys(&self, ctx: &ExecutionContext) -> VexResult<Option<SeekKeys>>;
}

/// A [`SeekPredicate`] taking its key values from the bound outer tuple.
///
/// Each outer row contributes one composite key, read from the given
/// outer columns. Rows with a NULL key value are skipped, NULL never
/// matches an index entry.
#[derive(Debug)]
pub struct OuterKeySeek {
    index_name: String,
    key_columns: Vec<String>,
    outer_columns: Vec<String>,
}

impl OuterKeySeek {
    /// Seeks `index_name` on `key_columns` with values read from the
    /// outer tuple's `outer_columns`.
    pub fn new(
        index_name: impl Into<String>,
        key_columns: Vec<String>,
        outer_columns: Vec<String>,
    ) -> Self {
        Self {
            index_name: index_name.into(),
            key_columns,
            outer_columns,
        }
    }
}

impl SeekPredicate for OuterKeySeek {
    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    fn seek_keys(&self, ctx: &ExecutionContext) -> VexResult<Option<SeekKeys>> {
        let Some(outer) = ctx.outer_tuple() else {
            return Ok(None);
        };
        let ordinals = self
            .outer_columns
            .iter()
            .map(|name| {
                outer.schema().index_of(name).ok_or_else(|| {
                    VexError::schema_mismatch(format!(
                        "seek column '{name}' not found in {}",
                        outer.schema()
                    ))
                })
            })
            .collect::<VexResult<Vec<_>>>()?;

        let mut keys = Vec::with_capacity(outer.row_count());
        'rows: for row in 0..outer.row_count() {
            let mut key = Vec::with_capacity(ordinals.len());
            for &ordinal in &ordinals {
                let value = outer.value(ordinal, row);
                if value.is_null() {
                    continue 'rows;
                }
                key.push(value);
            }
            keys.push(key);
        }
        Ok(Some(SeekKeys {
            columns: self.key_columns.clone(),
            keys,
        }))
    }
}

/// An in-memory data source over one materialized batch.
///
/// Serves tests and table functions. Tracks how many iterators were
/// opened and closed so the close-exactly-once discipline of the scan
/// operators is observable.
#[derive(Debug)]
pub struct MemoryDataSource {
    data: TupleVector,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl MemoryDataSource {
    /// Wraps a batch as a data source.
    #[must_use]
    pub fn new(data: TupleVector) -> Arc<Self> {
        Arc::new(Self {
            data,
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of iterators opened so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of close calls received so far.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn apply_projection(&self, projection: &[String]) -> VexResult<TupleVector> {
        let schema = self.data.schema();
        let mut columns = Vec::with_capacity(projection.len());
        let mut kept = Vec::with_capacity(projection.len());
        for name in projection {
            let ordinal = schema.index_of(name).ok_or_else(|| {
                VexError::schema_mismatch(format!(
                    "projected column '{name}' not found in {schema}"
                ))
            })?;
            columns.push(self.data.column(ordinal).clone());
            kept.push(
                schema
                    .column(ordinal)
                    .cloned()
                    .ok_or_else(|| VexError::internal("column ordinal out of range"))?,
            );
        }
        TupleVector::new(Arc::new(Schema::new(kept)), columns, self.data.row_count())
    }

    fn apply_seek(data: &TupleVector, seek: &SeekKeys) -> VexResult<TupleVector> {
        let ordinals = seek
            .columns
            .iter()
            .map(|name| {
                data.schema().index_of(name).ok_or_else(|| {
                    VexError::schema_mismatch(format!(
                        "seek column '{name}' not found in {}",
                        data.schema()
                    ))
                })
            })
            .collect::<VexResult<Vec<_>>>()?;

        let mut indices = Vec::new();
        'rows: for row in 0..data.row_count() {
            for key in &seek.keys {
                let matches = ordinals.iter().zip(key).all(|(&ordinal, value)| {
                    let actual = data.value(ordinal, row);
                    !actual.is_null() && !value.is_null() && actual == *value
                });
                if matches {
                    indices.push(row);
                    continue 'rows;
                }
            }
        }
        Ok(data.select(Arc::new(indices)).materialize())
    }
}

impl DataSource for MemoryDataSource {
    fn schema(&self) -> SchemaRef {
        self.data.schema().clone()
    }

    fn execute(
        &self,
        _ctx: &mut ExecutionContext,
        options: &ScanOptions,
    ) -> VexResult<Box<dyn SourceIterator>> {
        let mut data = match &options.projection {
            Some(projection) => self.apply_projection(projection)?,
            None => self.data.clone(),
        };
        if let Some(seek) = &options.seek_keys {
            data = Self::apply_seek(&data, seek)?;
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryIterator {
            data,
            cursor: 0,
            batch_size: options.batch_size.max(1),
            closed: self.closed.clone(),
        }))
    }

    fn estimated_rows(&self) -> Option<usize> {
        Some(self.data.row_count())
    }
}

#[derive(Debug)]
struct MemoryIterator {
    data: TupleVector,
    cursor: usize,
    batch_size: usize,
    closed: Arc<AtomicUsize>,
}

impl SourceIterator for MemoryIterator {
    fn next_batch(&mut self) -> VexResult<Option<TupleVector>> {
        if self.cursor >= self.data.row_count() {
            return Ok(None);
        }
        let end = (self.cursor + self.batch_size).min(self.data.row_count());
        let indices: Vec<usize> = (self.cursor..end).collect();
        self.cursor = end;
        Ok(Some(self.data.select(Arc::new(indices))))
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
