//! Output writers consuming the root operator's batches.

use vex_common::VexResult;

use crate::schema::SchemaRef;
use crate::vector::{TupleVector, Value};

/// Receives query results row by row.
///
/// Columns are written under their output names; internal planner
/// columns are skipped.
pub trait OutputWriter {
    /// Called once with the resolved output schema before any rows.
    fn init(&mut self, schema: &SchemaRef) -> VexResult<()>;

    /// Starts a new output row.
    fn start_row(&mut self) -> VexResult<()>;

    /// Writes one named value of the current row.
    fn write_value(&mut self, name: &str, value: &Value) -> VexResult<()>;

    /// Finishes the current row.
    fn end_row(&mut self) -> VexResult<()>;
}

/// Streams a batch through a writer, row-major.
pub fn write_batch(writer: &mut dyn OutputWriter, batch: &TupleVector) -> VexResult<()> {
    let columns: Vec<(usize, &str)> = batch
        .schema()
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.internal)
        .map(|(ordinal, c)| (ordinal, c.output_name()))
        .collect();
    for row in 0..batch.row_count() {
        writer.start_row()?;
        for &(ordinal, name) in &columns {
            writer.write_value(name, &batch.value(ordinal, row))?;
        }
        writer.end_row()?;
    }
    Ok(())
}

/// A writer collecting rows in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct VecWriter {
    schema: Option<SchemaRef>,
    rows: Vec<Vec<(String, Value)>>,
    current: Vec<(String, Value)>,
}

impl VecWriter {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema received in `init`, if any.
    #[must_use]
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    /// The collected rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<(String, Value)>] {
        &self.rows
    }
}

impl OutputWriter for VecWriter {
    fn init(&mut self, schema: &SchemaRef) -> VexResult<()> {
        self.schema = Some(schema.clone());
        Ok(())
    }

    fn start_row(&mut self) -> VexResult<()> {
        self.current.clear();
        Ok(())
    }

    fn write_value(&mut self, name: &str, value: &Value) -> VexResult<()> {
        self.current.push((name.to_string(), value.clone()));
        Ok(())
    }

    fn end_row(&mut self) -> VexResult<()> {
        self.rows.push(std::mem::take(&mut self.current));
        Ok(())
    }
}
