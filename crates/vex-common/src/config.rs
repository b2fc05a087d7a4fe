//! Configuration for query execution.
//!
//! Each query execution owns one [`ExecutionConfig`]. The configuration
//! only tunes buffering behavior; it never changes query results.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_SEEK_BATCH_SIZE};

/// Configuration for query execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Target batch size for vectorized execution.
    pub batch_size: usize,
    /// Number of rows fetched per index seek.
    pub seek_batch_size: usize,
    /// Whether operators emit tracing events for diagnostics.
    pub trace_operators: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            seek_batch_size: DEFAULT_SEEK_BATCH_SIZE,
            trace_operators: false,
        }
    }
}

impl ExecutionConfig {
    /// Creates a config optimized for small data sets.
    #[must_use]
    pub fn for_small_data() -> Self {
        Self {
            batch_size: 256,
            seek_batch_size: 64,
            ..Default::default()
        }
    }

    /// Creates a config with the given batch size.
    #[must_use]
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(crate::constants::MIN_BATCH_SIZE),
            ..Default::default()
        }
    }
}
