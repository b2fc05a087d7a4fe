//! System-wide constants for the VEX runtime.

// =============================================================================
// Batch Sizing
// =============================================================================

/// Default number of rows per batch produced by leaf scans.
///
/// Large enough to amortize per-batch overhead, small enough to keep
/// intermediate join products cache-friendly.
pub const DEFAULT_BATCH_SIZE: usize = 4096;

/// Default number of rows fetched per index seek.
///
/// Index seeks fetch candidate rows per probe batch, so a smaller size
/// keeps the fetched working set proportional to the probe side.
pub const DEFAULT_SEEK_BATCH_SIZE: usize = 512;

/// Minimum allowed batch size.
pub const MIN_BATCH_SIZE: usize = 1;

/// Maximum allowed batch size (1M rows).
pub const MAX_BATCH_SIZE: usize = 1024 * 1024;

// =============================================================================
// Pre-sizing Hints
// =============================================================================

/// Row-count hint used when an operator reports no estimate.
///
/// Used only for buffer pre-sizing, never for correctness.
pub const UNKNOWN_ROWS_HINT: usize = 1024;
