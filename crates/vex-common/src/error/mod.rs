//! Error handling for the VEX runtime.
//!
//! This module provides the unified error type and result alias used
//! across all VEX components.

mod engine;

pub use engine::{ErrorCode, VexError};

/// Result type alias for VEX operations.
pub type VexResult<T> = std::result::Result<T, VexError>;
