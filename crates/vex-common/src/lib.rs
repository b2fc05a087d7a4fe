//! # vex-common
//!
//! Common types, errors, and configuration for the VEX execution runtime.
//!
//! This crate provides the foundational pieces shared by every VEX
//! component:
//!
//! - **Errors**: unified error handling with [`VexError`] and stable
//!   [`ErrorCode`]s
//! - **Config**: execution configuration structures
//! - **Constants**: system-wide constants and limits
//!
//! ## Example
//!
//! ```rust
//! use vex_common::{VexError, VexResult};
//!
//! fn parse_flag(text: &str) -> VexResult<bool> {
//!     match text {
//!         "y" | "yes" | "true" | "1" => Ok(true),
//!         "n" | "no" | "false" | "0" => Ok(false),
//!         other => Err(VexError::cast(other, "Boolean")),
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod constants;
pub mod error;

// Re-export commonly used items at the crate root
pub use config::ExecutionConfig;
pub use constants::*;
pub use error::{ErrorCode, VexError, VexResult};
