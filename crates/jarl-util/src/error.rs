//! Error types for the utility layer itself (the interner and source map).
//!
//! Pipeline-stage errors (lex/parse/check/codegen/runtime) are represented
//! as [`crate::Diagnostic`]s instead of `Result` error types, per the
//! "accumulate and continue" failure model described by the pipeline; this
//! module only covers the small number of ways the utilities below can be
//! misused programmatically.

use thiserror::Error;

/// Errors raised by [`crate::span::SourceMap`] when a caller asks for a
/// position outside the tracked source.
#[derive(Debug, Error)]
pub enum JarlUtilError {
    #[error("byte offset {offset} is out of bounds for a source of length {len}")]
    OffsetOutOfBounds { offset: usize, len: usize },

    #[error("line {line} does not exist; source has {max_lines} lines")]
    InvalidLine { line: u32, max_lines: u32 },
}
