//! Shared plumbing used by every stage of the Jarl pipeline: interned
//! strings, diagnostic collection, and source-position tracking.
//!
//! None of these types know anything about Jarl's grammar or bytecode —
//! they are the vocabulary the lexer, parser, checker, codegen and runtime
//! all speak when they need to name an identifier or report a line number.

pub mod diagnostic;
pub mod error;
pub mod span;
pub mod symbol;

pub use diagnostic::{Diagnostic, Handler, Level};
pub use error::JarlUtilError;
pub use span::{Position, SourceMap};
pub use symbol::Symbol;
