//! Runtime error taxonomy.
//!
//! Unlike lex/parse/check errors (accumulated into a `Handler`), a
//! `RuntimeError` is fatal the instant it occurs: the VM stops executing
//! the current script and reports one diagnostic. Either the VM runs the
//! program to completion, or it runs to the first failure and stops.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("value stack exhausted (capacity {capacity})")]
    StackOverflow { capacity: usize },

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}
