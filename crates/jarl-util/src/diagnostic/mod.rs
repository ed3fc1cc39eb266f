//! Diagnostic collection for every pipeline stage.
//!
//! Lex, parse and semantic-check errors are *accumulated* rather than
//! aborting the stage that found them, so that a single compile reports as
//! many problems as it can; the [`Handler`] is the shared sink all three
//! stages push into. Runtime errors use the same [`Diagnostic`] shape but
//! are delivered straight to the host's error sink instead of accumulating
//! (per the failure semantics: once the VM hits one, the script is done).

use std::cell::RefCell;
use std::fmt;

/// Severity of a diagnostic. Jarl's error taxonomy has no warnings (every
/// compile-time problem prevents code generation), but `Level` is kept as
/// an enum rather than a single variant so a future lint pass has
/// somewhere to plug in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
        }
    }
}

/// One reported problem, always formattable as `"line N: message"` per the
/// error handling design (§7).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub line: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn error(line: u32, message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Accumulates diagnostics for one compile (lex + parse + check share a
/// single `Handler` instance, matching the pipeline's single error sink).
///
/// `RefCell`-backed: diagnostics are pushed from deep inside read-only
/// tree walks that don't otherwise need `&mut self`, so interior
/// mutability here is cheaper than threading `&mut Handler` through every
/// recursive call.
#[derive(Debug, Default)]
pub struct Handler {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self, line: u32, message: impl Into<String>) {
        self.diagnostics
            .borrow_mut()
            .push(Diagnostic::error(line, message));
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.borrow().is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.borrow().len()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    /// Renders every accumulated diagnostic as `"line N: message"`, one per
    /// line, in the order they were reported.
    pub fn render(&self) -> String {
        self.diagnostics
            .borrow()
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&self) {
        self.diagnostics.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_in_order() {
        let handler = Handler::new();
        handler.error(3, "undeclared identifier 'x'");
        handler.error(5, "expected ':'");
        assert_eq!(handler.error_count(), 2);
        assert_eq!(
            handler.render(),
            "line 3: undeclared identifier 'x'\nline 5: expected ':'"
        );
    }

    #[test]
    fn empty_handler_has_no_errors() {
        let handler = Handler::new();
        assert!(!handler.has_errors());
        assert_eq!(handler.render(), "");
    }
}
