//! Lexical analysis: turns a source string into a flat token stream.
//!
//! The output is a `Vec<Lexeme>` with a leading `Sof` sentinel and a
//! trailing `Eof`, matching the shape the parser expects to peek/advance
//! over without special-casing the first and last token.
//!
//! Precedence lives in an explicit [`token::binding_power`] table rather
//! than packed into each token tag's numeric value, which would be faster
//! to recover but fragile to extend. `LexemeKind` variants are grouped by
//! class (stop-symbols, assignment, boolean, compare, arithmetic,
//! unary/application) so the table reads in the same order.

mod lexer;
mod token;

pub use lexer::{lex, Lexer};
pub use token::{binding_power, is_right_assoc, starts_value, Lexeme, LexemeKind, Payload};
