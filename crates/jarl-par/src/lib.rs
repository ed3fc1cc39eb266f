//! Pratt parsing of a `jarl-lex` token stream into the Jarl AST.
//!
//! `expression(rbp)` reads one token as `nud` (literals, prefix operators,
//! block-opening punctuation, keyword heads) and then, while the lookahead
//! token's binding power exceeds `rbp`, consumes it and dispatches to
//! `led`. Binding power is looked up from `jarl_lex::binding_power`
//! directly — there is no separate precedence table here. See
//! [`parser::Parser`] for the implementation and `ast` for the tree shape.

mod ast;
mod parser;

pub use ast::{AssignOp, BinaryOp, Expr, ForStepper, FunctionLit, LogicalOp, UnaryOp};
pub use parser::{parse, Parser};
