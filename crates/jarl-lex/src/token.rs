//! Token kinds, payloads, and the binding-power table the parser consults.

use jarl_util::{Position, Symbol};

/// Every distinct lexeme the lexer can produce.
///
/// Grouped by class (stop/assign/bool/compare/arith/unary) so the
/// binding-power table below reads in the same order, even though binding
/// power is looked up explicitly rather than masked out of the
/// discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LexemeKind {
    // Sentinels
    Sof,
    Eof,

    // Stop symbols: never consumed by the generic Pratt continuation loop.
    Newline,
    Semi,
    Comma,
    Colon,
    RParen,
    RBracket,
    RBrace,
    Else,

    // Values (nud-only)
    Int,
    Float,
    Str,
    Ident,
    True,
    False,
    Null,

    // Keyword heads (nud-only, drive special forms)
    If,
    While,
    For,
    Func,
    Var,
    Print,
    Assert,
    Return,

    // Opening punctuation (nud-only)
    LParen,
    LBrace,

    // Assignment family: right-associative, lowest operator precedence.
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    ConcatAssign,
    MoveAssign,

    // Boolean
    Or,
    And,

    // Comparison (includes the `in` membership test)
    EqEq,
    NotEq,
    Cmp,
    Gt,
    Lt,
    Geq,
    Leq,
    In,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Concat,

    // Unary (prefix-only)
    Not,
    Move,

    // Highest precedence: postfix indexing. `LBracket` doubles as the nud
    // for array literals and the led for `target[index]`/`target[a:b]`.
    LBracket,

    /// `..`, only meaningful directly inside `[ a .. b ]`.
    DotDot,
}

/// Literal payload attached to `Int`, `Float`, `Str` and `Ident` tokens.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Int(i64),
    Float(f64),
    Str(Symbol),
    Ident(Symbol),
}

/// One token: its kind, the source position it started at, and an
/// optional payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Lexeme {
    pub kind: LexemeKind,
    pub pos: Position,
    pub payload: Option<Payload>,
}

impl Lexeme {
    pub fn new(kind: LexemeKind, pos: Position) -> Self {
        Self {
            kind,
            pos,
            payload: None,
        }
    }

    pub fn with_payload(kind: LexemeKind, pos: Position, payload: Payload) -> Self {
        Self {
            kind,
            pos,
            payload: Some(payload),
        }
    }
}

/// Binding power of `kind` for the purposes of the Pratt parser's
/// continuation test (`while peek_bp() > rbp`). Stop symbols and nud-only
/// tokens return `0`, which is lower than every real operator, so they
/// never get mistaken for an infix continuation.
pub fn binding_power(kind: LexemeKind) -> u8 {
    use LexemeKind::*;
    match kind {
        Assign | PlusAssign | MinusAssign | StarAssign | SlashAssign | PercentAssign
        | ConcatAssign | MoveAssign => 10,
        Or => 20,
        And => 30,
        EqEq | NotEq | Cmp | Gt | Lt | Geq | Leq | In => 40,
        Plus | Minus => 50,
        Star | Slash | Percent => 60,
        Concat => 70,
        LBracket => 90,
        _ => 0,
    }
}

/// Whether `kind` is right-associative (only the assignment family is).
pub fn is_right_assoc(kind: LexemeKind) -> bool {
    use LexemeKind::*;
    matches!(
        kind,
        Assign | PlusAssign | MinusAssign | StarAssign | SlashAssign | PercentAssign
            | ConcatAssign | MoveAssign
    )
}

/// Tokens that can start a value (used to detect application juxtaposition:
/// `f x` is a call whenever a value-starting token follows another value
/// with nothing that reads as an infix operator between them).
pub fn starts_value(kind: LexemeKind) -> bool {
    use LexemeKind::*;
    // `LBracket` is deliberately excluded: a `[` immediately following an
    // already-parsed value is always postfix indexing, never an array
    // literal passed as an application argument (the two would otherwise
    // be lexically indistinguishable: `a[0]` and `a [0]` scan identically).
    matches!(
        kind,
        Int | Float | Str | Ident | True | False | Null | LParen | LBrace | Not | Move | Minus
            | Func | If | While | For
    )
}
