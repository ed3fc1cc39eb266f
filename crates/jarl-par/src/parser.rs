//! Pratt (top-down operator precedence) parsing of a [`Lexeme`] stream into
//! one [`Expr`] tree per script.
//!
//! The parser never consults a separate precedence table beyond the one
//! `jarl-lex` already exposes (`jarl_lex::binding_power`): the `nud`/`led`
//! split and the binding-power comparison in [`Parser::parse_expr`] are the
//! entire algorithm. Application juxtaposition (`f x`) is the one
//! continuation that isn't keyed off a token's own binding power — it
//! fires whenever the lookahead is a bp-0, value-starting token, which is
//! exactly the set of tokens that can never themselves be mistaken for an
//! infix operator.

use tracing::debug;

use jarl_lex::{binding_power, is_right_assoc, starts_value, Lexeme, LexemeKind, Payload};
use jarl_util::{Handler, Position, Symbol};

use crate::ast::{AssignOp, BinaryOp, Expr, ForStepper, FunctionLit, LogicalOp, UnaryOp};

/// Binding power of application juxtaposition (`f x`). Between `Concat`
/// (70) and indexing (90): `f a ++ b` is `f a` concatenated with `b`, and
/// `f a[0]` indexes `a` before applying it to `f`.
const BP_APPLY: u8 = 80;

#[tracing::instrument(level = "debug", skip(tokens, handler))]
pub fn parse(tokens: Vec<Lexeme>, handler: &Handler) -> Vec<Expr> {
    let program = Parser::new(tokens, handler).parse_program();
    debug!(top_level_exprs = program.len(), "parsed program");
    program
}

pub struct Parser<'a> {
    tokens: Vec<Lexeme>,
    pos: usize,
    handler: &'a Handler,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Lexeme>, handler: &'a Handler) -> Self {
        // The lexer always emits a leading `Sof`; skip it here so every
        // other method can assume `self.pos` addresses a real token.
        let pos = if matches!(tokens.first(), Some(t) if t.kind == LexemeKind::Sof) {
            1
        } else {
            0
        };
        Self {
            tokens,
            pos,
            handler,
        }
    }

    pub fn parse_program(mut self) -> Vec<Expr> {
        self.parse_stmts_until(LexemeKind::Eof)
    }

    // ---- token stream primitives ----------------------------------------

    fn peek(&self) -> &Lexeme {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> LexemeKind {
        self.peek().kind
    }

    fn line(&self) -> u32 {
        self.peek().pos.line
    }

    fn advance(&mut self) -> Lexeme {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: LexemeKind) -> bool {
        self.peek_kind() == kind
    }

    fn at_eof(&self) -> bool {
        self.check(LexemeKind::Eof)
    }

    fn is_stmt_terminator(kind: LexemeKind) -> bool {
        matches!(
            kind,
            LexemeKind::Newline
                | LexemeKind::Semi
                | LexemeKind::RBrace
                | LexemeKind::Eof
                | LexemeKind::Else
        )
    }

    /// Consume zero-or-more separator tokens (newline/`;`); returns whether
    /// any were consumed.
    fn skip_separators(&mut self) -> bool {
        let mut any = false;
        while matches!(self.peek_kind(), LexemeKind::Newline | LexemeKind::Semi) {
            self.advance();
            any = true;
        }
        any
    }

    fn expect(&mut self, kind: LexemeKind, what: &str) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            self.handler
                .error(self.line(), format!("expected {what}"));
            false
        }
    }

    /// Resync to the next statement boundary after a fatal shape mismatch.
    fn resync(&mut self) {
        while !Self::is_stmt_terminator(self.peek_kind()) {
            self.advance();
        }
    }

    // ---- statement lists --------------------------------------------------

    fn parse_stmts_until(&mut self, stop: LexemeKind) -> Vec<Expr> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while !self.check(stop) && !self.at_eof() {
            let stmt = self.parse_expr(0);
            stmts.push(stmt);
            let sep = self.skip_separators();
            if !sep && !self.check(stop) && !self.at_eof() {
                self.handler
                    .error(self.line(), "expected statement separator");
                self.resync();
                self.skip_separators();
            }
        }
        stmts
    }

    /// A single statement: for most forms this is just an expression parsed
    /// at the lowest binding power; blocks, `if`, `while`, `for` etc. are
    /// all themselves `Expr` variants produced by `nud`.
    fn parse_statement(&mut self) -> Expr {
        self.parse_expr(0)
    }

    // ---- Pratt core ---------------------------------------------------------

    pub fn parse_expr(&mut self, rbp: u8) -> Expr {
        let mut left = self.parse_nud();
        loop {
            let kind = self.peek_kind();
            if binding_power(kind) == 0 && starts_value(kind) && BP_APPLY > rbp {
                let arg = self.parse_expr(BP_APPLY);
                left = Expr::Call(Box::new(left), Box::new(arg));
                continue;
            }
            let bp = binding_power(kind);
            if bp == 0 || bp <= rbp {
                break;
            }
            left = self.parse_led(left, kind, bp);
        }
        left
    }

    fn parse_nud(&mut self) -> Expr {
        let tok = self.advance();
        match tok.kind {
            LexemeKind::Int => {
                let Some(Payload::Int(v)) = tok.payload else {
                    unreachable!("Int lexeme without Int payload")
                };
                Expr::IntLit(v)
            }
            LexemeKind::Float => {
                let Some(Payload::Float(v)) = tok.payload else {
                    unreachable!("Float lexeme without Float payload")
                };
                Expr::FloatLit(v)
            }
            LexemeKind::Str => {
                let Some(Payload::Str(s)) = tok.payload else {
                    unreachable!("Str lexeme without Str payload")
                };
                Expr::StrLit(s)
            }
            LexemeKind::Ident => {
                let Some(Payload::Ident(s)) = tok.payload else {
                    unreachable!("Ident lexeme without Ident payload")
                };
                Expr::Ident(s)
            }
            LexemeKind::True => Expr::BoolLit(true),
            LexemeKind::False => Expr::BoolLit(false),
            LexemeKind::Null => Expr::NullLit,

            LexemeKind::Minus => Expr::Unary(UnaryOp::Neg, Box::new(self.parse_expr(75))),
            LexemeKind::Not => Expr::Unary(UnaryOp::Not, Box::new(self.parse_expr(75))),
            LexemeKind::Move => Expr::Unary(UnaryOp::Move, Box::new(self.parse_expr(75))),

            LexemeKind::LParen => {
                let inner = self.parse_expr(0);
                self.expect(LexemeKind::RParen, "')'");
                inner
            }
            LexemeKind::LBracket => self.parse_array_or_range(tok.pos),
            LexemeKind::LBrace => self.parse_brace(tok.pos),

            LexemeKind::If => self.parse_if(),
            LexemeKind::While => self.parse_while(),
            LexemeKind::For => self.parse_for(),
            LexemeKind::Func => self.parse_func(),
            LexemeKind::Var => self.parse_var(),
            LexemeKind::Print => self.parse_print(),
            LexemeKind::Assert => self.parse_assert(),
            LexemeKind::Return => self.parse_return(),

            LexemeKind::Newline | LexemeKind::Semi => Expr::Nop,

            other => {
                self.handler.error(
                    tok.pos.line,
                    format!("expected expression, found {other:?}"),
                );
                Expr::Error
            }
        }
    }

    fn parse_led(&mut self, left: Expr, kind: LexemeKind, bp: u8) -> Expr {
        use LexemeKind::*;
        match kind {
            Assign | PlusAssign | MinusAssign | StarAssign | SlashAssign | PercentAssign
            | ConcatAssign | MoveAssign => {
                self.advance();
                let op = match kind {
                    Assign => AssignOp::Set,
                    PlusAssign => AssignOp::Add,
                    MinusAssign => AssignOp::Sub,
                    StarAssign => AssignOp::Mul,
                    SlashAssign => AssignOp::Div,
                    PercentAssign => AssignOp::Mod,
                    ConcatAssign => AssignOp::Concat,
                    MoveAssign => AssignOp::Move,
                    _ => unreachable!(),
                };
                let right_rbp = if is_right_assoc(kind) { bp - 1 } else { bp };
                let right = self.parse_expr(right_rbp);
                Expr::Assign(op, Box::new(left), Box::new(right))
            }
            Or => {
                self.advance();
                Expr::Logical(LogicalOp::Or, Box::new(left), Box::new(self.parse_expr(bp)))
            }
            And => {
                self.advance();
                Expr::Logical(LogicalOp::And, Box::new(left), Box::new(self.parse_expr(bp)))
            }
            EqEq | NotEq | Cmp | Gt | Lt | Geq | Leq | In | Plus | Minus | Star | Slash
            | Percent | Concat => {
                self.advance();
                let op = match kind {
                    EqEq => BinaryOp::Eq,
                    NotEq => BinaryOp::Ne,
                    Cmp => BinaryOp::Cmp,
                    Gt => BinaryOp::Gt,
                    Lt => BinaryOp::Lt,
                    Geq => BinaryOp::Geq,
                    Leq => BinaryOp::Leq,
                    In => BinaryOp::In,
                    Plus => BinaryOp::Add,
                    Minus => BinaryOp::Sub,
                    Star => BinaryOp::Mul,
                    Slash => BinaryOp::Div,
                    Percent => BinaryOp::Mod,
                    Concat => BinaryOp::Concat,
                    _ => unreachable!(),
                };
                let right = self.parse_expr(bp);
                Expr::Binary(op, Box::new(left), Box::new(right))
            }
            LBracket => {
                self.advance();
                let first = self.parse_expr(0);
                if self.check(Colon) {
                    self.advance();
                    let second = self.parse_expr(0);
                    self.expect(RBracket, "']'");
                    Expr::Slice(Box::new(left), Box::new(first), Box::new(second))
                } else {
                    self.expect(RBracket, "']'");
                    Expr::Index(Box::new(left), Box::new(first))
                }
            }
            _ => unreachable!("binding_power({kind:?}) > 0 but no led arm handles it"),
        }
    }

    // ---- special forms -----------------------------------------------------

    fn parse_if(&mut self) -> Expr {
        let cond = self.parse_expr(0);
        self.expect(LexemeKind::Colon, "':' after if condition");
        let then_branch = Box::new(self.parse_statement());
        let else_branch = if self.check(LexemeKind::Else) {
            self.advance();
            Some(Box::new(self.parse_statement()))
        } else {
            None
        };
        Expr::If {
            cond: Box::new(cond),
            then_branch,
            else_branch,
        }
    }

    fn parse_while(&mut self) -> Expr {
        let cond = self.parse_expr(0);
        self.expect(LexemeKind::Colon, "':' after while condition");
        let body = Box::new(self.parse_statement());
        Expr::While {
            cond: Box::new(cond),
            body,
        }
    }

    fn parse_for(&mut self) -> Expr {
        let stepper = if self.check(LexemeKind::LParen) {
            self.advance();
            let key = self.expect_ident("identifier");
            self.expect(LexemeKind::Comma, "',' in for-loop key/value stepper");
            let value = self.expect_ident("identifier");
            self.expect(LexemeKind::RParen, "')' after for-loop stepper");
            ForStepper::KeyValue(key, value)
        } else {
            ForStepper::Value(self.expect_ident("identifier"))
        };
        self.expect(LexemeKind::In, "'in' in for loop");
        let iter = self.parse_expr(0);
        self.expect(LexemeKind::Colon, "':' after for-loop iterable");
        let body = Box::new(self.parse_statement());
        Expr::For {
            stepper,
            iter: Box::new(iter),
            body,
        }
    }

    fn parse_func(&mut self) -> Expr {
        self.expect(LexemeKind::LParen, "'(' after func");
        let mut params = Vec::new();
        if !self.check(LexemeKind::RParen) {
            loop {
                params.push(self.expect_ident("parameter name"));
                if self.check(LexemeKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(LexemeKind::RParen, "')' after func parameters");
        let body = Box::new(self.parse_statement());
        Expr::Function(FunctionLit { params, body })
    }

    fn parse_var(&mut self) -> Expr {
        let name = self.expect_ident("identifier after var");
        self.expect(LexemeKind::Assign, "'=' in var declaration");
        let init = self.parse_expr(0);
        Expr::Var {
            name,
            init: Box::new(init),
        }
    }

    fn parse_print(&mut self) -> Expr {
        let mut args = vec![self.parse_expr(0)];
        while self.check(LexemeKind::Comma) {
            self.advance();
            args.push(self.parse_expr(0));
        }
        Expr::Print(args)
    }

    fn parse_assert(&mut self) -> Expr {
        let cond = self.parse_expr(0);
        self.expect(LexemeKind::Comma, "',' between assert condition and message");
        let msg = self.parse_expr(0);
        Expr::Assert(Box::new(cond), Box::new(msg))
    }

    fn parse_return(&mut self) -> Expr {
        if Self::is_stmt_terminator(self.peek_kind()) {
            Expr::Return(None)
        } else {
            Expr::Return(Some(Box::new(self.parse_expr(0))))
        }
    }

    /// `{` has just been consumed. Disambiguates table literal from code
    /// block: an empty body, or a body whose first element is a key-value
    /// pair (`expr : expr`), is a table; anything else is a block of
    /// statements (the first parsed expression becomes its first
    /// statement).
    fn parse_brace(&mut self, _open: Position) -> Expr {
        self.skip_separators();
        if self.check(LexemeKind::RBrace) {
            self.advance();
            return Expr::Table(Vec::new());
        }
        let first_key = self.parse_expr(0);
        if self.check(LexemeKind::Colon) {
            self.advance();
            let first_value = self.parse_expr(0);
            let mut pairs = vec![(first_key, first_value)];
            while self.check(LexemeKind::Comma) {
                self.advance();
                let k = self.parse_expr(0);
                self.expect(LexemeKind::Colon, "':' in table literal");
                let v = self.parse_expr(0);
                pairs.push((k, v));
            }
            self.skip_separators();
            self.expect(LexemeKind::RBrace, "'}' after table literal");
            Expr::Table(pairs)
        } else {
            let mut stmts = vec![first_key];
            let sep = self.skip_separators();
            if !sep && !self.check(LexemeKind::RBrace) && !self.at_eof() {
                self.handler
                    .error(self.line(), "expected statement separator");
                self.resync();
                self.skip_separators();
            }
            stmts.extend(self.parse_stmts_until(LexemeKind::RBrace));
            self.expect(LexemeKind::RBrace, "'}' after block");
            Expr::Block(stmts)
        }
    }

    /// `[` has just been consumed: either an array literal (`[a, b, c]`) or
    /// a range (`[a..b]`).
    fn parse_array_or_range(&mut self, _open: Position) -> Expr {
        if self.check(LexemeKind::RBracket) {
            self.advance();
            return Expr::Array(Vec::new());
        }
        let first = self.parse_expr(0);
        if self.check(LexemeKind::DotDot) {
            self.advance();
            let last = self.parse_expr(0);
            self.expect(LexemeKind::RBracket, "']' after range");
            return Expr::Range(Box::new(first), Box::new(last));
        }
        let mut elems = vec![first];
        while self.check(LexemeKind::Comma) {
            self.advance();
            if self.check(LexemeKind::RBracket) {
                break;
            }
            elems.push(self.parse_expr(0));
        }
        self.expect(LexemeKind::RBracket, "']' after array literal");
        Expr::Array(elems)
    }

    fn expect_ident(&mut self, what: &str) -> Symbol {
        if self.check(LexemeKind::Ident) {
            let tok = self.advance();
            let Some(Payload::Ident(s)) = tok.payload else {
                unreachable!("Ident lexeme without Ident payload")
            };
            s
        } else {
            self.handler
                .error(self.line(), format!("expected {what}"));
            Symbol::intern("")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarl_lex::lex;

    fn parse_one(src: &str) -> Expr {
        let handler = Handler::new();
        let tokens = lex(src, &handler);
        let mut prog = parse(tokens, &handler);
        assert_eq!(prog.len(), 1, "expected exactly one top-level statement");
        prog.remove(0)
    }

    #[test]
    fn precedence_mul_over_add() {
        let expr = parse_one("1 + 2 * 3");
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::IntLit(1)),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::IntLit(2)),
                    Box::new(Expr::IntLit(3)),
                )),
            )
        );
    }

    #[test]
    fn left_associative_subtraction() {
        let expr = parse_one("1 - 2 - 3");
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Sub,
                Box::new(Expr::Binary(
                    BinaryOp::Sub,
                    Box::new(Expr::IntLit(1)),
                    Box::new(Expr::IntLit(2)),
                )),
                Box::new(Expr::IntLit(3)),
            )
        );
    }

    #[test]
    fn right_associative_assignment() {
        let handler = Handler::new();
        let tokens = lex("a = b = 1", &handler);
        let mut prog = parse(tokens, &handler);
        let Expr::Assign(AssignOp::Set, _, rhs) = prog.remove(0) else {
            panic!("expected top-level assignment");
        };
        assert!(matches!(*rhs, Expr::Assign(AssignOp::Set, ..)));
    }

    #[test]
    fn curried_application_is_left_associative() {
        let expr = parse_one("f x y");
        assert_eq!(
            expr,
            Expr::Call(
                Box::new(Expr::Call(
                    Box::new(Expr::Ident(Symbol::intern("f"))),
                    Box::new(Expr::Ident(Symbol::intern("x"))),
                )),
                Box::new(Expr::Ident(Symbol::intern("y"))),
            )
        );
    }

    #[test]
    fn application_binds_tighter_than_addition_via_minus_as_infix() {
        // `f - 1` must be subtraction, never `f(-1)`: Minus already has a
        // nonzero binding power so it is never treated as an application
        // trigger.
        let expr = parse_one("f - 1");
        assert!(matches!(expr, Expr::Binary(BinaryOp::Sub, ..)));
    }

    #[test]
    fn indexing_binds_tighter_than_application() {
        let expr = parse_one("f a[0]");
        let Expr::Call(_, arg) = expr else {
            panic!("expected call");
        };
        assert!(matches!(*arg, Expr::Index(..)));
    }

    #[test]
    fn if_else_expression() {
        let expr = parse_one("if true : 1 else 2");
        assert!(matches!(
            expr,
            Expr::If {
                else_branch: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn empty_braces_are_a_table() {
        let expr = parse_one("{}");
        assert_eq!(expr, Expr::Table(Vec::new()));
    }

    #[test]
    fn braces_with_statement_are_a_block() {
        let expr = parse_one("{ print 1 }");
        assert!(matches!(expr, Expr::Block(stmts) if stmts.len() == 1));
    }

    #[test]
    fn table_literal_with_pairs() {
        let expr = parse_one(r#"{"a": 1, "b": 2}"#);
        assert!(matches!(expr, Expr::Table(pairs) if pairs.len() == 2));
    }

    #[test]
    fn array_slice_indexing() {
        let expr = parse_one("[1,2,3,4,5][1:4]");
        assert!(matches!(expr, Expr::Slice(..)));
    }

    #[test]
    fn for_key_value_stepper() {
        let expr = parse_one("for (k,v) in t: print k");
        assert!(matches!(
            expr,
            Expr::For {
                stepper: ForStepper::KeyValue(..),
                ..
            }
        ));
    }

    #[test]
    fn func_literal_with_params() {
        let expr = parse_one("func(x,y) x+y");
        let Expr::Function(f) = expr else {
            panic!("expected function literal");
        };
        assert_eq!(f.params.len(), 2);
    }

    /// Evaluates a flat `Expr` tree built only from `IntLit`/`Binary(Add |
    /// Sub | Mul, ..)` nodes — the shape [`arbitrary_arithmetic_chain`]
    /// below restricts itself to.
    fn eval_flat(expr: &Expr) -> i64 {
        match expr {
            Expr::IntLit(n) => *n,
            Expr::Binary(op, lhs, rhs) => {
                let (l, r) = (eval_flat(lhs), eval_flat(rhs));
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    other => panic!("unexpected op in arithmetic chain: {other:?}"),
                }
            }
            other => panic!("unexpected node in arithmetic chain: {other:?}"),
        }
    }

    /// Reference precedence-climbing evaluator over the same flat
    /// `term (op term)*` grammar, written independently of the parser
    /// under test so the two can be compared.
    fn eval_reference(terms: &[i64], ops: &[char]) -> i64 {
        // First pass: fold every `*` since it binds tighter than `+`/`-`.
        let mut folded = vec![terms[0]];
        let mut pending_ops = Vec::new();
        for (i, &op) in ops.iter().enumerate() {
            if op == '*' {
                let last = folded.pop().unwrap();
                folded.push(last * terms[i + 1]);
            } else {
                folded.push(terms[i + 1]);
                pending_ops.push(op);
            }
        }
        // Second pass: left-fold the remaining `+`/`-` in source order.
        let mut acc = folded[0];
        for (i, op) in pending_ops.iter().enumerate() {
            acc = if *op == '+' {
                acc + folded[i + 1]
            } else {
                acc - folded[i + 1]
            };
        }
        acc
    }

    proptest::proptest! {
        /// `jarl-par` never consults a separate precedence table per token
        /// (binding power lives on `LexemeKind` itself); this checks the
        /// `nud`/`led` recursion actually reconstructs the textbook
        /// precedence (`*` over `+`/`-`, left-associative within a tier)
        /// for arbitrarily long chains.
        #[test]
        fn precedence_matches_reference_evaluator(
            terms in proptest::collection::vec(0i64..50, 2..8),
            op_choices in proptest::collection::vec(0..3usize, 1..7),
        ) {
            let ops: Vec<char> = op_choices
                .iter()
                .take(terms.len() - 1)
                .map(|&i| ['+', '-', '*'][i])
                .collect();
            let mut source = terms[0].to_string();
            for (term, op) in terms[1..1 + ops.len()].iter().zip(&ops) {
                source.push_str(&format!(" {op} {term}"));
            }
            let used_terms = &terms[..1 + ops.len()];

            let expr = parse_one(&source);
            let parsed = eval_flat(&expr);
            let reference = eval_reference(used_terms, &ops);
            proptest::prop_assert_eq!(parsed, reference);
        }
    }
}
