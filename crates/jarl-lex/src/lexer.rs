//! Character-at-a-time scanning that turns source text into a `Vec<Lexeme>`.

use tracing::debug;

use jarl_util::{Handler, Position, Symbol};

use crate::token::{Lexeme, LexemeKind, Payload};

/// Convenience entry point: lex `source`, reporting any errors into
/// `handler`, and return the resulting token stream (always terminated by
/// `Eof`, even when errors occurred).
#[tracing::instrument(level = "debug", skip(source, handler))]
pub fn lex(source: &str, handler: &Handler) -> Vec<Lexeme> {
    let tokens = Lexer::new(source).tokenize(handler);
    debug!(count = tokens.len(), "lexed token stream");
    tokens
}

/// A cursor over the source's characters plus the running line counter
/// needed to stamp each lexeme with a [`Position`].
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
}

fn reserved_word(ident: &str) -> Option<LexemeKind> {
    use LexemeKind::*;
    Some(match ident {
        "if" => If,
        "else" => Else,
        "while" => While,
        "for" => For,
        "func" => Func,
        "var" => Var,
        "print" => Print,
        "assert" => Assert,
        "return" => Return,
        "and" => And,
        "or" => Or,
        "not" => Not,
        "in" => In,
        "move" => Move,
        "null" => Null,
        "true" => True,
        "false" => False,
        _ => return None,
    })
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    pub fn tokenize(mut self, handler: &Handler) -> Vec<Lexeme> {
        let mut out = vec![Lexeme::new(LexemeKind::Sof, Position::new(1, 0))];
        loop {
            self.skip_whitespace(&mut out);
            let start_line = self.line;
            let Some(c) = self.peek() else {
                out.push(Lexeme::new(LexemeKind::Eof, Position::new(start_line, 0)));
                break;
            };
            let tok = match c {
                '\n' => {
                    self.advance();
                    self.line += 1;
                    Lexeme::new(LexemeKind::Newline, Position::new(start_line, 0))
                }
                ';' => {
                    self.advance();
                    Lexeme::new(LexemeKind::Semi, Position::new(start_line, 0))
                }
                c if c.is_ascii_digit() => self.lex_number(start_line),
                '"' => self.lex_string(start_line, handler),
                c if c.is_alphabetic() || c == '_' => self.lex_identifier(start_line),
                _ => self.lex_operator(start_line, handler),
            };
            out.push(tok);
        }
        out
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self, _out: &mut [Lexeme]) {
        while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r')) {
            self.advance();
        }
    }

    fn lex_number(&mut self, line: u32) -> Lexeme {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            let value: f64 = text.parse().unwrap_or(0.0);
            Lexeme::with_payload(LexemeKind::Float, Position::new(line, 0), Payload::Float(value))
        } else {
            let value: i64 = text.parse().unwrap_or(0);
            Lexeme::with_payload(LexemeKind::Int, Position::new(line, 0), Payload::Int(value))
        }
    }

    fn lex_identifier(&mut self, line: u32) -> Lexeme {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if let Some(kind) = reserved_word(&text) {
            return Lexeme::new(kind, Position::new(line, 0));
        }
        let sym = Symbol::intern(&text);
        Lexeme::with_payload(LexemeKind::Ident, Position::new(line, 0), Payload::Ident(sym))
    }

    fn lex_string(&mut self, line: u32, handler: &Handler) -> Lexeme {
        self.advance(); // opening quote
        let mut content = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => {
                    handler.error(line, "unterminated string literal");
                    break;
                }
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => content.push('\n'),
                    Some('t') => content.push('\t'),
                    Some('\\') => content.push('\\'),
                    Some('"') => content.push('"'),
                    Some(other) => {
                        handler.error(line, format!("unknown escape sequence '\\{other}'"));
                        content.push(other);
                    }
                    None => {
                        handler.error(line, "unterminated string literal");
                        break;
                    }
                },
                Some(c) => content.push(c),
            }
        }
        let sym = Symbol::intern(&content);
        Lexeme::with_payload(LexemeKind::Str, Position::new(line, 0), Payload::Str(sym))
    }

    fn lex_operator(&mut self, line: u32, handler: &Handler) -> Lexeme {
        use LexemeKind::*;
        let c = self.advance().expect("checked by caller");
        let pos = Position::new(line, 0);
        macro_rules! if_next {
            ($next:expr, $then:expr, $else_:expr) => {{
                if self.peek() == Some($next) {
                    self.advance();
                    $then
                } else {
                    $else_
                }
            }};
        }
        let kind = match c {
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            '{' => LBrace,
            '}' => RBrace,
            ',' => Comma,
            ':' => Colon,
            '.' => {
                if self.peek() == Some('.') {
                    self.advance();
                    DotDot
                } else {
                    handler.error(line, "unexpected character '.'");
                    Eof
                }
            }
            '+' => {
                if self.peek() == Some('+') {
                    self.advance();
                    if_next!('=', ConcatAssign, Concat)
                } else {
                    if_next!('=', PlusAssign, Plus)
                }
            }
            '-' => {
                if self.peek() == Some('=') {
                    self.advance();
                    MinusAssign
                } else {
                    Minus
                }
            }
            '*' => if_next!('=', StarAssign, Star),
            '/' => if_next!('=', SlashAssign, Slash),
            '%' => if_next!('=', PercentAssign, Percent),
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    EqEq
                } else {
                    Assign
                }
            }
            '!' => if_next!('=', NotEq, {
                handler.error(line, "unexpected character '!'");
                Eof
            }),
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    if self.peek() == Some('>') {
                        self.advance();
                        Cmp
                    } else {
                        Leq
                    }
                } else if self.peek() == Some('-') {
                    self.advance();
                    MoveAssign
                } else {
                    Lt
                }
            }
            '>' => if_next!('=', Geq, Gt),
            other => {
                handler.error(line, format!("unrecognized character '{other}'"));
                while matches!(self.peek(), Some(c) if !c.is_whitespace()) {
                    self.advance();
                }
                Eof
            }
        };
        Lexeme::new(kind, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<LexemeKind> {
        let handler = Handler::new();
        lex(source, &handler).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn leading_and_trailing_sentinels() {
        let k = kinds("1");
        assert_eq!(k.first(), Some(&LexemeKind::Sof));
        assert_eq!(k.last(), Some(&LexemeKind::Eof));
    }

    #[test]
    fn arithmetic_expression() {
        use LexemeKind::*;
        assert_eq!(
            kinds("1 + 2 * 3"),
            vec![Sof, Int, Plus, Int, Star, Int, Eof]
        );
    }

    #[test]
    fn keywords_are_not_identifiers() {
        use LexemeKind::*;
        assert_eq!(kinds("if a else b"), vec![Sof, If, Ident, Else, Ident, Eof]);
    }

    #[test]
    fn string_escapes() {
        let handler = Handler::new();
        let tokens = lex(r#""a\nb""#, &handler);
        let Payload::Str(sym) = tokens[1].payload.clone().unwrap() else {
            panic!("expected string payload");
        };
        assert_eq!(sym.as_str(), "a\nb");
    }

    #[test]
    fn float_vs_int() {
        use LexemeKind::*;
        assert_eq!(kinds("1 1.5"), vec![Sof, Int, Float, Eof]);
    }

    #[test]
    fn compound_assignment_operators() {
        use LexemeKind::*;
        assert_eq!(
            kinds("a += 1; a <- b"),
            vec![Sof, Ident, PlusAssign, Int, Semi, Ident, MoveAssign, Ident, Eof]
        );
    }

    #[test]
    fn unterminated_string_reports_error() {
        let handler = Handler::new();
        let _ = lex("\"abc", &handler);
        assert!(handler.has_errors());
    }

}
