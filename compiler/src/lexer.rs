//! Turns a [`SourceStream`] into a flat sequence of
//! typed [`Token`]s. Failures never abort the lexer — a malformed run of
//! characters becomes a `TokenKind::Invalid` token for the parser to
//! diagnose, matching the "no exceptions" design.

use crate::diagnostics::Location;
use crate::source::SourceStream;

/// A built-in scalar type keyword (`u8`, `i32`, `f64`, `bool`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum TypeKeyword {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
}

impl TypeKeyword {
    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "u8" => Self::U8,
            "i8" => Self::I8,
            "u16" => Self::U16,
            "i16" => Self::I16,
            "u32" => Self::U32,
            "i32" => Self::I32,
            "u64" => Self::U64,
            "i64" => Self::I64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            "bool" => Self::Bool,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    Eof,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semi,
    Colon,
    Comma,
    Dot,
    Arrow,
    /// A maximal run of operator characters, e.g. `+`, `==`, `->>`.
    Op,
    IntLit,
    FloatLit,
    True,
    False,
    Let,
    Const,
    Func,
    Namespace,
    Return,
    If,
    Else,
    TypeKeyword(TypeKeyword),
    Invalid,
}

impl TokenKind {
    pub fn is_type_keyword(&self) -> bool {
        matches!(self, Self::TypeKeyword(_))
    }
}

/// `! # $ % & * + . / < = > ? @ \ ^ | - ~`
const OP_CHARS: &str = "!#$%&*+./<=>?@\\^|-~";

/// Checked ahead of the generic `op` rule so fixed punctuators always win.
const PUNCTUATORS: &[(&str, TokenKind)] = &[
    ("->", TokenKind::Arrow),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    (";", TokenKind::Semi),
    (":", TokenKind::Colon),
    (",", TokenKind::Comma),
    (".", TokenKind::Dot),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub image: String,
    pub location: Location,
    /// The source line the token was lexed from, snapshotted for
    /// diagnostics that need to render it without re-reading the stream.
    pub line_snapshot: String,
    /// Raw bit pattern for a numeric literal, filled in by
    /// [`Lexer::reparse_numeric`]. Zero for non-numeric tokens or on parse
    /// failure.
    pub numeric_value: u64,
    /// Whether at least one newline was skipped as trivia before this
    /// token. Newlines aren't tokens of their own (so "first non-EOF
    /// token" questions still land on the first real token) but the
    /// parser needs this to treat a newline as a statement separator.
    pub newline_before: bool,
}

impl Token {
    pub fn is_op(&self, lexeme: &str) -> bool {
        self.kind == TokenKind::Op && self.image == lexeme
    }

    pub fn is_keyword(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

pub struct Lexer {
    stream: SourceStream,
}

impl Lexer {
    pub fn new(stream: SourceStream) -> Self {
        Self { stream }
    }

    /// Skip whitespace and comments, returning whether at least one
    /// newline was consumed along the way (including newlines embedded in
    /// a block comment).
    fn skip_trivia(&mut self) -> bool {
        let start_line = self.stream.location().line;
        loop {
            self.stream.skip_whitespace();
            if self.stream.peek() == Some('/') && self.stream.peek_at(1) == Some('/') {
                self.stream.read_while(|c| c != '\n');
                continue;
            }
            if self.stream.peek() == Some('/') && self.stream.peek_at(1) == Some('*') {
                self.stream.get();
                self.stream.get();
                loop {
                    if self.stream.is_eof() {
                        break;
                    }
                    if self.stream.peek() == Some('*') && self.stream.peek_at(1) == Some('/') {
                        self.stream.get();
                        self.stream.get();
                        break;
                    }
                    self.stream.get();
                }
                continue;
            }
            break;
        }
        self.stream.location().line != start_line
    }

    pub fn next_token(&mut self) -> Token {
        let newline_before = self.skip_trivia();
        let location = self.stream.location();
        let line_snapshot = self.stream.current_line().unwrap_or_default().to_owned();

        if self.stream.is_eof() {
            return Token {
                kind: TokenKind::Eof,
                image: String::new(),
                location,
                line_snapshot,
                numeric_value: 0,
                newline_before,
            };
        }

        let c = self.stream.peek().unwrap();

        if c.is_ascii_digit() {
            return self.lex_number(location, line_snapshot, newline_before);
        }

        if c == '_' || c.is_alphabetic() {
            return self.lex_ident_or_keyword(location, line_snapshot, newline_before);
        }

        for (lexeme, kind) in PUNCTUATORS {
            if self.matches_literal(lexeme) {
                for _ in lexeme.chars() {
                    self.stream.get();
                }
                return Token {
                    kind: *kind,
                    image: (*lexeme).to_owned(),
                    location,
                    line_snapshot,
                    numeric_value: 0,
                    newline_before,
                };
            }
        }

        if OP_CHARS.contains(c) {
            let image = self.stream.read_while(|c| OP_CHARS.contains(c));
            return Token { kind: TokenKind::Op, image, location, line_snapshot, numeric_value: 0, newline_before };
        }

        // Unrecognized character: consume it so the lexer always makes
        // forward progress, and hand back an `Invalid` token.
        let image = self.stream.get().unwrap().to_string();
        Token { kind: TokenKind::Invalid, image, location, line_snapshot, numeric_value: 0, newline_before }
    }

    fn matches_literal(&self, lexeme: &str) -> bool {
        lexeme.chars().enumerate().all(|(i, c)| self.stream.peek_at(i) == Some(c))
    }

    fn lex_ident_or_keyword(&mut self, location: Location, line_snapshot: String, newline_before: bool) -> Token {
        let image = self.stream.read_while(|c| c == '_' || c.is_alphanumeric());
        let kind = match image.as_str() {
            "let" => TokenKind::Let,
            "const" => TokenKind::Const,
            "func" => TokenKind::Func,
            "namespace" => TokenKind::Namespace,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => match TypeKeyword::from_str(&image) {
                Some(tk) => TokenKind::TypeKeyword(tk),
                None => TokenKind::Ident,
            },
        };
        Token { kind, image, location, line_snapshot, numeric_value: 0, newline_before }
    }

    /// Digit sequence with an optional fractional dot, plus an optional
    /// trailing type-keyword suffix (`42u16`) that triggers typed
    /// reparsing. Untyped integers default to `int32`, untyped fractions
    /// to `float32`.
    fn lex_number(&mut self, location: Location, line_snapshot: String, newline_before: bool) -> Token {
        let mut image = self.stream.read_while(|c| c.is_ascii_digit());
        let mut is_float = false;
        if self.stream.peek() == Some('.') && self.stream.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            image.push(self.stream.get().unwrap());
            image.push_str(&self.stream.read_while(|c| c.is_ascii_digit()));
        }

        let suffix_start = image.len();
        if self.stream.peek().is_some_and(|c| c == '_' || c.is_alphabetic()) {
            let suffix = self.stream.read_while(|c| c == '_' || c.is_alphanumeric());
            image.push_str(&suffix);
        }
        let suffix = &image[suffix_start..];

        let kind = if is_float || matches!(suffix, "f32" | "f64") {
            TokenKind::FloatLit
        } else {
            TokenKind::IntLit
        };

        let numeric_value = reparse_numeric(&image[..suffix_start], suffix, kind);
        Token { kind, image, location, line_snapshot, numeric_value, newline_before }
    }
}

/// Typed reparsing of a numeric literal's digits given its (possibly
/// empty) type-keyword suffix, producing the raw 64-bit `numeric_value`
/// bit pattern. Parse failure leaves the value at zero; the caller is
/// responsible for diagnosing that later if it matters.
fn reparse_numeric(digits: &str, suffix: &str, kind: TokenKind) -> u64 {
    match kind {
        TokenKind::FloatLit => match suffix {
            "f64" => digits.parse::<f64>().map(f64::to_bits).unwrap_or(0),
            _ => digits.parse::<f32>().map(|v| v.to_bits() as u64).unwrap_or(0),
        },
        _ => match suffix {
            "u8" => digits.parse::<u8>().map(|v| v as u64).unwrap_or(0),
            "i8" => digits.parse::<i8>().map(|v| v as u64 & 0xff).unwrap_or(0),
            "u16" => digits.parse::<u16>().map(|v| v as u64).unwrap_or(0),
            "i16" => digits.parse::<i16>().map(|v| v as u64 & 0xffff).unwrap_or(0),
            "u32" | "" => digits.parse::<u32>().map(|v| v as u64).unwrap_or(0),
            "i32" => digits.parse::<i32>().map(|v| v as u64 & 0xffff_ffff).unwrap_or(0),
            "u64" => digits.parse::<u64>().unwrap_or(0),
            "i64" => digits.parse::<i64>().map(|v| v as u64).unwrap_or(0),
            _ => 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(SourceStream::new("t", src));
        let mut out = Vec::new();
        loop {
            let t = lexer.next_token();
            let is_eof = t.kind == TokenKind::Eof;
            out.push(t);
            if is_eof {
                break;
            }
        }
        out
    }

    #[test]
    fn arrow_wins_over_generic_op_run() {
        let toks = tokens("->");
        assert_eq!(toks[0].kind, TokenKind::Arrow);
    }

    #[test]
    fn line_comment_is_skipped() {
        let toks = tokens("//foo\n42");
        assert_eq!(toks[0].kind, TokenKind::IntLit);
        assert_eq!(toks[0].image, "42");
    }

    #[test]
    fn block_comment_is_skipped() {
        let toks = tokens("/*a*/42");
        assert_eq!(toks[0].kind, TokenKind::IntLit);
        assert_eq!(toks[0].image, "42");
    }

    #[test]
    fn typed_suffix_triggers_reparse_with_expected_bit_pattern() {
        let toks = tokens("42u16");
        assert_eq!(toks[0].kind, TokenKind::IntLit);
        assert_eq!(toks[0].numeric_value, 42);
    }

    #[test]
    fn untyped_float_defaults_to_f32_bit_pattern() {
        let toks = tokens("1.5");
        assert_eq!(toks[0].kind, TokenKind::FloatLit);
        assert_eq!(toks[0].numeric_value, (1.5f32).to_bits() as u64);
    }

    #[test]
    fn newline_before_is_set_only_across_a_line_break() {
        let toks = tokens("a b\nc");
        assert!(!toks[0].newline_before);
        assert!(!toks[1].newline_before);
        assert!(toks[2].newline_before);
    }

    #[test]
    fn op_run_is_maximal() {
        let toks = tokens("<=>");
        assert_eq!(toks[0].kind, TokenKind::Op);
        assert_eq!(toks[0].image, "<=>");
    }

    #[test]
    fn keywords_are_classified_not_left_as_identifiers() {
        let toks = tokens("let func return");
        assert_eq!(toks[0].kind, TokenKind::Let);
        assert_eq!(toks[1].kind, TokenKind::Func);
        assert_eq!(toks[2].kind, TokenKind::Return);
    }

    #[test]
    fn type_keyword_is_distinguished_from_plain_identifier() {
        let toks = tokens("i32 foo");
        assert_eq!(toks[0].kind, TokenKind::TypeKeyword(TypeKeyword::I32));
        assert_eq!(toks[1].kind, TokenKind::Ident);
    }

    #[test]
    fn image_round_trips_for_every_category() {
        for (src, kind) in [
            ("foo", TokenKind::Ident),
            ("{", TokenKind::LBrace),
            ("}", TokenKind::RBrace),
            ("(", TokenKind::LParen),
            (")", TokenKind::RParen),
            (";", TokenKind::Semi),
            (":", TokenKind::Colon),
            (",", TokenKind::Comma),
            (".", TokenKind::Dot),
            ("->", TokenKind::Arrow),
            ("+", TokenKind::Op),
            ("true", TokenKind::True),
            ("false", TokenKind::False),
        ] {
            let toks = tokens(src);
            assert_eq!(toks[0].kind, kind, "lexing {src:?}");
            assert_eq!(toks[0].image, src);
        }
    }
}
