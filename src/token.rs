//! Token definitions for the ticket query language.

use serde::Serialize;
use std::fmt;

/// A single lexeme with its kind and location in the source.
///
/// Tokens own their text, so they stay valid after the source string is
/// dropped. The source between two tokens is always whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }

    /// Human-readable description used in error messages.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", self.text),
        }
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    /// An identifier naming a registered field, in a position where a field
    /// is expected.
    Field,
    /// `=`, `!=`, `>`, `<`, `>=`, `<=`
    Operator,

    // Keywords
    And,
    Or,
    Not,
    In,
    Is,
    /// `EMPTY`, or its synonym `NULL`
    Empty,

    // Literals
    /// Double-quoted string, quotes included in the text.
    String,
    Number,
    /// ISO `YYYY-MM-DD`
    Date,
    /// `-7d`, `-2w`, `-3m`, `-1y`
    RelativeDate,
    /// Bare word that is not a keyword or a field in field position.
    Value,

    // Punctuation
    LParen,
    RParen,
    Comma,

    // Special
    /// Unrecognized character or unterminated string.
    Unknown,
    Eof,
}

impl TokenKind {
    /// True for tokens that can stand as the right-hand side of a predicate.
    pub fn is_value(self) -> bool {
        matches!(
            self,
            TokenKind::String
                | TokenKind::Number
                | TokenKind::Date
                | TokenKind::RelativeDate
                | TokenKind::Value
                | TokenKind::Field
        )
    }

    /// Colour class for syntax highlighting.
    pub fn class(self) -> TokenClass {
        match self {
            TokenKind::Field => TokenClass::Field,
            TokenKind::Operator | TokenKind::In | TokenKind::Is => TokenClass::Operator,
            TokenKind::And | TokenKind::Or | TokenKind::Not => TokenClass::Keyword,
            TokenKind::Empty
            | TokenKind::String
            | TokenKind::Number
            | TokenKind::Date
            | TokenKind::RelativeDate
            | TokenKind::Value => TokenClass::Literal,
            TokenKind::LParen | TokenKind::RParen | TokenKind::Comma => TokenClass::Punctuation,
            TokenKind::Unknown => TokenClass::Error,
            TokenKind::Eof => TokenClass::Plain,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Field => "FIELD",
            TokenKind::Operator => "OPERATOR",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::In => "IN",
            TokenKind::Is => "IS",
            TokenKind::Empty => "EMPTY",
            TokenKind::String => "STRING",
            TokenKind::Number => "NUMBER",
            TokenKind::Date => "DATE",
            TokenKind::RelativeDate => "RELATIVE_DATE",
            TokenKind::Value => "VALUE",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::Comma => "COMMA",
            TokenKind::Unknown => "UNKNOWN",
            TokenKind::Eof => "EOF",
        };
        f.pad(name)
    }
}

/// Highlighting category of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Field,
    Operator,
    Keyword,
    Literal,
    Punctuation,
    Error,
    Plain,
}

/// Represents a half-open byte range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
