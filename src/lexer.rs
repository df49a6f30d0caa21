//! Lexer for the ticket query language.
//!
//! The lexer never fails: characters it does not recognize, and string
//! literals that are never closed, become [`TokenKind::Unknown`] tokens so a
//! highlighter can always render partial input.

use crate::fields::REGISTRY;
use crate::token::{Span, Token, TokenKind};

/// Tokenizes `source`, appending a synthetic EOF token at `source.len()`.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = Lexer::new(source).collect();
    tokens.push(Token::new(
        TokenKind::Eof,
        "",
        Span::new(source.len(), source.len()),
    ));
    tracing::trace!(tokens = tokens.len(), "tokenized query");
    tokens
}

pub struct Lexer<'a> {
    input: &'a str,
    /// Current byte offset into the input.
    position: usize,
    /// Whether the next identifier sits where a field name is expected.
    field_expected: bool,
    /// Whether the previous token was `IN`, which makes the next `(` open a
    /// value list rather than a group.
    after_in: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            position: 0,
            field_expected: true,
            after_in: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn eat_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if predicate(c) {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn at_word_boundary(&self) -> bool {
        !self.peek().is_some_and(is_word_char)
    }

    /// Reads the rest of a double-quoted string. The opening quote has
    /// already been consumed. An unterminated string runs to the end of the
    /// input and is reported as `Unknown`.
    fn read_string(&mut self) -> TokenKind {
        while let Some(c) = self.bump() {
            if c == '"' {
                return TokenKind::String;
            }
        }
        TokenKind::Unknown
    }

    /// Matches `YYYY-MM-DD` followed by a word boundary at `start`.
    fn iso_date_end(&self, start: usize) -> Option<usize> {
        let bytes = self.input.as_bytes().get(start..start + 10)?;
        let shape_ok = bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
        if !shape_ok {
            return None;
        }
        let end = start + 10;
        let bounded = !self.input[end..].chars().next().is_some_and(is_word_char);
        bounded.then_some(end)
    }

    /// Reads a token that starts with a digit: an ISO date, a number, or a
    /// digit-led bare word such as `1st`.
    fn read_numeric(&mut self, start: usize) -> TokenKind {
        if let Some(end) = self.iso_date_end(start) {
            self.position = end;
            return TokenKind::Date;
        }
        self.read_number_tail()
    }

    fn read_number_tail(&mut self) -> TokenKind {
        self.eat_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit());
        }
        if self.at_word_boundary() {
            TokenKind::Number
        } else {
            self.eat_while(is_word_char);
            TokenKind::Value
        }
    }

    /// Reads a token that starts with `-`: a relative date such as `-7d`, a
    /// negative number, or a stray dash.
    fn read_dash(&mut self) -> TokenKind {
        if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
            return TokenKind::Unknown;
        }
        self.eat_while(|c| c.is_ascii_digit());
        if let Some(unit) = self.peek() {
            if matches!(unit.to_ascii_lowercase(), 'd' | 'w' | 'm' | 'y')
                && !self.peek_next().is_some_and(is_word_char)
            {
                self.bump();
                return TokenKind::RelativeDate;
            }
        }
        self.read_number_tail()
    }

    fn read_word(&mut self, start: usize) -> TokenKind {
        self.eat_while(is_word_char);
        let literal = &self.input[start..self.position];
        match literal.to_ascii_lowercase().as_str() {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            "empty" | "null" => TokenKind::Empty,
            _ if self.field_expected && REGISTRY.resolve(literal).is_some() => TokenKind::Field,
            _ => TokenKind::Value,
        }
    }

    fn track(&mut self, kind: TokenKind) {
        self.field_expected = match kind {
            TokenKind::And | TokenKind::Or | TokenKind::Not => true,
            TokenKind::LParen => !self.after_in,
            _ => false,
        };
        self.after_in = kind == TokenKind::In;
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@' | '/')
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let c = self.bump()?;

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '=' => TokenKind::Operator,
            '<' | '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                }
                TokenKind::Operator
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Operator
                } else {
                    TokenKind::Unknown
                }
            }
            '"' => self.read_string(),
            '-' => self.read_dash(),
            c if c.is_ascii_digit() => self.read_numeric(start),
            c if is_word_start(c) => self.read_word(start),
            _ => TokenKind::Unknown,
        };
        self.track(kind);
        Some(Token::new(
            kind,
            &self.input[start..self.position],
            Span::new(start, self.position),
        ))
    }
}
