//! Recursive-descent parser for the ticket query language.
//!
//! ## Grammar (lowest to highest precedence)
//!
//! ```text
//! Query      := OrExpr EOF
//! OrExpr     := AndExpr (OR AndExpr)*
//! AndExpr    := UnaryExpr (AND UnaryExpr)*
//! UnaryExpr  := NOT UnaryExpr | Primary
//! Primary    := '(' OrExpr ')' | Comparison
//! Comparison := FIELD ( Operator Value
//!                     | ('IN' | 'NOT' 'IN') '(' Value (',' Value)* ')'
//!                     | 'IS' 'NOT'? 'EMPTY' )
//! ```
//!
//! AND binds tighter than OR and both are left-associative. Two predicates
//! side by side without a connective are an error; the parser never guesses.
//! Empty or whitespace-only input parses to [`QueryNode::MatchAll`].
//!
//! The parser does not check that an operator suits the field's value kind.
//! `type > bug` parses; the evaluator treats it as no-match and
//! [`QueryNode::operator_mismatches`] reports it.

use crate::ast::{CompOp, Literal, QueryNode, RelativeDate};
use crate::fields::{resolve_field, FieldDescriptor};
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};
use chrono::NaiveDate;
use thiserror::Error;

/// A syntax error, with the byte offset of the offending token when known.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QueryParseError {
    pub message: String,
    pub position: Option<usize>,
}

impl QueryParseError {
    fn new(message: String, position: Option<usize>) -> Self {
        Self { message, position }
    }

    fn at(message: String, token: &Token) -> Self {
        Self::new(message, Some(token.start()))
    }
}

/// Tokenizes and parses `source`.
pub fn parse(source: &str) -> Result<QueryNode, QueryParseError> {
    let tokens = tokenize(source);
    let result = Parser::new(&tokens).parse();
    if let Err(err) = &result {
        tracing::debug!(message = %err.message, position = ?err.position, "rejected query");
    }
    result
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
}

impl<'a> Parser<'a> {
    /// `tokens` is expected to end with an EOF token, as produced by
    /// [`tokenize`].
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Returns the current token without advancing.
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.position)
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().map_or(TokenKind::Eof, |token| token.kind)
    }

    /// Returns the current token and advances past it.
    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    fn match_token(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// Builds an error about the current token. `describe` receives the
    /// token's description ("end of input" or the quoted lexeme).
    fn error_here(&self, describe: impl FnOnce(&str) -> String) -> QueryParseError {
        match self.peek() {
            Some(token) => QueryParseError::at(describe(&token.describe()), token),
            None => QueryParseError::new(describe("end of input"), None),
        }
    }

    pub fn parse(&mut self) -> Result<QueryNode, QueryParseError> {
        if self.match_token(TokenKind::Eof) {
            return Ok(QueryNode::MatchAll);
        }

        let node = self.parse_or_expression()?;

        match self.peek_kind() {
            TokenKind::Eof => Ok(node),
            TokenKind::RParen => Err(self.error_here(|found| format!("Unexpected {found}"))),
            _ => Err(self.error_here(|found| format!("Expected AND or OR before {found}"))),
        }
    }

    /// `and_expr (OR and_expr)*`
    fn parse_or_expression(&mut self) -> Result<QueryNode, QueryParseError> {
        let mut left = self.parse_and_expression()?;

        while self.match_token(TokenKind::Or) {
            self.advance();
            let right = self.parse_and_expression()?;
            left = QueryNode::or(left, right);
        }

        Ok(left)
    }

    /// `unary_expr (AND unary_expr)*`
    fn parse_and_expression(&mut self) -> Result<QueryNode, QueryParseError> {
        let mut left = self.parse_unary_expression()?;

        while self.match_token(TokenKind::And) {
            self.advance();
            let right = self.parse_unary_expression()?;
            left = QueryNode::and(left, right);
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> Result<QueryNode, QueryParseError> {
        if self.match_token(TokenKind::Not) {
            self.advance();
            let inner = self.parse_unary_expression()?;
            Ok(QueryNode::negate(inner))
        } else {
            self.parse_primary_expression()
        }
    }

    fn parse_primary_expression(&mut self) -> Result<QueryNode, QueryParseError> {
        let Some(token) = self.peek() else {
            return Err(self.error_here(|found| format!("Expected a field name, found {found}")));
        };

        match token.kind {
            TokenKind::LParen => {
                self.advance();
                if self.match_token(TokenKind::RParen) {
                    return Err(QueryParseError::at("Empty parentheses".to_string(), token));
                }
                let inner = self.parse_or_expression()?;
                if !self.match_token(TokenKind::RParen) {
                    return Err(self.error_here(|found| {
                        format!("Missing closing parenthesis, found {found}")
                    }));
                }
                self.advance();
                Ok(inner)
            }
            TokenKind::Field => {
                self.advance();
                let field = resolve_field(&token.text).ok_or_else(|| {
                    QueryParseError::at(format!("Unknown field '{}'", token.text), token)
                })?;
                self.parse_comparison(field, token)
            }
            TokenKind::Value => Err(QueryParseError::at(
                format!("Unknown field '{}'", token.text),
                token,
            )),
            TokenKind::Unknown if token.text.starts_with('"') => Err(QueryParseError::at(
                "Unterminated string literal".to_string(),
                token,
            )),
            TokenKind::Unknown => Err(QueryParseError::at(
                format!("Unexpected character {}", token.describe()),
                token,
            )),
            _ => Err(QueryParseError::at(
                format!("Expected a field name, found {}", token.describe()),
                token,
            )),
        }
    }

    /// Parses what follows a field name.
    fn parse_comparison(
        &mut self,
        field: &'static FieldDescriptor,
        field_token: &Token,
    ) -> Result<QueryNode, QueryParseError> {
        let Some(token) = self.peek() else {
            return Err(self.error_here(|found| {
                format!("Expected an operator after '{}', found {found}", field_token.text)
            }));
        };

        match token.kind {
            TokenKind::Operator => {
                self.advance();
                let op = CompOp::from_symbol(&token.text).ok_or_else(|| {
                    QueryParseError::at(format!("Unknown operator '{}'", token.text), token)
                })?;
                self.parse_operand(field, op, token)
            }
            TokenKind::In => {
                self.advance();
                let values = self.parse_value_list(token)?;
                Ok(QueryNode::Membership {
                    field,
                    negated: false,
                    values,
                })
            }
            TokenKind::Not => {
                self.advance();
                if !self.match_token(TokenKind::In) {
                    return Err(self.error_here(|found| format!("Expected IN after NOT, found {found}")));
                }
                let in_token = self.advance();
                let values = self.parse_value_list(in_token.unwrap_or(token))?;
                Ok(QueryNode::Membership {
                    field,
                    negated: true,
                    values,
                })
            }
            TokenKind::Is => {
                self.advance();
                let negated = self.match_token(TokenKind::Not);
                if negated {
                    self.advance();
                }
                if !self.match_token(TokenKind::Empty) {
                    return Err(self.error_here(|found| format!("Expected EMPTY after IS, found {found}")));
                }
                self.advance();
                Ok(QueryNode::EmptyTest { field, negated })
            }
            _ => Err(QueryParseError::at(
                format!(
                    "Expected an operator after '{}', found {}",
                    field_token.text,
                    token.describe()
                ),
                token,
            )),
        }
    }

    /// Parses the right-hand side of `field op`. `= EMPTY` and `!= EMPTY`
    /// are emptiness tests.
    fn parse_operand(
        &mut self,
        field: &'static FieldDescriptor,
        op: CompOp,
        op_token: &Token,
    ) -> Result<QueryNode, QueryParseError> {
        if self.match_token(TokenKind::Empty) {
            let empty = self.advance();
            return match op {
                CompOp::Eq => Ok(QueryNode::EmptyTest { field, negated: false }),
                CompOp::NotEq => Ok(QueryNode::EmptyTest { field, negated: true }),
                _ => Err(QueryParseError::new(
                    format!("EMPTY cannot be compared with '{}'", op.symbol()),
                    empty.map(Token::start),
                )),
            };
        }

        let value = self.parse_value(op_token)?;
        Ok(QueryNode::Comparison { field, op, value })
    }

    /// `'(' Value (',' Value)* ')'`
    fn parse_value_list(&mut self, in_token: &Token) -> Result<Vec<Literal>, QueryParseError> {
        if !self.match_token(TokenKind::LParen) {
            return Err(self.error_here(|found| format!("Expected '(' after IN, found {found}")));
        }
        let open = self.advance();

        if self.match_token(TokenKind::RParen) {
            return Err(QueryParseError::at(
                "IN list must contain at least one value".to_string(),
                in_token,
            ));
        }

        let mut values = Vec::new();
        let mut previous = open.unwrap_or(in_token);
        loop {
            values.push(self.parse_value(previous)?);
            match self.peek_kind() {
                TokenKind::RParen => {
                    self.advance();
                    return Ok(values);
                }
                TokenKind::Comma => {
                    previous = self.advance().unwrap_or(in_token);
                }
                _ => {
                    return Err(self.error_here(|found| {
                        format!("Expected ',' or ')' in IN list, found {found}")
                    }))
                }
            }
        }
    }

    /// Parses one value literal. `after` is the token the value follows,
    /// named in the error when the value is missing.
    fn parse_value(&mut self, after: &Token) -> Result<Literal, QueryParseError> {
        let missing = |parser: &Self| {
            parser.error_here(|found| {
                if after.kind == TokenKind::LParen {
                    format!("Expected a value, found {found}")
                } else {
                    format!("Expected a value after '{}', found {found}", after.text)
                }
            })
        };

        let Some(token) = self.peek() else {
            return Err(missing(self));
        };
        if !token.kind.is_value() {
            return Err(missing(self));
        }
        self.advance();

        match token.kind {
            TokenKind::String => {
                let inner = token
                    .text
                    .strip_prefix('"')
                    .and_then(|rest| rest.strip_suffix('"'))
                    .unwrap_or(&token.text);
                Ok(Literal::String(inner.to_string()))
            }
            TokenKind::Number => token
                .text
                .parse()
                .map(|value| Literal::Number {
                    value,
                    text: token.text.clone(),
                })
                .map_err(|_| {
                    QueryParseError::at(format!("Invalid number '{}'", token.text), token)
                }),
            TokenKind::Date => NaiveDate::parse_from_str(&token.text, "%Y-%m-%d")
                .map(Literal::Date)
                .map_err(|_| QueryParseError::at(format!("Invalid date '{}'", token.text), token)),
            TokenKind::RelativeDate => RelativeDate::parse(&token.text)
                .map(Literal::RelativeDate)
                .ok_or_else(|| {
                    QueryParseError::at(format!("Invalid relative date '{}'", token.text), token)
                }),
            _ => Ok(Literal::Word(token.text.clone())),
        }
    }
}
