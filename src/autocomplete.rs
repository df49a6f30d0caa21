//! Cursor-aware completion context for the query bar.
//!
//! [`resolve_context`] re-tokenizes the whole input on every call and walks
//! the tokens before the cursor with a small state machine. It never calls
//! the parser, so it works on input that does not parse yet.

use crate::config::ValueCatalog;
use crate::fields::{FieldDescriptor, Operator, ValueSource, REGISTRY};
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};
use serde::Serialize;

/// What the user is typing at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Field,
    Operator,
    Value,
    /// `AND` / `OR` after a complete predicate.
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteContext {
    pub kind: ContextKind,
    /// Text of the token under the cursor, from its start up to the cursor.
    /// Empty when the cursor sits in whitespace.
    pub partial: String,
    /// Byte offset where a completion is spliced in.
    pub position: usize,
    /// Canonical name of the field in scope, for operator and value
    /// contexts.
    pub field_name: Option<&'static str>,
}

impl AutocompleteContext {
    fn new(
        kind: ContextKind,
        source: &str,
        position: usize,
        cursor: usize,
        field: Option<&'static FieldDescriptor>,
    ) -> Self {
        Self {
            kind,
            partial: source.get(position..cursor).unwrap_or_default().to_string(),
            position,
            field_name: field.map(|field| field.name),
        }
    }

    /// Replaces the partial text in `source` with `replacement`.
    pub fn splice(&self, source: &str, replacement: &str) -> String {
        let end = self.position + self.partial.len();
        match (source.get(..self.position), source.get(end..)) {
            (Some(head), Some(tail)) => format!("{head}{replacement}{tail}"),
            _ => source.to_string(),
        }
    }

    fn field(&self) -> Option<&'static FieldDescriptor> {
        self.field_name.and_then(|name| REGISTRY.resolve(name))
    }
}

/// Parser position reached after the tokens before the cursor.
#[derive(Debug, Clone, Copy)]
enum State {
    /// A field name is expected.
    Field,
    /// After a field name (`None` when the name is not a known field).
    Operator(Option<&'static FieldDescriptor>),
    /// After `field NOT`, expecting `IN`. Holds the offset of `NOT`.
    NotIn(Option<&'static FieldDescriptor>, usize),
    /// After `field IS` or `field IS NOT`. Holds the offset of `IS`.
    Is(Option<&'static FieldDescriptor>, usize),
    /// After `field op`.
    Value(Option<&'static FieldDescriptor>),
    /// After `field IN` / `field NOT IN`, expecting `(`.
    AfterIn(Option<&'static FieldDescriptor>),
    /// Inside an IN list where a value is expected.
    ListValue(Option<&'static FieldDescriptor>),
    /// Inside an IN list after a value, expecting `,` or `)`.
    ListSeparator(Option<&'static FieldDescriptor>),
    /// After a complete predicate.
    Keyword,
}

impl State {
    fn step(self, token: &Token) -> State {
        use TokenKind as K;

        match (self, token.kind) {
            (_, K::Unknown) => self,
            (State::ListValue(field), K::Comma) | (State::ListSeparator(field), K::Comma) => {
                State::ListValue(field)
            }
            (State::ListValue(_) | State::ListSeparator(_), K::RParen) => State::Keyword,
            (State::ListValue(field), kind) if kind.is_value() || kind == K::Empty => {
                State::ListSeparator(field)
            }
            (State::ListValue(field), _) => State::ListValue(field),
            (State::ListSeparator(field), _) => State::ListSeparator(field),

            (_, K::And | K::Or) => State::Field,

            (State::Field, K::Field | K::Value) => State::Operator(REGISTRY.resolve(&token.text)),
            (State::Field, K::Not | K::LParen) => State::Field,
            (State::Field, _) => State::Keyword,

            (State::Operator(field), K::Operator) => State::Value(field),
            (State::Operator(field), K::In) => State::AfterIn(field),
            (State::Operator(field), K::Not) => State::NotIn(field, token.start()),
            (State::Operator(field), K::Is) => State::Is(field, token.start()),

            (State::NotIn(field, _), K::In) => State::AfterIn(field),
            (State::Is(field, start), K::Not) => State::Is(field, start),
            (State::AfterIn(field), K::LParen) => State::ListValue(field),

            (State::Keyword, K::Not) => State::Field,
            _ => State::Keyword,
        }
    }

    fn context(self, source: &str, start: usize, cursor: usize) -> Option<AutocompleteContext> {
        let context = match self {
            State::Field => AutocompleteContext::new(ContextKind::Field, source, start, cursor, None),
            State::Operator(field) => {
                AutocompleteContext::new(ContextKind::Operator, source, start, cursor, field)
            }
            // Multi-word operators are completed as a whole, so the
            // partial reaches back to the first keyword.
            State::NotIn(field, keyword) | State::Is(field, keyword) => {
                AutocompleteContext::new(ContextKind::Operator, source, keyword, cursor, field)
            }
            State::Value(field) | State::AfterIn(field) | State::ListValue(field) => {
                AutocompleteContext::new(ContextKind::Value, source, start, cursor, field)
            }
            State::ListSeparator(_) => return None,
            State::Keyword => {
                AutocompleteContext::new(ContextKind::Keyword, source, start, cursor, None)
            }
        };
        Some(context)
    }
}

/// Whether the cursor sitting right after `token` still edits it.
/// Punctuation, closed strings and operators are complete once typed,
/// except `<` and `>`, which may still grow into `<=` and `>=`.
fn open_at_end(token: &Token) -> bool {
    match token.kind {
        TokenKind::LParen | TokenKind::RParen | TokenKind::Comma => false,
        TokenKind::Operator => matches!(token.text.as_str(), "<" | ">"),
        TokenKind::String => token.text.len() < 2,
        _ => true,
    }
}

/// Classifies the token under `cursor` (a byte offset into `source`).
///
/// Returns `None` when the cursor is out of range or not on a character
/// boundary, and inside an IN list where only `,` or `)` can follow.
pub fn resolve_context(source: &str, cursor: usize) -> Option<AutocompleteContext> {
    if !source.is_char_boundary(cursor) {
        return None;
    }

    let tokens = tokenize(source);
    let current = tokens.iter().position(|token| {
        token.kind != TokenKind::Eof
            && token.start() < cursor
            && (cursor < token.end() || (cursor == token.end() && open_at_end(token)))
    });

    let (preceding, start) = match current {
        Some(index) => (&tokens[..index], tokens[index].start()),
        None => {
            let count = tokens
                .iter()
                .take_while(|token| token.kind != TokenKind::Eof && token.end() <= cursor)
                .count();
            (&tokens[..count], cursor)
        }
    };

    let state = preceding.iter().fold(State::Field, |state, token| state.step(token));
    state.context(source, start, cursor)
}

/// A completion candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    /// Text shown in the dropdown.
    pub label: String,
    /// Text spliced into the query.
    pub replacement: String,
}

impl Suggestion {
    fn plain(text: &str) -> Self {
        Self {
            label: text.to_string(),
            replacement: text.to_string(),
        }
    }
}

/// Suggestions for `context`, filtered by its partial text.
///
/// Value suggestions come from the field's static values, or from
/// `catalog` for fields whose values the host supplies. Numeric, date and
/// free-text fields get none.
pub fn suggest(context: &AutocompleteContext, catalog: &ValueCatalog) -> Vec<Suggestion> {
    match context.kind {
        ContextKind::Field => {
            let prefix = context.partial.to_lowercase();
            REGISTRY
                .fields()
                .iter()
                .filter(|field| {
                    field
                        .names()
                        .any(|name| name.to_lowercase().starts_with(&prefix))
                })
                .map(|field| Suggestion::plain(field.name))
                .collect()
        }
        ContextKind::Operator => {
            let operators: &[Operator] = match context.field() {
                Some(field) => field.operators(),
                None => &Operator::ALL,
            };
            let prefix = normalize_operator(&context.partial);
            operators
                .iter()
                .filter(|op| op.symbol().starts_with(&prefix))
                .map(|op| Suggestion::plain(op.symbol()))
                .collect()
        }
        ContextKind::Value => {
            let Some(field) = context.field() else {
                return Vec::new();
            };
            let quoted = context.partial.starts_with('"');
            let prefix = context.partial.trim_start_matches('"').to_lowercase();
            let candidates: Vec<&str> = match field.values {
                ValueSource::Static(values) => values.to_vec(),
                ValueSource::Dynamic(list) => {
                    catalog.values(list).iter().map(String::as_str).collect()
                }
                ValueSource::Open => Vec::new(),
            };
            candidates
                .into_iter()
                .filter(|value| value.to_lowercase().starts_with(&prefix))
                .map(|value| Suggestion {
                    label: value.to_string(),
                    replacement: if quoted || !is_bare_value(value) {
                        format!("\"{value}\"")
                    } else {
                        value.to_string()
                    },
                })
                .collect()
        }
        ContextKind::Keyword => {
            let prefix = context.partial.to_ascii_uppercase();
            ["AND", "OR"]
                .into_iter()
                .filter(|keyword| keyword.starts_with(&prefix))
                .map(Suggestion::plain)
                .collect()
        }
    }
}

/// Upper-cases and collapses whitespace runs, so `is  n` matches `IS NOT EMPTY`.
fn normalize_operator(partial: &str) -> String {
    let mut out = String::with_capacity(partial.len());
    let mut in_space = false;
    for c in partial.chars() {
        if c.is_whitespace() {
            in_space = true;
            continue;
        }
        if in_space && !out.is_empty() {
            out.push(' ');
        }
        in_space = false;
        out.push(c.to_ascii_uppercase());
    }
    if in_space && !out.is_empty() {
        out.push(' ');
    }
    out
}

/// Whether `value` lexes back as a single unquoted value token.
fn is_bare_value(value: &str) -> bool {
    match tokenize(value).as_slice() {
        [token, eof] => {
            eof.kind == TokenKind::Eof
                && token.kind.is_value()
                && token.kind != TokenKind::String
                && token.span.len() == value.len()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context(source: &str) -> AutocompleteContext {
        resolve_context(source, source.len()).unwrap()
    }

    fn labels(suggestions: Vec<Suggestion>) -> Vec<String> {
        suggestions.into_iter().map(|s| s.label).collect()
    }

    #[test]
    fn test_operator_after_field() {
        assert_eq!(
            resolve_context("priority ", 9),
            Some(AutocompleteContext {
                kind: ContextKind::Operator,
                partial: String::new(),
                position: 9,
                field_name: Some("priority"),
            })
        );
    }

    #[test]
    fn test_field_positions() {
        for source in ["", "  ", "(", "NOT ", "type = bug AND ", "type = bug OR (", "pri"] {
            let ctx = context(source);
            assert_eq!(ctx.kind, ContextKind::Field, "source {source:?}");
            assert_eq!(ctx.field_name, None);
        }
        assert_eq!(context("pri").partial, "pri");
        assert_eq!(context("pri").position, 0);
    }

    #[test]
    fn test_partial_stops_at_cursor() {
        let ctx = resolve_context("priority = high", 4).unwrap();
        assert_eq!(ctx.kind, ContextKind::Field);
        assert_eq!(ctx.partial, "prio");
        assert_eq!(ctx.position, 0);
    }

    #[test]
    fn test_alias_resolves_field_name() {
        let ctx = context("points ");
        assert_eq!(ctx.kind, ContextKind::Operator);
        assert_eq!(ctx.field_name, Some("storyPoints"));
    }

    #[test]
    fn test_value_after_operator() {
        let ctx = context("type = ");
        assert_eq!(ctx.kind, ContextKind::Value);
        assert_eq!(ctx.field_name, Some("type"));
        assert_eq!(ctx.partial, "");

        let ctx = context("type != st");
        assert_eq!(ctx.kind, ContextKind::Value);
        assert_eq!(ctx.partial, "st");
        assert_eq!(ctx.position, 8);

        let ctx = context("priority >= ");
        assert_eq!(ctx.kind, ContextKind::Value);
        assert_eq!(ctx.position, 12);
    }

    #[test]
    fn test_single_angle_bracket_is_still_an_operator() {
        let ctx = context("priority >");
        assert_eq!(ctx.kind, ContextKind::Operator);
        assert_eq!(ctx.partial, ">");
        assert_eq!(ctx.position, 9);

        let ctx = context("priority >=");
        assert_eq!(ctx.kind, ContextKind::Value);
        assert_eq!(ctx.position, 11);
    }

    #[test]
    fn test_value_inside_in_list() {
        for source in ["labels IN ", "labels IN (", "labels IN (fr", "labels NOT IN (a, "] {
            let ctx = context(source);
            assert_eq!(ctx.kind, ContextKind::Value, "source {source:?}");
            assert_eq!(ctx.field_name, Some("labels"));
        }
        assert_eq!(context("labels IN (fr").partial, "fr");
        assert_eq!(context("labels IN (a, fr").partial, "fr");
        assert_eq!(resolve_context("labels IN (a ", 13), None);
    }

    #[test]
    fn test_comma_in_list_expects_a_value_not_a_field() {
        let catalog = ValueCatalog {
            labels: vec!["frontend".to_string(), "backend".to_string()],
            ..ValueCatalog::default()
        };
        let ctx = context("labels IN (frontend, ");
        assert_eq!(ctx.kind, ContextKind::Value);
        assert_eq!(ctx.field_name, Some("labels"));
        assert_eq!(labels(suggest(&ctx, &catalog)), vec!["frontend", "backend"]);
    }

    #[test]
    fn test_keyword_after_complete_predicate() {
        for source in [
            "type = bug ",
            "labels IN (a, b) ",
            "assignee IS EMPTY ",
            r#"status = "Done""#,
            "(type = bug)",
        ] {
            assert_eq!(context(source).kind, ContextKind::Keyword, "source {source:?}");
        }
        let ctx = context("type = bug AN");
        assert_eq!(ctx.kind, ContextKind::Keyword);
        assert_eq!(ctx.partial, "AN");
    }

    #[test]
    fn test_multi_word_operators() {
        let ctx = context("assignee IS N");
        assert_eq!(ctx.kind, ContextKind::Operator);
        assert_eq!(ctx.partial, "IS N");
        assert_eq!(ctx.position, 9);
        assert_eq!(ctx.field_name, Some("assignee"));

        let ctx = context("labels NOT ");
        assert_eq!(ctx.kind, ContextKind::Operator);
        assert_eq!(ctx.partial, "NOT ");
    }

    #[test]
    fn test_unknown_field_gives_unscoped_operator() {
        let ctx = context("colour ");
        assert_eq!(ctx.kind, ContextKind::Operator);
        assert_eq!(ctx.field_name, None);
    }

    #[test]
    fn test_invalid_cursor() {
        assert_eq!(resolve_context("type", 5), None);
        assert_eq!(resolve_context("é", 1), None);
    }

    #[test]
    fn test_suggest_fields() {
        let catalog = ValueCatalog::default();
        let ctx = context("type = bug AND s");
        assert_eq!(
            labels(suggest(&ctx, &catalog)),
            vec!["status", "sprint", "storyPoints", "title"]
        );
    }

    #[test]
    fn test_suggest_operators_narrow_by_kind() {
        let catalog = ValueCatalog::default();
        assert_eq!(
            labels(suggest(&context("type "), &catalog)),
            vec!["=", "!=", "IN", "NOT IN"]
        );
        assert_eq!(
            labels(suggest(&context("created "), &catalog)).len(),
            Operator::ALL.len()
        );
        assert_eq!(
            labels(suggest(&context("assignee is n"), &catalog)),
            vec!["IS NOT EMPTY"]
        );
        assert_eq!(
            labels(suggest(&context("priority !"), &catalog)),
            vec!["!="]
        );
        assert_eq!(
            labels(suggest(&context("priority >"), &catalog)),
            vec![">", ">="]
        );
        assert_eq!(
            labels(suggest(&context("priority < "), &catalog)),
            vec!["lowest", "low", "medium", "high", "highest"]
        );
    }

    #[test]
    fn test_suggest_static_and_dynamic_values() {
        let catalog = ValueCatalog {
            statuses: vec!["To Do".to_string(), "Done".to_string()],
            ..ValueCatalog::default()
        };

        assert_eq!(
            labels(suggest(&context("priority = h"), &catalog)),
            vec!["high", "highest"]
        );

        let suggestions = suggest(&context("status = "), &catalog);
        assert_eq!(
            suggestions,
            vec![
                Suggestion {
                    label: "To Do".to_string(),
                    replacement: "\"To Do\"".to_string(),
                },
                Suggestion::plain("Done"),
            ]
        );

        let suggestions = suggest(&context(r#"status = "d"#), &catalog);
        assert_eq!(suggestions[0].replacement, "\"Done\"");

        assert!(suggest(&context("points = "), &catalog).is_empty());
        assert!(suggest(&context("colour = "), &catalog).is_empty());
    }

    #[test]
    fn test_suggest_keywords() {
        let catalog = ValueCatalog::default();
        assert_eq!(labels(suggest(&context("type = bug "), &catalog)), vec!["AND", "OR"]);
        assert_eq!(labels(suggest(&context("type = bug o"), &catalog)), vec!["OR"]);
    }

    #[test]
    fn test_splice() {
        let source = "type = bug AND pri";
        let ctx = context(source);
        assert_eq!(ctx.splice(source, "priority"), "type = bug AND priority");

        let source = "assignee IS N";
        let ctx = context(source);
        assert_eq!(ctx.splice(source, "IS NOT EMPTY"), "assignee IS NOT EMPTY");
    }
}
