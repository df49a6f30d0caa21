//! Evaluates a parsed query against ticket records.
//!
//! Evaluation is total. Operators that do not suit a field's value kind
//! and values that cannot be compared resolve to no-match; missing fields
//! fail every comparison (including `!=`) and satisfy `IS EMPTY`.

use crate::ast::{CompOp, Literal, QueryNode};
use crate::fields::{FieldDescriptor, ValueKind};
use crate::ticket::{FieldValue, TicketFields};
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;

/// Returns whether `ticket` satisfies `node` at the instant `now`.
///
/// `now` anchors relative dates; the evaluator never reads the clock.
pub fn evaluate<T: TicketFields + ?Sized>(node: &QueryNode, ticket: &T, now: DateTime<Utc>) -> bool {
    match node {
        QueryNode::MatchAll => true,
        QueryNode::Comparison { field, op, value } => {
            let actual = ticket.field_value(field);
            compare(field, *op, &actual, value, now)
        }
        QueryNode::Membership {
            field,
            negated,
            values,
        } => {
            let actual = ticket.field_value(field);
            let hit = !actual.is_empty()
                && values
                    .iter()
                    .any(|value| equals(field, &actual, value, now) == Some(true));
            hit != *negated
        }
        QueryNode::EmptyTest { field, negated } => {
            ticket.field_value(field).is_empty() != *negated
        }
        QueryNode::And(left, right) => evaluate(left, ticket, now) && evaluate(right, ticket, now),
        QueryNode::Or(left, right) => evaluate(left, ticket, now) || evaluate(right, ticket, now),
        QueryNode::Not(inner) => !evaluate(inner, ticket, now),
    }
}

/// Returns the tickets that satisfy `node`, in input order.
pub fn filter_tickets<'t, T: TicketFields>(
    node: &QueryNode,
    tickets: &'t [T],
    now: DateTime<Utc>,
) -> Vec<&'t T> {
    let matched: Vec<&T> = tickets
        .iter()
        .filter(|ticket| evaluate(node, *ticket, now))
        .collect();
    tracing::debug!(
        total = tickets.len(),
        matched = matched.len(),
        "filtered tickets"
    );
    matched
}

fn compare(
    field: &FieldDescriptor,
    op: CompOp,
    actual: &FieldValue<'_>,
    value: &Literal,
    now: DateTime<Utc>,
) -> bool {
    if actual.is_empty() {
        return false;
    }
    match op {
        CompOp::Eq => equals(field, actual, value, now) == Some(true),
        CompOp::NotEq => equals(field, actual, value, now) == Some(false),
        _ => order(field, actual, value, now).is_some_and(|ordering| op.accepts(ordering)),
    }
}

/// Equality between a field value and a literal. `None` when the two
/// cannot be compared.
fn equals(
    field: &FieldDescriptor,
    actual: &FieldValue<'_>,
    value: &Literal,
    now: DateTime<Utc>,
) -> Option<bool> {
    match (field.kind, actual) {
        (ValueKind::Enum | ValueKind::Text, FieldValue::Text(text)) => {
            Some(text_eq(text, &value.as_text()))
        }
        (ValueKind::Ordinal, FieldValue::Text(text)) => {
            let expected = value.as_text();
            Some(match field.compare_ordinal(text, &expected) {
                Some(ordering) => ordering == Ordering::Equal,
                None => text_eq(text, &expected),
            })
        }
        (ValueKind::Numeric, FieldValue::Number(number)) => {
            value.as_number().map(|expected| *number == expected)
        }
        // Dates are equal when they fall on the same calendar day.
        (ValueKind::Date, FieldValue::Date(instant)) => {
            literal_day(value, now).map(|day| instant.date_naive() == day)
        }
        (ValueKind::List, FieldValue::List(items)) => {
            let expected = value.as_text();
            Some(items.iter().any(|item| text_eq(item, &expected)))
        }
        _ => None,
    }
}

/// Ordering of a field value relative to a literal. `None` for value kinds
/// without an order and for values outside the field's ordering.
fn order(
    field: &FieldDescriptor,
    actual: &FieldValue<'_>,
    value: &Literal,
    now: DateTime<Utc>,
) -> Option<Ordering> {
    match (field.kind, actual) {
        (ValueKind::Ordinal, FieldValue::Text(text)) => {
            field.compare_ordinal(text, &value.as_text())
        }
        (ValueKind::Numeric, FieldValue::Number(number)) => {
            number.partial_cmp(&value.as_number()?)
        }
        // Absolute dates order by calendar day, relative dates by instant.
        (ValueKind::Date, FieldValue::Date(instant)) => match value.as_day() {
            Some(day) => Some(instant.date_naive().cmp(&day)),
            None => Some(instant.cmp(&value.as_instant(now)?)),
        },
        _ => None,
    }
}

fn literal_day(value: &Literal, now: DateTime<Utc>) -> Option<NaiveDate> {
    value
        .as_day()
        .or_else(|| value.as_instant(now).map(|instant| instant.date_naive()))
}

fn text_eq(left: &str, right: &str) -> bool {
    let (left, right) = (left.trim(), right.trim());
    left.eq_ignore_ascii_case(right) || left.to_lowercase() == right.to_lowercase()
}
