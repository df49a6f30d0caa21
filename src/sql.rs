//! Compiles a parsed query to a PostgreSQL `SELECT` using sea-query.
//!
//! The generated `WHERE` clause follows the evaluator's two-valued
//! semantics: every leaf is guarded so a NULL column makes the leaf FALSE
//! rather than NULL, and `NOT` over a missing value is TRUE.
//!
//! Expected schema: one row per ticket, text columns for the enum, ordinal
//! and text fields, `double precision` for `story_points`, `timestamptz`
//! for dates and a `text[]` column for `labels`.

use crate::ast::{start_of_day, CompOp, Literal, QueryNode};
use crate::fields::{FieldDescriptor, FieldId, Operator, ValueKind, ValueSource};
use chrono::{DateTime, Days, NaiveDate, Utc};
use sea_query::{Alias, Asterisk, Expr, Func, Iden, PostgresQueryBuilder, Query, SimpleExpr, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("operator {operator} on field {field} has no SQL translation")]
    Unsupported {
        field: &'static str,
        operator: Operator,
    },
    #[error("value {value} is not valid for field {field}")]
    InvalidValue { field: &'static str, value: String },
}

/// Column identifier for a registered field.
#[derive(Debug, Clone, Copy)]
pub struct ColumnName(pub &'static str);

impl ColumnName {
    pub fn of(field: &FieldDescriptor) -> Self {
        ColumnName(match field.id {
            FieldId::Status => "status",
            FieldId::Priority => "priority",
            FieldId::Type => "type",
            FieldId::Resolution => "resolution",
            FieldId::Assignee => "assignee",
            FieldId::Reporter => "reporter",
            FieldId::Sprint => "sprint",
            FieldId::StoryPoints => "story_points",
            FieldId::Labels => "labels",
            FieldId::Title => "title",
            FieldId::Description => "description",
            FieldId::Created => "created",
            FieldId::Updated => "updated",
            FieldId::DueDate => "due_date",
        })
    }
}

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(self.0);
    }
}

pub struct SqlCompiler {
    table: String,
}

impl SqlCompiler {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Compiles `node` into `SELECT * FROM <table> WHERE ...`. Relative
    /// dates are resolved against `now` into literal timestamps.
    pub fn compile(&self, node: &QueryNode, now: DateTime<Utc>) -> Result<String, CompileError> {
        let condition = self.compile_condition(node, now)?;
        let sql = Query::select()
            .column(Asterisk)
            .from(Alias::new(self.table.as_str()))
            .and_where(condition)
            .to_string(PostgresQueryBuilder);
        tracing::debug!(%sql, "compiled query");
        Ok(sql)
    }

    /// Compiles `node` into a boolean SQL expression.
    pub fn compile_condition(
        &self,
        node: &QueryNode,
        now: DateTime<Utc>,
    ) -> Result<SimpleExpr, CompileError> {
        let expr = match node {
            QueryNode::MatchAll => Expr::val(true).into(),
            QueryNode::Comparison { field, op, value } => {
                let leaf = self.compile_comparison(*field, *op, value, now)?;
                present(field).and(leaf)
            }
            QueryNode::Membership {
                field,
                negated,
                values,
            } => {
                let hit = present(field).and(self.compile_membership(*field, values, now)?);
                if *negated {
                    hit.not()
                } else {
                    hit
                }
            }
            QueryNode::EmptyTest { field, negated } => {
                let empty = absent(field);
                if *negated {
                    empty.not()
                } else {
                    empty
                }
            }
            QueryNode::And(left, right) => self
                .compile_condition(left, now)?
                .and(self.compile_condition(right, now)?),
            QueryNode::Or(left, right) => self
                .compile_condition(left, now)?
                .or(self.compile_condition(right, now)?),
            QueryNode::Not(inner) => self.compile_condition(inner, now)?.not(),
        };
        Ok(expr)
    }

    fn compile_comparison(
        &self,
        field: &'static FieldDescriptor,
        op: CompOp,
        value: &Literal,
        now: DateTime<Utc>,
    ) -> Result<SimpleExpr, CompileError> {
        let column = ColumnName::of(field);

        match field.kind {
            ValueKind::Enum | ValueKind::Text | ValueKind::List if op.operator().is_comparison() => {
                Ok(never())
            }
            ValueKind::Enum | ValueKind::Text => Ok(lowered(column, op, value)),
            ValueKind::Ordinal => match op {
                CompOp::Eq | CompOp::NotEq => Ok(lowered(column, op, value)),
                _ => self.compile_rank_comparison(field, op, value),
            },
            ValueKind::Numeric => {
                let number = number_of(field, value)?;
                Ok(apply(Expr::col(column), op, Value::Double(Some(number))))
            }
            ValueKind::Date => match value.as_day() {
                Some(day) => Ok(day_comparison(column, op, day)),
                None => {
                    let instant = instant_of(field, value, now)?;
                    Ok(match op {
                        CompOp::Eq => same_day(column, instant.date_naive()),
                        CompOp::NotEq => same_day(column, instant.date_naive()).not(),
                        _ => apply(Expr::col(column), op, timestamp(instant)),
                    })
                }
            },
            ValueKind::List => {
                let any = any_label(column, vec![lowered_text(value)]);
                Ok(if op == CompOp::NotEq { any.not() } else { any })
            }
        }
    }

    /// `priority > medium` becomes `LOWER(priority) IN ('high', 'highest')`.
    fn compile_rank_comparison(
        &self,
        field: &'static FieldDescriptor,
        op: CompOp,
        value: &Literal,
    ) -> Result<SimpleExpr, CompileError> {
        let ValueSource::Static(table) = field.values else {
            tracing::warn!(field = field.name, operator = %op.operator(), "no SQL ordering for field");
            return Err(CompileError::Unsupported {
                field: field.name,
                operator: op.operator(),
            });
        };

        let expected = value.as_text();
        let ranks: Vec<Value> = table
            .iter()
            .filter(|candidate| {
                field
                    .compare_ordinal(candidate, &expected)
                    .is_some_and(|ordering| op.accepts(ordering))
            })
            .map(|candidate| text_value((*candidate).to_owned()))
            .collect();

        if ranks.is_empty() {
            return Ok(never());
        }
        Ok(Expr::expr(Func::lower(Expr::col(ColumnName::of(field)))).is_in(ranks))
    }

    fn compile_membership(
        &self,
        field: &'static FieldDescriptor,
        values: &[Literal],
        now: DateTime<Utc>,
    ) -> Result<SimpleExpr, CompileError> {
        let column = ColumnName::of(field);

        let expr = match field.kind {
            ValueKind::Enum | ValueKind::Text | ValueKind::Ordinal => {
                let texts: Vec<Value> = values.iter().map(lowered_text).collect();
                Expr::expr(Func::lower(Expr::col(column))).is_in(texts)
            }
            ValueKind::Numeric => {
                let numbers = values
                    .iter()
                    .map(|value| number_of(field, value).map(|n| Value::Double(Some(n))))
                    .collect::<Result<Vec<_>, _>>()?;
                Expr::col(column).is_in(numbers)
            }
            ValueKind::Date => values
                .iter()
                .map(|value| {
                    let instant = instant_of(field, value, now)?;
                    let day = value.as_day().unwrap_or(instant.date_naive());
                    Ok::<_, CompileError>(same_day(column, day))
                })
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .reduce(SimpleExpr::or)
                .unwrap_or_else(never),
            ValueKind::List => any_label(column, values.iter().map(lowered_text).collect()),
        };
        Ok(expr)
    }
}

fn never() -> SimpleExpr {
    Expr::val(false).into()
}

fn text_value(text: String) -> Value {
    Value::String(Some(Box::new(text)))
}

fn lowered_text(value: &Literal) -> Value {
    text_value(value.as_text().trim().to_lowercase())
}

fn timestamp(instant: DateTime<Utc>) -> Value {
    text_value(instant.to_rfc3339())
}

/// Guard that makes a leaf FALSE when the field is empty.
fn present(field: &FieldDescriptor) -> SimpleExpr {
    absent(field).not()
}

/// Mirrors `FieldValue::is_empty`.
fn absent(field: &FieldDescriptor) -> SimpleExpr {
    let column = ColumnName::of(field);
    let null = Expr::col(column).is_null();
    match field.kind {
        ValueKind::Enum | ValueKind::Ordinal | ValueKind::Text => {
            null.or(Expr::cust(format!("TRIM(\"{}\") = ''", column.0)))
        }
        ValueKind::List => null.or(Expr::cust(format!("cardinality(\"{}\") = 0", column.0))),
        ValueKind::Numeric | ValueKind::Date => null,
    }
}

fn lowered(column: ColumnName, op: CompOp, value: &Literal) -> SimpleExpr {
    apply(Expr::expr(Func::lower(Expr::col(column))), op, lowered_text(value))
}

fn apply(left: Expr, op: CompOp, value: Value) -> SimpleExpr {
    match op {
        CompOp::Eq => left.eq(value),
        CompOp::NotEq => left.ne(value),
        CompOp::Gt => left.gt(value),
        CompOp::Lt => left.lt(value),
        CompOp::Gte => left.gte(value),
        CompOp::Lte => left.lte(value),
    }
}

fn next_day_start(day: NaiveDate) -> DateTime<Utc> {
    day.checked_add_days(Days::new(1))
        .map_or(DateTime::<Utc>::MAX_UTC, start_of_day)
}

fn same_day(column: ColumnName, day: NaiveDate) -> SimpleExpr {
    Expr::col(column)
        .gte(timestamp(start_of_day(day)))
        .and(Expr::col(column).lt(timestamp(next_day_start(day))))
}

/// Compares a timestamp column against a whole calendar day.
fn day_comparison(column: ColumnName, op: CompOp, day: NaiveDate) -> SimpleExpr {
    match op {
        CompOp::Eq => same_day(column, day),
        CompOp::NotEq => same_day(column, day).not(),
        CompOp::Gt => Expr::col(column).gte(timestamp(next_day_start(day))),
        CompOp::Gte => Expr::col(column).gte(timestamp(start_of_day(day))),
        CompOp::Lt => Expr::col(column).lt(timestamp(start_of_day(day))),
        CompOp::Lte => Expr::col(column).lt(timestamp(next_day_start(day))),
    }
}

fn any_label(column: ColumnName, values: Vec<Value>) -> SimpleExpr {
    let placeholders = (1..=values.len())
        .map(|index| format!("${index}"))
        .collect::<Vec<_>>()
        .join(", ");
    Expr::cust_with_values(
        format!(
            "EXISTS (SELECT 1 FROM unnest(\"{}\") AS label WHERE LOWER(label) IN ({placeholders}))",
            column.0
        ),
        values,
    )
}

fn number_of(field: &'static FieldDescriptor, value: &Literal) -> Result<f64, CompileError> {
    value.as_number().ok_or_else(|| CompileError::InvalidValue {
        field: field.name,
        value: value.to_string(),
    })
}

fn instant_of(
    field: &'static FieldDescriptor,
    value: &Literal,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, CompileError> {
    value.as_instant(now).ok_or_else(|| CompileError::InvalidValue {
        field: field.name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 15, 30, 0).unwrap()
    }

    fn compile(query: &str) -> Result<String, CompileError> {
        SqlCompiler::new("tickets").compile(&parse(query).unwrap(), now())
    }

    #[test]
    fn test_match_all() {
        let sql = compile("").unwrap();
        assert!(sql.starts_with(r#"SELECT * FROM "tickets" WHERE"#));
        assert!(sql.contains("TRUE"));
    }

    #[test]
    fn test_text_equality_is_lowered_and_guarded() {
        let sql = compile("type = Bug").unwrap();
        assert!(sql.contains(r#""type" IS NULL"#));
        assert!(sql.contains(r#"LOWER("type") = 'bug'"#));
    }

    #[test]
    fn test_priority_ordering_becomes_rank_set() {
        let sql = compile("priority > medium").unwrap();
        assert!(sql.contains(r#"LOWER("priority") IN ('high', 'highest')"#));

        let sql = compile("priority > urgent").unwrap();
        assert!(sql.contains("FALSE"));
    }

    #[test]
    fn test_comparison_on_enum_is_false() {
        let sql = compile("type > bug").unwrap();
        assert!(sql.contains("FALSE"));
        assert!(!sql.contains("'bug'"));
    }

    #[test]
    fn test_relative_date_is_resolved() {
        let sql = compile("created > -7d").unwrap();
        assert!(sql.contains(r#""created" > '2025-03-03T15:30:00+00:00'"#));
    }

    #[test]
    fn test_absolute_date_ordering_uses_day_bounds() {
        let sql = compile("created > 2025-03-05").unwrap();
        assert!(sql.contains(r#""created" >= '2025-03-06T00:00:00+00:00'"#));
        let sql = compile("created <= 2025-03-05").unwrap();
        assert!(sql.contains(r#""created" < '2025-03-06T00:00:00+00:00'"#));
        let sql = compile("created < 2025-03-05").unwrap();
        assert!(sql.contains(r#""created" < '2025-03-05T00:00:00+00:00'"#));
    }

    #[test]
    fn test_number_literal_text_is_kept_for_text_fields() {
        let sql = compile("labels IN (2.0)").unwrap();
        assert!(sql.contains("IN ('2.0')"));
        let sql = compile("status = 007").unwrap();
        assert!(sql.contains(r#"LOWER("status") = '007'"#));
    }

    #[test]
    fn test_date_equality_covers_the_day() {
        let sql = compile("due = 2024-12-31").unwrap();
        assert!(sql.contains(r#""due_date" >= '2024-12-31T00:00:00+00:00'"#));
        assert!(sql.contains(r#""due_date" < '2025-01-01T00:00:00+00:00'"#));
    }

    #[test]
    fn test_labels_use_unnest() {
        let sql = compile(r#"labels NOT IN ("Frontend", urgent)"#).unwrap();
        assert!(sql.contains(r#"unnest("labels")"#));
        assert!(sql.contains("IN ('frontend', 'urgent')"));
        assert!(sql.contains("NOT"));
    }

    #[test]
    fn test_empty_tests() {
        let sql = compile("labels IS EMPTY").unwrap();
        assert!(sql.contains(r#"cardinality("labels") = 0"#));
        let sql = compile("points IS NOT EMPTY").unwrap();
        assert!(sql.contains(r#""story_points" IS NULL"#));
    }

    #[test]
    fn test_sprint_ordering_is_unsupported() {
        assert_eq!(
            compile(r#"sprint > "Sprint 3""#),
            Err(CompileError::Unsupported {
                field: "sprint",
                operator: Operator::Gt,
            })
        );
    }

    #[test]
    fn test_invalid_numeric_value() {
        assert_eq!(
            compile("points >= lots"),
            Err(CompileError::InvalidValue {
                field: "storyPoints",
                value: "lots".to_string(),
            })
        );
    }
}
