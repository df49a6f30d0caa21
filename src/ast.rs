//! Abstract syntax tree of a parsed ticket query.

use crate::fields::{FieldDescriptor, Operator};
use chrono::{DateTime, Months, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;

/// Root and interior nodes of a parsed query.
///
/// Field references point into the global registry, so a node can only
/// name fields that exist.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// The empty query. Matches every ticket.
    MatchAll,
    /// `field op value`
    Comparison {
        field: &'static FieldDescriptor,
        op: CompOp,
        value: Literal,
    },
    /// `field IN (...)` / `field NOT IN (...)`
    Membership {
        field: &'static FieldDescriptor,
        negated: bool,
        values: Vec<Literal>,
    },
    /// `field IS EMPTY` / `field IS NOT EMPTY`
    EmptyTest {
        field: &'static FieldDescriptor,
        negated: bool,
    },
    And(Box<QueryNode>, Box<QueryNode>),
    Or(Box<QueryNode>, Box<QueryNode>),
    Not(Box<QueryNode>),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompOp {
    Eq,    // =
    NotEq, // !=
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=
}

impl CompOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(CompOp::Eq),
            "!=" => Some(CompOp::NotEq),
            ">" => Some(CompOp::Gt),
            "<" => Some(CompOp::Lt),
            ">=" => Some(CompOp::Gte),
            "<=" => Some(CompOp::Lte),
            _ => None,
        }
    }

    pub fn operator(self) -> Operator {
        match self {
            CompOp::Eq => Operator::Eq,
            CompOp::NotEq => Operator::NotEq,
            CompOp::Gt => Operator::Gt,
            CompOp::Lt => Operator::Lt,
            CompOp::Gte => Operator::Gte,
            CompOp::Lte => Operator::Lte,
        }
    }

    pub fn symbol(self) -> &'static str {
        self.operator().symbol()
    }

    /// Whether `actual.cmp(expected) == ordering` satisfies this operator.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompOp::Eq => ordering == Ordering::Equal,
            CompOp::NotEq => ordering != Ordering::Equal,
            CompOp::Gt => ordering == Ordering::Greater,
            CompOp::Lt => ordering == Ordering::Less,
            CompOp::Gte => ordering != Ordering::Less,
            CompOp::Lte => ordering != Ordering::Greater,
        }
    }
}

/// A value literal, tagged by the token it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Double-quoted string, quotes removed.
    String(String),
    /// Bare word.
    Word(String),
    /// Numeric literal with its lexeme, which text-valued fields compare
    /// against (`2.0`, `007`).
    Number { value: f64, text: String },
    Date(NaiveDate),
    RelativeDate(RelativeDate),
}

impl Literal {
    /// The literal as text, for equality against text-valued fields.
    pub fn as_text(&self) -> String {
        match self {
            Literal::String(s) | Literal::Word(s) => s.clone(),
            Literal::Number { text, .. } => text.clone(),
            Literal::Date(d) => d.format("%Y-%m-%d").to_string(),
            Literal::RelativeDate(r) => r.to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Literal::Number { value, .. } => Some(*value),
            Literal::String(s) | Literal::Word(s) => s.trim().parse().ok(),
            Literal::Date(_) | Literal::RelativeDate(_) => None,
        }
    }

    /// The calendar day named by an absolute date or a `YYYY-MM-DD` string.
    /// Ordering against such a literal compares whole days.
    pub fn as_day(&self) -> Option<NaiveDate> {
        match self {
            Literal::Date(d) => Some(*d),
            Literal::String(s) | Literal::Word(s) => {
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
            }
            Literal::Number { .. } | Literal::RelativeDate(_) => None,
        }
    }

    /// Resolves the literal to an instant. Relative dates are resolved
    /// against `now`; absolute dates and date-shaped strings mean midnight
    /// UTC of that day.
    pub fn as_instant(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Literal::Date(d) => Some(start_of_day(*d)),
            Literal::RelativeDate(r) => Some(r.resolve(now)),
            Literal::String(s) | Literal::Word(s) => {
                let s = s.trim();
                if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    return Some(start_of_day(date));
                }
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
            Literal::Number { .. } => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "\"{s}\""),
            Literal::Word(s) => f.write_str(s),
            Literal::Number { text, .. } => f.write_str(text),
            Literal::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Literal::RelativeDate(r) => write!(f, "{r}"),
        }
    }
}

/// Unit of a relative date literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateUnit {
    Day,
    Week,
    Month,
    Year,
}

impl DateUnit {
    pub fn from_suffix(suffix: char) -> Option<Self> {
        match suffix.to_ascii_lowercase() {
            'd' => Some(DateUnit::Day),
            'w' => Some(DateUnit::Week),
            'm' => Some(DateUnit::Month),
            'y' => Some(DateUnit::Year),
            _ => None,
        }
    }

    pub fn suffix(self) -> char {
        match self {
            DateUnit::Day => 'd',
            DateUnit::Week => 'w',
            DateUnit::Month => 'm',
            DateUnit::Year => 'y',
        }
    }
}

/// `-N<unit>`: N units before the moment of evaluation.
///
/// Resolution happens at evaluation time, so re-running the same query
/// later moves the cutoff forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelativeDate {
    pub amount: u32,
    pub unit: DateUnit,
}

impl RelativeDate {
    /// Parses `-7d`, `-2w`, `-3m` or `-1y`.
    pub fn parse(text: &str) -> Option<Self> {
        let body = text.strip_prefix('-')?;
        let unit = DateUnit::from_suffix(body.chars().last()?)?;
        let amount = body[..body.len() - 1].parse().ok()?;
        Some(Self { amount, unit })
    }

    /// The cutoff instant `now - amount units`. Months and years step by
    /// calendar months; overflow saturates to the earliest instant.
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let amount = i64::from(self.amount);
        let shifted = match self.unit {
            DateUnit::Day => TimeDelta::try_days(amount).and_then(|d| now.checked_sub_signed(d)),
            DateUnit::Week => {
                TimeDelta::try_weeks(amount).and_then(|d| now.checked_sub_signed(d))
            }
            DateUnit::Month => now.checked_sub_months(Months::new(self.amount)),
            DateUnit::Year => self
                .amount
                .checked_mul(12)
                .and_then(|months| now.checked_sub_months(Months::new(months))),
        };
        shifted.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl fmt::Display for RelativeDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-{}{}", self.amount, self.unit.suffix())
    }
}

pub(crate) fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// A field/operator pair the registry does not offer for that field.
///
/// The parser accepts such pairs and the evaluator treats them as
/// no-match; hosts can surface these as warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorMismatch {
    pub field: &'static str,
    pub operator: Operator,
}

impl fmt::Display for OperatorMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operator {} is not supported for field {}", self.operator, self.field)
    }
}

impl QueryNode {
    pub fn and(left: QueryNode, right: QueryNode) -> Self {
        QueryNode::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: QueryNode, right: QueryNode) -> Self {
        QueryNode::Or(Box::new(left), Box::new(right))
    }

    pub fn negate(inner: QueryNode) -> Self {
        QueryNode::Not(Box::new(inner))
    }

    /// Lists every predicate whose operator is outside the field's
    /// operator set, in source order.
    pub fn operator_mismatches(&self) -> Vec<OperatorMismatch> {
        let mut found = Vec::new();
        self.collect_mismatches(&mut found);
        found
    }

    fn collect_mismatches(&self, found: &mut Vec<OperatorMismatch>) {
        let (field, operator) = match self {
            QueryNode::MatchAll => return,
            QueryNode::Comparison { field, op, .. } => (*field, op.operator()),
            QueryNode::Membership { field, negated, .. } => {
                (*field, if *negated { Operator::NotIn } else { Operator::In })
            }
            QueryNode::EmptyTest { field, negated } => (
                *field,
                if *negated {
                    Operator::IsNotEmpty
                } else {
                    Operator::IsEmpty
                },
            ),
            QueryNode::And(left, right) | QueryNode::Or(left, right) => {
                left.collect_mismatches(found);
                right.collect_mismatches(found);
                return;
            }
            QueryNode::Not(inner) => {
                inner.collect_mismatches(found);
                return;
            }
        };
        if !field.supports(operator) {
            found.push(OperatorMismatch {
                field: field.name,
                operator,
            });
        }
    }
}

/// Prints the query in canonical form: canonical field names, upper-case
/// keywords, and every binary node parenthesised.
impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::MatchAll => Ok(()),
            QueryNode::Comparison { field, op, value } => {
                write!(f, "{} {} {}", field.name, op.symbol(), value)
            }
            QueryNode::Membership {
                field,
                negated,
                values,
            } => {
                let keyword = if *negated { "NOT IN" } else { "IN" };
                write!(f, "{} {} (", field.name, keyword)?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str(")")
            }
            QueryNode::EmptyTest { field, negated } => {
                let keyword = if *negated { "IS NOT EMPTY" } else { "IS EMPTY" };
                write!(f, "{} {}", field.name, keyword)
            }
            QueryNode::And(left, right) => write!(f, "({left} AND {right})"),
            QueryNode::Or(left, right) => write!(f, "({left} OR {right})"),
            QueryNode::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::resolve_field;

    fn field(name: &str) -> &'static FieldDescriptor {
        resolve_field(name).unwrap()
    }

    #[test]
    fn test_relative_date_parse() {
        assert_eq!(
            RelativeDate::parse("-7d"),
            Some(RelativeDate { amount: 7, unit: DateUnit::Day })
        );
        assert_eq!(
            RelativeDate::parse("-12M"),
            Some(RelativeDate { amount: 12, unit: DateUnit::Month })
        );
        assert_eq!(RelativeDate::parse("7d"), None);
        assert_eq!(RelativeDate::parse("-d"), None);
        assert_eq!(RelativeDate::parse("-7x"), None);
    }

    #[test]
    fn test_relative_date_resolves_to_exact_instant() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 15, 30, 0).unwrap();
        let day = RelativeDate { amount: 7, unit: DateUnit::Day };
        assert_eq!(day.resolve(now), Utc.with_ymd_and_hms(2025, 3, 3, 15, 30, 0).unwrap());
        let one_day = RelativeDate { amount: 1, unit: DateUnit::Day };
        assert_eq!(one_day.resolve(now), Utc.with_ymd_and_hms(2025, 3, 9, 15, 30, 0).unwrap());
        let week = RelativeDate { amount: 1, unit: DateUnit::Week };
        assert_eq!(week.resolve(now), Utc.with_ymd_and_hms(2025, 3, 3, 15, 30, 0).unwrap());
        let month = RelativeDate { amount: 3, unit: DateUnit::Month };
        assert_eq!(month.resolve(now), Utc.with_ymd_and_hms(2024, 12, 10, 15, 30, 0).unwrap());
        let year = RelativeDate { amount: 1, unit: DateUnit::Year };
        assert_eq!(year.resolve(now), Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap());
    }

    #[test]
    fn test_huge_relative_date_saturates() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        let far = RelativeDate { amount: u32::MAX, unit: DateUnit::Year };
        assert_eq!(far.resolve(now), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_comp_op_accepts() {
        assert!(CompOp::Gte.accepts(Ordering::Equal));
        assert!(CompOp::Gte.accepts(Ordering::Greater));
        assert!(!CompOp::Gt.accepts(Ordering::Equal));
        assert!(CompOp::NotEq.accepts(Ordering::Less));
        assert_eq!(CompOp::from_symbol("<="), Some(CompOp::Lte));
        assert_eq!(CompOp::from_symbol("=="), None);
    }

    #[test]
    fn test_display_is_canonical() {
        let node = QueryNode::or(
            QueryNode::Comparison {
                field: field("issuetype"),
                op: CompOp::Eq,
                value: Literal::Word("bug".to_string()),
            },
            QueryNode::negate(QueryNode::Membership {
                field: field("label"),
                negated: true,
                values: vec![
                    Literal::String("needs review".to_string()),
                    Literal::Number { value: 3.0, text: "3".to_string() },
                ],
            }),
        );
        assert_eq!(
            node.to_string(),
            r#"(type = bug OR NOT labels NOT IN ("needs review", 3))"#
        );
    }

    #[test]
    fn test_operator_mismatches() {
        let node = QueryNode::and(
            QueryNode::Comparison {
                field: field("type"),
                op: CompOp::Gt,
                value: Literal::Word("bug".to_string()),
            },
            QueryNode::EmptyTest {
                field: field("resolution"),
                negated: false,
            },
        );
        assert_eq!(
            node.operator_mismatches(),
            vec![
                OperatorMismatch { field: "type", operator: Operator::Gt },
                OperatorMismatch { field: "resolution", operator: Operator::IsEmpty },
            ]
        );
        assert!(QueryNode::MatchAll.operator_mismatches().is_empty());
    }
}
