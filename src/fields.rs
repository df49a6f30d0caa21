//! Field registry for the ticket query language.
//!
//! Every field a query may reference is described here once: its canonical
//! name, its aliases, the semantic kind of its values and where value
//! suggestions come from. The registry is built on first use and never
//! mutated afterwards.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Semantic type of a field's values. Drives operator narrowing and
/// comparison semantics in the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Closed, unordered value set.
    Enum,
    /// Closed value set with a meaningful order.
    Ordinal,
    Numeric,
    Date,
    /// Collection of values, matched with any-element semantics.
    List,
    /// Free text.
    Text,
}

/// Stable identity of a registered field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldId {
    Status,
    Priority,
    Type,
    Resolution,
    Assignee,
    Reporter,
    Sprint,
    StoryPoints,
    Labels,
    Title,
    Description,
    Created,
    Updated,
    DueDate,
}

/// Value lists the host application supplies at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicList {
    Statuses,
    Users,
    Sprints,
    Labels,
}

/// Where the legal values of a field come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Fixed values known to the engine. For ordinal fields the slice order
    /// is the field's ordering, lowest first.
    Static(&'static [&'static str]),
    /// Values supplied by the host application.
    Dynamic(DynamicList),
    /// Open-ended values (numbers, dates, free text).
    Open,
}

/// The canonical operator set of the query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Operator::Eq,
        Operator::NotEq,
        Operator::Gt,
        Operator::Lt,
        Operator::Gte,
        Operator::Lte,
        Operator::In,
        Operator::NotIn,
        Operator::IsEmpty,
        Operator::IsNotEmpty,
    ];

    /// Surface syntax of the operator as a user types it.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsEmpty => "IS EMPTY",
            Operator::IsNotEmpty => "IS NOT EMPTY",
        }
    }

    /// True for the ordering operators `>`, `<`, `>=`, `<=`.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

const EQUALITY_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::NotEq,
    Operator::In,
    Operator::NotIn,
];

const UNORDERED_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::NotEq,
    Operator::In,
    Operator::NotIn,
    Operator::IsEmpty,
    Operator::IsNotEmpty,
];

const PRIORITIES: &[&str] = &["lowest", "low", "medium", "high", "highest"];
const TICKET_TYPES: &[&str] = &["bug", "task", "story", "epic", "subtask"];
const RESOLUTIONS: &[&str] = &["done", "fixed", "won't fix", "duplicate", "cannot reproduce"];

/// Description of one queryable field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub id: FieldId,
    /// Canonical name, as shown in suggestions.
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub kind: ValueKind,
    pub values: ValueSource,
}

impl FieldDescriptor {
    const fn new(id: FieldId, name: &'static str, kind: ValueKind) -> Self {
        Self {
            id,
            name,
            aliases: &[],
            kind,
            values: ValueSource::Open,
        }
    }

    const fn aliased(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    const fn with_values(mut self, values: &'static [&'static str]) -> Self {
        self.values = ValueSource::Static(values);
        self
    }

    const fn dynamic(mut self, list: DynamicList) -> Self {
        self.values = ValueSource::Dynamic(list);
        self
    }

    /// Static values for this field, empty when values are dynamic or open.
    pub fn static_values(&self) -> &'static [&'static str] {
        match self.values {
            ValueSource::Static(values) => values,
            ValueSource::Dynamic(_) | ValueSource::Open => &[],
        }
    }

    /// Operators offered for this field. Advisory only: the parser accepts
    /// any operator and the evaluator resolves mismatches to no-match.
    pub fn operators(&self) -> &'static [Operator] {
        match self.kind {
            ValueKind::Enum => EQUALITY_OPERATORS,
            ValueKind::Ordinal | ValueKind::Numeric | ValueKind::Date => &Operator::ALL,
            ValueKind::List | ValueKind::Text => UNORDERED_OPERATORS,
        }
    }

    pub fn supports(&self, operator: Operator) -> bool {
        self.operators().contains(&operator)
    }

    /// Orders two values of an ordinal field.
    ///
    /// Fields with a static value table use the table's order and return
    /// `None` when either value is not in it. Fields with dynamic values
    /// (sprints) use natural order, so `Sprint 2` sorts before `Sprint 10`.
    pub fn compare_ordinal(&self, left: &str, right: &str) -> Option<Ordering> {
        match self.values {
            ValueSource::Static(table) => {
                let rank = |value: &str| {
                    table
                        .iter()
                        .position(|candidate| candidate.eq_ignore_ascii_case(value.trim()))
                };
                Some(rank(left)?.cmp(&rank(right)?))
            }
            ValueSource::Dynamic(_) | ValueSource::Open => Some(natural_cmp(left, right)),
        }
    }

    /// Every name this field answers to, canonical name first.
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

/// Compares strings case-insensitively, treating a trailing run of digits
/// as a number.
pub(crate) fn natural_cmp(left: &str, right: &str) -> Ordering {
    fn split(value: &str) -> (String, Option<u64>) {
        let trimmed = value.trim();
        let digits_at = trimmed
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(idx, _)| idx);
        match digits_at {
            Some(idx) => (
                trimmed[..idx].trim_end().to_lowercase(),
                trimmed[idx..].parse().ok(),
            ),
            None => (trimmed.to_lowercase(), None),
        }
    }

    let (left_stem, left_number) = split(left);
    let (right_stem, right_number) = split(right);
    match (left_number, right_number) {
        (Some(a), Some(b)) if left_stem == right_stem => a.cmp(&b),
        _ => left.trim().to_lowercase().cmp(&right.trim().to_lowercase()),
    }
}

const FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new(FieldId::Status, "status", ValueKind::Enum)
        .dynamic(DynamicList::Statuses),
    FieldDescriptor::new(FieldId::Priority, "priority", ValueKind::Ordinal)
        .with_values(PRIORITIES),
    FieldDescriptor::new(FieldId::Type, "type", ValueKind::Enum)
        .aliased(&["issuetype"])
        .with_values(TICKET_TYPES),
    FieldDescriptor::new(FieldId::Resolution, "resolution", ValueKind::Enum)
        .with_values(RESOLUTIONS),
    FieldDescriptor::new(FieldId::Assignee, "assignee", ValueKind::Text)
        .dynamic(DynamicList::Users),
    FieldDescriptor::new(FieldId::Reporter, "reporter", ValueKind::Text)
        .dynamic(DynamicList::Users),
    FieldDescriptor::new(FieldId::Sprint, "sprint", ValueKind::Ordinal)
        .dynamic(DynamicList::Sprints),
    FieldDescriptor::new(FieldId::StoryPoints, "storyPoints", ValueKind::Numeric)
        .aliased(&["points"]),
    FieldDescriptor::new(FieldId::Labels, "labels", ValueKind::List)
        .aliased(&["label"])
        .dynamic(DynamicList::Labels),
    FieldDescriptor::new(FieldId::Title, "title", ValueKind::Text).aliased(&["summary"]),
    FieldDescriptor::new(FieldId::Description, "description", ValueKind::Text),
    FieldDescriptor::new(FieldId::Created, "created", ValueKind::Date),
    FieldDescriptor::new(FieldId::Updated, "updated", ValueKind::Date),
    FieldDescriptor::new(FieldId::DueDate, "dueDate", ValueKind::Date).aliased(&["due"]),
];

/// The process-wide field registry.
pub static REGISTRY: LazyLock<FieldRegistry> = LazyLock::new(|| FieldRegistry::new(FIELDS));

/// Immutable table of field descriptors with case-insensitive name and
/// alias lookup.
pub struct FieldRegistry {
    fields: &'static [FieldDescriptor],
    by_name: HashMap<String, usize>,
}

impl FieldRegistry {
    fn new(fields: &'static [FieldDescriptor]) -> Self {
        let mut by_name = HashMap::new();
        for (index, field) in fields.iter().enumerate() {
            for name in field.names() {
                let previous = by_name.insert(name.to_ascii_lowercase(), index);
                debug_assert!(previous.is_none(), "duplicate field name `{name}`");
            }
        }
        Self { fields, by_name }
    }

    /// Resolves a field name or alias, ignoring ASCII case.
    pub fn resolve(&self, name: &str) -> Option<&'static FieldDescriptor> {
        let fields = self.fields;
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&index| &fields[index])
    }

    pub fn get(&self, id: FieldId) -> &'static FieldDescriptor {
        let fields = self.fields;
        fields
            .iter()
            .find(|field| field.id == id)
            .unwrap_or(&fields[0])
    }

    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.fields
    }

    /// Canonical field names in registry order.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> {
        let fields = self.fields;
        fields.iter().map(|field| field.name)
    }
}

/// Canonical names of every registered field.
pub fn field_names() -> Vec<&'static str> {
    REGISTRY.field_names().collect()
}

pub fn resolve_field(name: &str) -> Option<&'static FieldDescriptor> {
    REGISTRY.resolve(name)
}

/// Static values of a field; empty for unknown fields and fields whose
/// values are dynamic or open.
pub fn static_values_for(field: &str) -> &'static [&'static str] {
    resolve_field(field)
        .map(FieldDescriptor::static_values)
        .unwrap_or_default()
}

/// Operators offered for a field; empty for unknown fields.
pub fn operators_for(field: &str) -> &'static [Operator] {
    resolve_field(field)
        .map(FieldDescriptor::operators)
        .unwrap_or_default()
}
