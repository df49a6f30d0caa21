//! Ticket records the engine filters, and the field accessor seam.

use crate::fields::{FieldDescriptor, FieldId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A ticket row as supplied by the host.
///
/// Every field is optional on the wire; absent and `null` values read as
/// missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ticket {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(rename = "type")]
    pub ticket_type: Option<String>,
    pub resolution: Option<String>,
    #[serde(alias = "assigneeId")]
    pub assignee: Option<String>,
    #[serde(alias = "reporterId")]
    pub reporter: Option<String>,
    pub sprint: Option<String>,
    pub story_points: Option<f64>,
    pub labels: Vec<Label>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The value of one ticket field, borrowed from the row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Missing,
    Text(&'a str),
    Number(f64),
    Date(DateTime<Utc>),
    List(Vec<&'a str>),
}

impl FieldValue<'_> {
    /// Missing values, blank text and empty lists are empty.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Missing => true,
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Number(_) | FieldValue::Date(_) => false,
        }
    }
}

/// Field access for anything the evaluator can filter.
pub trait TicketFields {
    fn field_value(&self, field: &FieldDescriptor) -> FieldValue<'_>;
}

fn text(value: &Option<String>) -> FieldValue<'_> {
    value.as_deref().map_or(FieldValue::Missing, FieldValue::Text)
}

fn date(value: Option<DateTime<Utc>>) -> FieldValue<'static> {
    value.map_or(FieldValue::Missing, FieldValue::Date)
}

impl TicketFields for Ticket {
    fn field_value(&self, field: &FieldDescriptor) -> FieldValue<'_> {
        match field.id {
            FieldId::Status => text(&self.status),
            FieldId::Priority => text(&self.priority),
            FieldId::Type => text(&self.ticket_type),
            FieldId::Resolution => text(&self.resolution),
            FieldId::Assignee => text(&self.assignee),
            FieldId::Reporter => text(&self.reporter),
            FieldId::Sprint => text(&self.sprint),
            FieldId::StoryPoints => self
                .story_points
                .map_or(FieldValue::Missing, FieldValue::Number),
            FieldId::Labels => {
                FieldValue::List(self.labels.iter().map(|label| label.name.as_str()).collect())
            }
            FieldId::Title => text(&self.title),
            FieldId::Description => text(&self.description),
            FieldId::Created => date(self.created),
            FieldId::Updated => date(self.updated),
            FieldId::DueDate => date(self.due_date),
        }
    }
}

impl<T: TicketFields + ?Sized> TicketFields for &T {
    fn field_value(&self, field: &FieldDescriptor) -> FieldValue<'_> {
        (**self).field_value(field)
    }
}
