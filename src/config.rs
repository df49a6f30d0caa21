//! Host-supplied value lists, loaded from JSON or derived from tickets.

use crate::fields::{natural_cmp, DynamicList};
use crate::ticket::Ticket;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The four dynamic value lists used for value suggestions.
///
/// ```json
/// { "statuses": ["To Do", "Done"], "users": ["ada"], "sprints": [], "labels": [] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueCatalog {
    pub statuses: Vec<String>,
    pub users: Vec<String>,
    pub sprints: Vec<String>,
    pub labels: Vec<String>,
}

impl ValueCatalog {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog: ValueCatalog =
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "loaded value catalog");
        Ok(catalog)
    }

    /// Collects the distinct values present on `tickets`. Values are
    /// de-duplicated ignoring case, sprints are in natural order and the
    /// other lists alphabetical.
    pub fn from_tickets(tickets: &[Ticket]) -> Self {
        let statuses = distinct(tickets.iter().filter_map(|t| t.status.as_deref()));
        let users = distinct(
            tickets
                .iter()
                .flat_map(|t| [t.assignee.as_deref(), t.reporter.as_deref()])
                .flatten(),
        );
        let mut sprints = distinct(tickets.iter().filter_map(|t| t.sprint.as_deref()));
        sprints.sort_by(|a, b| natural_cmp(a, b));
        let labels = distinct(
            tickets
                .iter()
                .flat_map(|t| t.labels.iter().map(|label| label.name.as_str())),
        );

        Self {
            statuses,
            users,
            sprints,
            labels,
        }
    }

    pub fn values(&self, list: DynamicList) -> &[String] {
        match list {
            DynamicList::Statuses => &self.statuses,
            DynamicList::Users => &self.users,
            DynamicList::Sprints => &self.sprints,
            DynamicList::Labels => &self.labels,
        }
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out: Vec<String> = values
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .filter(|value| seen.insert(value.to_lowercase()))
        .map(str::to_string)
        .collect();
    out.sort_by_key(|value| value.to_lowercase());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::Label;
    use std::io::Write;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ticket_query_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_load_valid_json_catalog() {
        let path = temp_path("catalog.json");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, r#"{{ "statuses": ["To Do", "Done"], "users": ["ada"] }}"#).unwrap();

        let catalog = ValueCatalog::from_json_file(&path).unwrap();
        assert_eq!(catalog.values(DynamicList::Statuses), ["To Do", "Done"]);
        assert_eq!(catalog.values(DynamicList::Users), ["ada"]);
        assert!(catalog.values(DynamicList::Sprints).is_empty());

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_invalid_json_catalog() {
        let path = temp_path("invalid.json");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "invalid json").unwrap();

        let result = ValueCatalog::from_json_file(&path);
        assert!(matches!(result, Err(ConfigError::Json { .. })));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file() {
        let result = ValueCatalog::from_json_file(temp_path("does_not_exist.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_from_tickets() {
        let tickets = vec![
            Ticket {
                status: Some("Done".to_string()),
                assignee: Some("ada".to_string()),
                reporter: Some("Grace".to_string()),
                sprint: Some("Sprint 10".to_string()),
                labels: vec![Label::new("ui"), Label::new("Backend")],
                ..Ticket::default()
            },
            Ticket {
                status: Some("done".to_string()),
                assignee: Some("Ada".to_string()),
                sprint: Some("Sprint 2".to_string()),
                labels: vec![Label::new("UI")],
                ..Ticket::default()
            },
        ];

        let catalog = ValueCatalog::from_tickets(&tickets);
        assert_eq!(catalog.statuses, ["Done"]);
        assert_eq!(catalog.users, ["ada", "Grace"]);
        assert_eq!(catalog.sprints, ["Sprint 2", "Sprint 10"]);
        assert_eq!(catalog.labels, ["Backend", "ui"]);
    }
}
