//! Compiled query filters.
//!
//! [`ActiveFilter`] holds the filter the host is currently applying. A
//! query that fails to parse is reported but never replaces the filter in
//! effect, so a typo in the query bar cannot blank the ticket list.

use crate::ast::{OperatorMismatch, QueryNode};
use crate::evaluator::{evaluate, filter_tickets};
use crate::parser::{parse, QueryParseError};
use crate::ticket::TicketFields;
use chrono::{DateTime, Utc};

/// A parsed query ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    source: String,
    node: QueryNode,
}

impl QueryFilter {
    pub fn parse(query: &str) -> Result<Self, QueryParseError> {
        let node = parse(query)?;
        Ok(Self {
            source: query.to_string(),
            node,
        })
    }

    /// The filter that matches every ticket.
    pub fn match_all() -> Self {
        Self {
            source: String::new(),
            node: QueryNode::MatchAll,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn node(&self) -> &QueryNode {
        &self.node
    }

    pub fn matches<T: TicketFields + ?Sized>(&self, ticket: &T, now: DateTime<Utc>) -> bool {
        evaluate(&self.node, ticket, now)
    }

    pub fn filter_tickets<'a, T: TicketFields>(
        &self,
        tickets: &'a [T],
        now: DateTime<Utc>,
    ) -> Vec<&'a T> {
        filter_tickets(&self.node, tickets, now)
    }

    /// Predicates that use an operator their field does not offer.
    pub fn warnings(&self) -> Vec<OperatorMismatch> {
        self.node.operator_mismatches()
    }
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self::match_all()
    }
}

/// The last query that parsed successfully.
#[derive(Debug, Clone, Default)]
pub struct ActiveFilter {
    current: QueryFilter,
}

impl ActiveFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `query` and makes it the active filter. On a syntax error the
    /// previous filter stays active and the error is returned.
    pub fn apply(&mut self, query: &str) -> Result<&QueryFilter, QueryParseError> {
        match QueryFilter::parse(query) {
            Ok(filter) => {
                self.current = filter;
                Ok(&self.current)
            }
            Err(err) => {
                tracing::debug!(
                    kept = %self.current.source(),
                    "query rejected, keeping previous filter"
                );
                Err(err)
            }
        }
    }

    /// Reverts to matching every ticket.
    pub fn clear(&mut self) {
        self.current = QueryFilter::match_all();
    }

    pub fn current(&self) -> &QueryFilter {
        &self.current
    }

    pub fn filter<'a, T: TicketFields>(&self, tickets: &'a [T], now: DateTime<Utc>) -> Vec<&'a T> {
        self.current.filter_tickets(tickets, now)
    }
}
