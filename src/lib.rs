//! Ticket query language: tokenizer, parser, evaluator and cursor-aware
//! autocomplete for an advanced-search bar.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use ticket_query::{evaluate, parse, Ticket};
//!
//! let query = parse("priority >= high AND type = bug").unwrap();
//! let ticket = Ticket {
//!     priority: Some("highest".into()),
//!     ticket_type: Some("bug".into()),
//!     ..Ticket::default()
//! };
//! let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
//! assert!(evaluate(&query, &ticket, now));
//! ```

pub mod ast;
pub mod autocomplete;
pub mod config;
pub mod evaluator;
pub mod fields;
pub mod filter;
pub mod lexer;
pub mod parser;
pub mod sql;
pub mod ticket;
pub mod token;

pub use ast::{CompOp, Literal, QueryNode};
pub use autocomplete::{resolve_context, suggest, AutocompleteContext, ContextKind, Suggestion};
pub use config::{ConfigError, ValueCatalog};
pub use evaluator::{evaluate, filter_tickets};
pub use fields::{field_names, operators_for, static_values_for, Operator, ValueKind};
pub use filter::{ActiveFilter, QueryFilter};
pub use lexer::tokenize;
pub use parser::{parse, QueryParseError};
pub use sql::{CompileError, SqlCompiler};
pub use ticket::{Label, Ticket, TicketFields};
pub use token::{Span, Token, TokenKind};
