use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use ticket_query::token::TokenClass;
use ticket_query::{
    parse, resolve_context, suggest, tokenize, ActiveFilter, QueryParseError, SqlCompiler,
    Suggestion, Ticket, ValueCatalog,
};
use tracing_subscriber::EnvFilter;

/// Filter a ticket export with the ticket query language.
#[derive(Debug, Parser)]
#[command(name = "ticket-query", version, about)]
struct Args {
    /// JSON array of tickets to filter
    #[arg(long, value_name = "FILE")]
    tickets: Option<PathBuf>,

    /// JSON file with the status, user, sprint and label lists used for
    /// value completion. Derived from the tickets when omitted.
    #[arg(long, value_name = "FILE")]
    values: Option<PathBuf>,

    /// Evaluation time for relative dates (RFC 3339). Defaults to the
    /// current time.
    #[arg(long, value_name = "TIMESTAMP")]
    now: Option<DateTime<Utc>>,

    /// Run a single query and exit instead of starting the prompt
    query: Option<String>,
}

fn main() -> Result<()> {
    install_tracing();
    let args = Args::parse();

    let tickets = match &args.tickets {
        Some(path) => load_tickets(path)?,
        None => Vec::new(),
    };
    let catalog = match &args.values {
        Some(path) => ValueCatalog::from_json_file(path)?,
        None => ValueCatalog::from_tickets(&tickets),
    };
    let now = || args.now.unwrap_or_else(Utc::now);

    if let Some(query) = &args.query {
        let node = parse(query).map_err(|err| anyhow::anyhow!(render_error(query, &err)))?;
        for warning in node.operator_mismatches() {
            eprintln!("warning: {warning}");
        }
        print_tickets(&ticket_query::filter_tickets(&node, &tickets, now()));
        return Ok(());
    }

    repl(&tickets, catalog, now)
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn load_tickets(path: &Path) -> Result<Vec<Ticket>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read tickets from {}", path.display()))?;
    let tickets: Vec<Ticket> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse tickets in {}", path.display()))?;
    tracing::info!(count = tickets.len(), "loaded tickets");
    Ok(tickets)
}

const HELP: &str = "\
Enter a query to filter the loaded tickets, e.g.
  priority >= high AND type = bug
  labels IN (frontend, \"needs review\") AND created > -14d
  assignee IS EMPTY OR NOT status = done

Commands:
  :tokens <query>   show the token stream
  :ast <query>      show the parsed query in canonical form
  :sql <query>      show the PostgreSQL translation
  :clear            drop the active filter
  :help             show this help
  :quit             exit

Press TAB to complete fields, operators and values.";

fn repl(tickets: &[Ticket], catalog: ValueCatalog, now: impl Fn() -> DateTime<Utc>) -> Result<()> {
    let mut editor: Editor<QueryHelper, DefaultHistory> =
        Editor::new().context("failed to start line editor")?;
    editor.set_helper(Some(QueryHelper { catalog }));

    let mut active = ActiveFilter::new();
    println!("{} tickets loaded. Type :help for help.", tickets.len());

    loop {
        let line = match editor.readline("query> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("failed to read input"),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            ":quit" | ":q" => break,
            ":help" => println!("{HELP}"),
            ":clear" => {
                active.clear();
                print_tickets(&active.filter(tickets, now()));
            }
            ":tokens" => {
                for token in tokenize(rest) {
                    println!("{:>3}..{:<3} {:<13} {}", token.start(), token.end(), token.kind, token.text);
                }
            }
            ":ast" => match parse(rest) {
                Ok(node) => println!("{node}"),
                Err(err) => println!("{}", render_error(rest, &err)),
            },
            ":sql" => {
                if let Err(err) = print_sql(rest, now()) {
                    println!("{err}");
                }
            }
            _ if command.starts_with(':') => println!("unknown command {command}, try :help"),
            _ => match active.apply(line) {
                Ok(filter) => {
                    for warning in filter.warnings() {
                        println!("warning: {warning}");
                    }
                    print_tickets(&active.filter(tickets, now()));
                }
                Err(err) => {
                    println!("{}", render_error(line, &err));
                    println!(
                        "keeping previous filter ({} tickets)",
                        active.filter(tickets, now()).len()
                    );
                }
            },
        }
    }

    Ok(())
}

fn print_sql(query: &str, now: DateTime<Utc>) -> Result<()> {
    let node = match parse(query) {
        Ok(node) => node,
        Err(err) => bail!(render_error(query, &err)),
    };
    let sql = SqlCompiler::new("tickets").compile(&node, now)?;
    println!("{sql}");
    Ok(())
}

/// Renders a parse error with a caret under the offending offset.
fn render_error(query: &str, err: &QueryParseError) -> String {
    match err.position {
        Some(position) => {
            let column = query.get(..position).map_or(0, |head| head.chars().count());
            format!("{query}\n{}^\nerror: {}", " ".repeat(column), err.message)
        }
        None => format!("error: {}", err.message),
    }
}

fn print_tickets(tickets: &[&Ticket]) {
    for ticket in tickets {
        println!(
            "{:<10} {:<8} {:<12} {:<8} {}",
            ticket.id.as_deref().unwrap_or("-"),
            ticket.ticket_type.as_deref().unwrap_or("-"),
            ticket.status.as_deref().unwrap_or("-"),
            ticket.priority.as_deref().unwrap_or("-"),
            ticket.title.as_deref().unwrap_or(""),
        );
    }
    println!("({} tickets)", tickets.len());
}

struct QueryHelper {
    catalog: ValueCatalog,
}

impl Completer for QueryHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let Some(context) = resolve_context(line, pos) else {
            return Ok((pos, Vec::new()));
        };
        let candidates = suggest(&context, &self.catalog)
            .into_iter()
            .map(|suggestion| Pair {
                display: suggestion.label,
                replacement: suggestion.replacement,
            })
            .collect();
        Ok((context.position, candidates))
    }
}

impl Hinter for QueryHelper {
    type Hint = String;

    /// Shows the rest of the only matching suggestion.
    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        if pos < line.len() {
            return None;
        }
        let context = resolve_context(line, pos)?;
        if context.partial.is_empty() {
            return None;
        }
        let [only]: [Suggestion; 1] = suggest(&context, &self.catalog).try_into().ok()?;
        let head = only.replacement.get(..context.partial.len())?;
        if !head.eq_ignore_ascii_case(&context.partial) {
            return None;
        }
        only.replacement
            .get(context.partial.len()..)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }
}

impl Highlighter for QueryHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut out = String::with_capacity(line.len() * 2);
        let mut last = 0;
        for token in tokenize(line) {
            out.push_str(&line[last..token.start()]);
            let text = &line[token.start()..token.end()];
            match colour(token.kind.class()) {
                Some(code) => out.push_str(&format!("\x1b[{code}m{text}\x1b[0m")),
                None => out.push_str(text),
            }
            last = token.end();
        }
        out.push_str(&line[last..]);
        Cow::Owned(out)
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[2m{hint}\x1b[0m"))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn colour(class: TokenClass) -> Option<&'static str> {
    match class {
        TokenClass::Field => Some("36"),
        TokenClass::Operator => Some("33"),
        TokenClass::Keyword => Some("1;35"),
        TokenClass::Literal => Some("32"),
        TokenClass::Error => Some("4;31"),
        TokenClass::Punctuation | TokenClass::Plain => None,
    }
}

impl Validator for QueryHelper {}

impl Helper for QueryHelper {}
