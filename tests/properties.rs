//! Property tests for the tokenizer, parser, evaluator and context resolver.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use ticket_query::fields::REGISTRY;
use ticket_query::{
    evaluate, field_names, operators_for, parse, resolve_context, tokenize, Operator, Ticket,
    TokenKind, ValueKind,
};

fn query_chars() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 =!<>(),\"\\-_.]{0,48}",
        "\\PC{0,32}",
    ]
}

fn predicate() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "type = bug",
        "type != task",
        "priority >= high",
        "priority < medium",
        "points > 3",
        "storyPoints <= 8.5",
        "status = \"In Progress\"",
        "labels IN (frontend, \"needs review\")",
        "label NOT IN (backend)",
        "assignee IS EMPTY",
        "dueDate IS NOT EMPTY",
        "created > -7d",
        "updated <= 2024-12-31",
        "title = login",
        "type > bug",
    ])
    .prop_map(str::to_string)
}

fn query() -> impl Strategy<Value = String> {
    predicate().prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("{l} AND {r}")),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("{l} OR {r}")),
            inner.clone().prop_map(|q| format!("NOT ({q})")),
            inner.prop_map(|q| format!("({q})")),
        ]
    })
}

fn arb_ticket() -> impl Strategy<Value = Ticket> {
    (
        prop::option::of(prop::sample::select(vec!["bug", "task", "story"])),
        prop::option::of(prop::sample::select(vec!["lowest", "medium", "high", "highest"])),
        prop::option::of(0u8..13),
        prop::collection::vec(prop::sample::select(vec!["frontend", "backend", "needs review"]), 0..3),
        prop::option::of(0i64..60),
    )
        .prop_map(|(kind, priority, points, labels, age_days)| {
            let base = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
            Ticket {
                ticket_type: kind.map(str::to_string),
                priority: priority.map(str::to_string),
                story_points: points.map(f64::from),
                labels: labels.into_iter().map(ticket_query::Label::new).collect(),
                created: age_days.map(|days| base - Duration::days(days)),
                ..Ticket::default()
            }
        })
}

proptest! {
    #[test]
    fn spans_reproduce_source(source in query_chars()) {
        let tokens = tokenize(&source);
        let eof = tokens.last().unwrap();
        prop_assert_eq!(eof.kind, TokenKind::Eof);
        prop_assert_eq!((eof.start(), eof.end()), (source.len(), source.len()));

        let mut rebuilt = String::new();
        let mut last = 0;
        for token in &tokens {
            prop_assert!(token.start() >= last);
            let gap = &source[last..token.start()];
            prop_assert!(gap.chars().all(char::is_whitespace), "gap {:?}", gap);
            rebuilt.push_str(gap);
            prop_assert_eq!(&source[token.start()..token.end()], token.text.as_str());
            rebuilt.push_str(&token.text);
            last = token.end();
        }
        prop_assert_eq!(rebuilt, source);
    }

    #[test]
    fn parser_and_resolver_never_panic(source in query_chars(), extra in 0usize..4) {
        let _ = parse(&source);
        for cursor in 0..=source.len() + extra {
            let _ = resolve_context(&source, cursor);
        }
    }

    #[test]
    fn canonical_form_reparses_to_same_tree(source in query()) {
        let node = parse(&source).unwrap();
        let printed = node.to_string();
        prop_assert_eq!(parse(&printed).unwrap(), node);
    }

    #[test]
    fn and_binds_tighter_than_or(a in predicate(), b in predicate(), c in predicate(), ticket in arb_ticket()) {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 18, 0, 0).unwrap();
        let implicit = parse(&format!("{a} OR {b} AND {c}")).unwrap();
        let grouped = parse(&format!("{a} OR ({b} AND {c})")).unwrap();
        prop_assert_eq!(evaluate(&implicit, &ticket, now), evaluate(&grouped, &ticket, now));
    }

    #[test]
    fn not_inverts(source in query(), ticket in arb_ticket()) {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 18, 0, 0).unwrap();
        let node = parse(&source).unwrap();
        let negated = parse(&format!("NOT ({source})")).unwrap();
        prop_assert_eq!(evaluate(&node, &ticket, now), !evaluate(&negated, &ticket, now));
    }

    #[test]
    fn relative_dates_follow_now(seconds_into_day in 0i64..86_400, day in 0i64..3_650) {
        let first = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap()
            + Duration::days(day)
            + Duration::seconds(seconds_into_day);
        let ticket = Ticket {
            created: Some(first - Duration::days(7) + Duration::seconds(1)),
            ..Ticket::default()
        };
        let node = parse("created > -7d").unwrap();
        prop_assert!(evaluate(&node, &ticket, first));
        let later = first + Duration::days(7) + Duration::seconds(1);
        prop_assert!(!evaluate(&node, &ticket, later));
    }
}

#[test]
fn operator_table_is_closed() {
    for name in field_names() {
        let operators = operators_for(name);
        assert!(!operators.is_empty(), "{name} offers no operators");
        assert!(operators.iter().all(|op| Operator::ALL.contains(op)));

        let field = REGISTRY.resolve(name).unwrap();
        if field.kind == ValueKind::Enum {
            assert!(!operators.iter().any(|op| op.is_comparison()), "{name}");
        }
    }
}
