//! Property tests for the read-only policy.

use neo4j_chat::cypher::{classify_intent, tokenize, QueryIntent, WRITE_KEYWORDS};
use neo4j_chat::translate::CandidateQuery;
use neo4j_chat::validate::{validate, ValidationPolicy};
use proptest::prelude::*;

fn write_keyword() -> impl Strategy<Value = String> {
    (prop::sample::select(WRITE_KEYWORDS), any::<u64>()).prop_map(|(kw, mask)| {
        // random letter casing; keywords are case-insensitive
        kw.chars()
            .enumerate()
            .map(|(i, c)| {
                if mask >> (i % 64) & 1 == 1 {
                    c.to_ascii_lowercase()
                } else {
                    c
                }
            })
            .collect()
    })
}

fn identifier() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,10}"
}

/// A plausible statement with a write clause somewhere after a read prefix.
fn write_statement() -> impl Strategy<Value = String> {
    (
        identifier(),
        identifier(),
        write_keyword(),
        prop::option::of("RETURN [a-z]{1,5}"),
    )
        .prop_map(|(label, prop, kw, tail)| {
            let body = match kw.to_ascii_uppercase().as_str() {
                "SET" => format!("{kw} n.{prop} = 1"),
                "REMOVE" => format!("{kw} n.{prop}"),
                "DETACH" => format!("{kw} DELETE n"),
                "DELETE" => format!("{kw} n"),
                "LOAD" => format!("{kw} CSV FROM 'file:///x.csv' AS row"),
                "FOREACH" => format!("{kw} (x IN [1] | SET n.{prop} = x)"),
                "DROP" => format!("{kw} INDEX {prop}"),
                _ => format!("{kw} (:{label} {{{prop}: 1}})"),
            };
            match tail {
                Some(tail) => format!("MATCH (n:{label}) {body} {tail}"),
                None => format!("MATCH (n:{label}) {body}"),
            }
        })
}

proptest! {
    #[test]
    fn write_statements_never_pass_read_only(cypher in write_statement()) {
        let candidate = CandidateQuery::new(cypher.clone());
        prop_assert_eq!(candidate.intent, QueryIntent::Write, "intent of {}", cypher);
        let verdict = validate(&candidate, &ValidationPolicy::read_only());
        prop_assert!(!verdict.accepted, "accepted {}", cypher);
    }

    #[test]
    fn derived_write_intent_is_always_rejected(cypher in "\\PC{0,80}") {
        let candidate = CandidateQuery::new(cypher.clone());
        if classify_intent(&cypher) == QueryIntent::Write {
            let verdict = validate(&candidate, &ValidationPolicy::read_only());
            prop_assert!(!verdict.accepted, "accepted {}", cypher);
        }
    }

    #[test]
    fn declared_write_is_rejected_whatever_the_text(cypher in "MATCH \\(n\\) RETURN n[a-z ]{0,20}") {
        let candidate = CandidateQuery {
            cypher,
            intent: QueryIntent::Write,
        };
        prop_assert!(!validate(&candidate, &ValidationPolicy::read_only()).accepted);
    }

    #[test]
    fn tokenizer_never_panics(src in "\\PC{0,120}") {
        let _ = tokenize(&src);
    }
}
