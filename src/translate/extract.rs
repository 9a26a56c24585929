//! Pull a Cypher statement out of a model reply

use crate::cypher::{leading_keyword, tokenize, LEADING_KEYWORDS};
use regex::Regex;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```[ \t]*(?:cypher|cql|neo4j|sql)?[ \t]*\r?\n?(.*?)```")
        .expect("fenced block regex")
});

static LEADING_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:cypher\s+query|cypher|query)\s*:\s*")
        .expect("label regex")
});

/// Extract the Cypher statement from a model reply.
///
/// Prefers the first non-empty fenced code block. Otherwise strips a
/// `Cypher:`/`Query:` label and any prose lines before the first line that
/// starts with a clause keyword. Trailing semicolons are dropped. Returns
/// `None` when nothing is left.
pub fn extract_cypher(reply: &str) -> Option<String> {
    let mut blocks = FENCED_BLOCK
        .captures_iter(reply)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .peekable();
    let body = if blocks.peek().is_some() {
        // fences present but all empty means the model produced nothing
        blocks.find(|s| !s.is_empty())?
    } else {
        reply
    };

    let body = LEADING_LABEL.replace(body, "");
    let body = skip_prose(&body);

    let cypher = body.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if cypher.is_empty() {
        None
    } else {
        Some(cypher.to_string())
    }
}

fn starts_with_clause(line: &str) -> bool {
    tokenize(line)
        .ok()
        .and_then(|tokens| leading_keyword(&tokens))
        .map(|kw| LEADING_KEYWORDS.contains(&kw.as_str()))
        .unwrap_or(false)
}

fn skip_prose(body: &str) -> &str {
    if starts_with_clause(body) {
        return body;
    }
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if starts_with_clause(line) {
            return &body[offset..];
        }
        offset += line.len();
    }
    body
}
