//! Operations refused regardless of the write policy

use crate::cypher::{is_keyword_position, procedure_calls, Token, TokenKind};
use std::collections::HashSet;

/// Procedure prefixes that are never allowed (lowercased).
const DENIED_PROCEDURES: &[&str] = &[
    "dbms.",
    "apoc.periodic.",
    "apoc.schema.assert",
    "apoc.trigger.",
    "apoc.load.",
    "apoc.import.",
    "apoc.export.",
];

/// Words that may sit between `CREATE` and a schema object kind.
const SCHEMA_MODIFIERS: &[&str] = &[
    "OR", "REPLACE", "UNIQUE", "FULLTEXT", "RANGE", "TEXT", "POINT", "VECTOR", "LOOKUP", "BTREE",
    "COMPOSITE",
];

const SCHEMA_OBJECTS: &[&str] = &["INDEX", "CONSTRAINT", "DATABASE", "ALIAS", "USER", "ROLE"];

/// First denylisted operation in the statement, as a rejection reason.
pub fn check(tokens: &[Token<'_>]) -> Option<String> {
    if is_schema_command(tokens) {
        return Some("denylist: schema or administration command".to_string());
    }

    if let Some(proc_name) = procedure_calls(tokens)
        .into_iter()
        .find(|p| DENIED_PROCEDURES.iter().any(|d| p.starts_with(d)))
    {
        return Some(format!("denylist: procedure {proc_name} is not allowed"));
    }

    if keyword_at(tokens, "LOAD").into_iter().any(|i| next_word_is(tokens, i, "CSV")) {
        return Some("denylist: LOAD CSV is not allowed".to_string());
    }

    unscoped_delete(tokens)
}

fn keyword_at(tokens: &[Token<'_>], keyword: &str) -> Vec<usize> {
    tokens
        .iter()
        .enumerate()
        .filter(|(i, t)| t.is_word(keyword) && is_keyword_position(tokens, *i))
        .map(|(i, _)| i)
        .collect()
}

fn next_word_is(tokens: &[Token<'_>], idx: usize, word: &str) -> bool {
    tokens.get(idx + 1).map(|t| t.is_word(word)).unwrap_or(false)
}

fn is_schema_command(tokens: &[Token<'_>]) -> bool {
    for word in ["DROP", "GRANT", "REVOKE", "DENY", "ALTER"] {
        if !keyword_at(tokens, word).is_empty() {
            return true;
        }
    }
    keyword_at(tokens, "CREATE").into_iter().any(|i| {
        tokens[i + 1..]
            .iter()
            .take_while(|t| t.kind == TokenKind::Word)
            .map(|t| t.text.to_ascii_uppercase())
            .skip_while(|w| SCHEMA_MODIFIERS.contains(&w.as_str()))
            .next()
            .map(|w| SCHEMA_OBJECTS.contains(&w.as_str()))
            .unwrap_or(false)
    })
}

/// Keywords after which `(` opens a node pattern rather than an expression.
const PATTERN_KEYWORDS: &[&str] = &["MATCH", "MERGE", "CREATE", "WHERE", "AND", "OR", "XOR", "NOT"];

/// Keywords that end a WHERE predicate or a DELETE target list.
const CLAUSE_KEYWORDS: &[&str] = &[
    "MATCH", "OPTIONAL", "WITH", "RETURN", "UNWIND", "CALL", "CREATE", "MERGE", "SET", "REMOVE",
    "DELETE", "DETACH", "FOREACH", "ORDER", "SKIP", "LIMIT", "UNION", "YIELD",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    Node,
    Relationship,
}

/// One `(...)` or `-[...]` pattern element.
#[derive(Debug)]
struct Element<'a> {
    kind: ElementKind,
    var: Option<&'a str>,
    start: usize,
    end: usize,
    constrained: bool,
}

/// Every DELETE target must be a variable bound to a pattern that something
/// narrows: a label or type, a property map, an inline WHERE, a constrained
/// element elsewhere in the same chain, or a mention in a WHERE predicate.
/// Targets bound any other way (`UNWIND`, `WITH ... AS`, `FOREACH`) or given
/// as expressions are refused.
fn unscoped_delete(tokens: &[Token<'_>]) -> Option<String> {
    let targets: Vec<&[Token<'_>]> = keyword_at(tokens, "DELETE")
        .into_iter()
        .flat_map(|i| delete_targets(tokens, i))
        .collect();
    if targets.is_empty() {
        return None;
    }

    let elements = pattern_elements(tokens);
    let chains = chains(tokens, &elements);

    let mut scoped = where_mentions(tokens);
    for chain in &chains {
        if chain.iter().any(|&e| elements[e].constrained) {
            scoped.extend(chain.iter().filter_map(|&e| elements[e].var));
        }
    }
    let mut paths = HashSet::new();
    for (var, constrained) in path_variables(tokens, &elements, &chains) {
        if constrained {
            scoped.insert(var);
        }
        paths.insert(var);
    }

    for target in targets {
        let target = strip_parens(target);
        let [single] = target else {
            return Some("denylist: delete target is not a plain variable".to_string());
        };
        if !is_variable(single) {
            return Some("denylist: delete target is not a plain variable".to_string());
        }
        let var = variable_name(single);
        if scoped.contains(var) {
            continue;
        }
        let bound_as =
            |kind: ElementKind| elements.iter().any(|e| e.kind == kind && e.var == Some(var));
        if bound_as(ElementKind::Node) || paths.contains(var) {
            return Some("denylist: unscoped delete of all nodes".to_string());
        }
        if bound_as(ElementKind::Relationship) {
            return Some("denylist: unscoped delete of all relationships".to_string());
        }
        return Some(format!(
            "denylist: delete target {var} is not bound to a scoped pattern"
        ));
    }
    None
}

fn opens(t: &Token<'_>) -> bool {
    t.is_punct('(') || t.is_punct('[') || t.is_punct('{')
}

fn closes(t: &Token<'_>) -> bool {
    t.is_punct(')') || t.is_punct(']') || t.is_punct('}')
}

fn is_variable(t: &Token<'_>) -> bool {
    (t.kind == TokenKind::Word && !t.is_word("WHERE")) || t.kind == TokenKind::QuotedIdentifier
}

fn variable_name<'a>(t: &Token<'a>) -> &'a str {
    t.text.trim_matches('`')
}

fn is_clause_keyword(tokens: &[Token<'_>], idx: usize) -> bool {
    is_keyword_position(tokens, idx) && CLAUSE_KEYWORDS.iter().any(|k| tokens[idx].is_word(k))
}

/// Index of the bracket closing the one at `open`.
fn matching_close(tokens: &[Token<'_>], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, t) in tokens.iter().enumerate().skip(open) {
        if opens(t) {
            depth += 1;
        } else if closes(t) {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Comma-separated items after a `DELETE`, up to the next clause.
fn delete_targets<'a, 't>(tokens: &'t [Token<'a>], delete_idx: usize) -> Vec<&'t [Token<'a>]> {
    let mut targets = Vec::new();
    let mut start = delete_idx + 1;
    let mut end = tokens.len();
    let mut depth = 0usize;
    for (j, t) in tokens.iter().enumerate().skip(start) {
        if opens(t) {
            depth += 1;
        } else if closes(t) {
            // closing a FOREACH body
            let Some(d) = depth.checked_sub(1) else {
                end = j;
                break;
            };
            depth = d;
        } else if depth == 0 && t.is_punct(',') {
            targets.push(&tokens[start..j]);
            start = j + 1;
        } else if depth == 0 && is_clause_keyword(tokens, j) {
            end = j;
            break;
        }
    }
    if start < end {
        targets.push(&tokens[start..end]);
    }
    targets
}

fn strip_parens<'a, 't>(mut item: &'t [Token<'a>]) -> &'t [Token<'a>] {
    while item.len() >= 2
        && item[0].is_punct('(')
        && matching_close(item, 0) == Some(item.len() - 1)
    {
        item = &item[1..item.len() - 1];
    }
    item
}

fn opens_node(tokens: &[Token<'_>], idx: usize) -> bool {
    match idx.checked_sub(1).map(|p| (p, &tokens[p])) {
        None => true,
        Some((p, prev)) if prev.kind == TokenKind::Word => {
            is_keyword_position(tokens, p) && PATTERN_KEYWORDS.iter().any(|k| prev.is_word(k))
        }
        Some((_, prev)) => prev.kind == TokenKind::Punct,
    }
}

fn pattern_elements<'a>(tokens: &[Token<'a>]) -> Vec<Element<'a>> {
    let mut elements = Vec::new();
    for (i, t) in tokens.iter().enumerate() {
        let kind = if t.is_punct('(') && opens_node(tokens, i) {
            ElementKind::Node
        } else if t.is_punct('[') && i > 0 && tokens[i - 1].is_punct('-') {
            ElementKind::Relationship
        } else {
            continue;
        };
        let Some(end) = matching_close(tokens, i) else {
            continue;
        };
        let inner = &tokens[i + 1..end];
        let (var, rest) = match inner.first() {
            Some(v) if is_variable(v) => (Some(variable_name(v)), &inner[1..]),
            _ => (None, inner),
        };
        let shaped = match rest.first() {
            None => true,
            Some(n) => {
                n.is_punct(':')
                    || n.is_punct('{')
                    || n.is_word("WHERE")
                    || (kind == ElementKind::Relationship && n.is_punct('*'))
            }
        };
        if !shaped {
            continue;
        }
        elements.push(Element {
            kind,
            var,
            start: i,
            end,
            constrained: is_constrained(rest),
        });
    }
    elements
}

/// A label, type, property map or WHERE directly inside the element.
fn is_constrained(inner: &[Token<'_>]) -> bool {
    let mut depth = 0usize;
    for t in inner {
        if depth == 0 && (t.is_punct(':') || t.is_punct('{') || t.is_word("WHERE")) {
            return true;
        }
        if opens(t) {
            depth += 1;
        } else if closes(t) {
            depth = depth.saturating_sub(1);
        }
    }
    false
}

/// Groups of element indices joined only by `-`, `<` and `>`.
fn chains(tokens: &[Token<'_>], elements: &[Element<'_>]) -> Vec<Vec<usize>> {
    let mut chains: Vec<Vec<usize>> = Vec::new();
    for (idx, el) in elements.iter().enumerate() {
        let linked = idx
            .checked_sub(1)
            .map(|p| &elements[p])
            .filter(|prev| el.start > prev.end + 1)
            .map(|prev| {
                tokens[prev.end + 1..el.start]
                    .iter()
                    .all(|t| t.is_punct('-') || t.is_punct('<') || t.is_punct('>'))
            })
            .unwrap_or(false);
        if linked {
            if let Some(chain) = chains.last_mut() {
                chain.push(idx);
                continue;
            }
        }
        chains.push(vec![idx]);
    }
    chains
}

/// `p = (...)` bindings with whether the chain they name is constrained.
fn path_variables<'a>(
    tokens: &[Token<'a>],
    elements: &[Element<'a>],
    chains: &[Vec<usize>],
) -> Vec<(&'a str, bool)> {
    let mut out = Vec::new();
    for (i, t) in tokens.iter().enumerate() {
        let assigned = tokens.get(i + 1).map(|n| n.is_punct('=')).unwrap_or(false);
        let after_clause = i
            .checked_sub(1)
            .map(|p| {
                tokens[p].is_punct(',')
                    || (is_keyword_position(tokens, p)
                        && ["MATCH", "MERGE", "CREATE"].iter().any(|k| tokens[p].is_word(k)))
            })
            .unwrap_or(false);
        if !(is_variable(t) && assigned && after_clause) {
            continue;
        }
        let Some(first) = elements.iter().position(|e| e.start > i + 1) else {
            continue;
        };
        let constrained = chains
            .iter()
            .find(|c| c.contains(&first))
            .map(|c| c.iter().any(|&e| elements[e].constrained))
            .unwrap_or(false);
        out.push((variable_name(t), constrained));
    }
    out
}

/// Variables named in WHERE predicates (`n` in `WHERE n.id = 3`).
fn where_mentions<'a>(tokens: &[Token<'a>]) -> HashSet<&'a str> {
    let mut out = HashSet::new();
    for w in keyword_at(tokens, "WHERE") {
        let mut depth = 0usize;
        for (j, t) in tokens.iter().enumerate().skip(w + 1) {
            if opens(t) {
                depth += 1;
            } else if closes(t) {
                match depth.checked_sub(1) {
                    Some(d) => depth = d,
                    None => break,
                }
            } else if depth == 0 && is_clause_keyword(tokens, j) {
                break;
            } else if is_variable(t) {
                let after_dot =
                    j > 0 && (tokens[j - 1].is_punct('.') || tokens[j - 1].is_punct(':'));
                let is_call = tokens.get(j + 1).map(|n| n.is_punct('(')).unwrap_or(false);
                if !after_dot && !is_call {
                    out.insert(variable_name(t));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::tokenize;

    fn denied(cypher: &str) -> Option<String> {
        check(&tokenize(cypher).unwrap())
    }

    #[test]
    fn test_unscoped_deletes() {
        assert_eq!(
            denied("MATCH (n) DELETE n").as_deref(),
            Some("denylist: unscoped delete of all nodes")
        );
        assert_eq!(
            denied("match (x) detach delete x").as_deref(),
            Some("denylist: unscoped delete of all nodes")
        );
        assert_eq!(
            denied("MATCH ()-[r]->() DELETE r").as_deref(),
            Some("denylist: unscoped delete of all relationships")
        );
        assert_eq!(
            denied("MATCH (a), (b) DELETE a, b").as_deref(),
            Some("denylist: unscoped delete of all nodes")
        );
    }

    #[test]
    fn test_unscoped_deletes_in_disguise() {
        assert_eq!(
            denied("MATCH (n) DETACH DELETE (n)").as_deref(),
            Some("denylist: unscoped delete of all nodes")
        );
        assert_eq!(
            denied("MATCH (n) WHERE true DETACH DELETE n").as_deref(),
            Some("denylist: unscoped delete of all nodes")
        );
        assert_eq!(
            denied("MATCH p=(n)-[*0..]-() DETACH DELETE p").as_deref(),
            Some("denylist: unscoped delete of all nodes")
        );
        assert_eq!(
            denied("MATCH (n) WITH collect(n) AS ns UNWIND ns AS x DETACH DELETE x").as_deref(),
            Some("denylist: delete target x is not bound to a scoped pattern")
        );
        assert_eq!(
            denied("MATCH (n:Temp) WITH n AS m DELETE m").as_deref(),
            Some("denylist: delete target m is not bound to a scoped pattern")
        );
        assert_eq!(
            denied("MATCH p=(n)-->() FOREACH (x IN nodes(p) | DETACH DELETE x)").as_deref(),
            Some("denylist: delete target x is not bound to a scoped pattern")
        );
        assert_eq!(
            denied("MATCH (n) DETACH DELETE n.children").as_deref(),
            Some("denylist: delete target is not a plain variable")
        );
        // a WHERE about another variable does not scope this one
        assert_eq!(
            denied("MATCH (a:Temp), (n) WHERE a.id = 1 DELETE n").as_deref(),
            Some("denylist: unscoped delete of all nodes")
        );
    }

    #[test]
    fn test_scoped_deletes_pass() {
        assert_eq!(denied("MATCH (n:Temp) DETACH DELETE n"), None);
        assert_eq!(denied("MATCH (n {id: 3}) DELETE n"), None);
        assert_eq!(denied("MATCH (n) WHERE n.id = 3 DELETE n"), None);
        assert_eq!(denied("MATCH (n) WHERE n:Temp DETACH DELETE (n)"), None);
        assert_eq!(denied("MATCH (n WHERE n.id = 3) DELETE n"), None);
        assert_eq!(denied("MATCH ()-[r:TMP]->() DELETE r"), None);
        assert_eq!(denied("MATCH (a:Temp)-[r]->(b) DELETE r, b"), None);
        assert_eq!(denied("MATCH p=(a:Temp)-[*1..3]-() DETACH DELETE p"), None);
        assert_eq!(denied("MATCH (n:Temp) WITH n LIMIT 10 DETACH DELETE n RETURN count(*)"), None);
    }

    #[test]
    fn test_schema_commands() {
        for q in [
            "DROP INDEX idx",
            "DROP CONSTRAINT c",
            "CREATE INDEX FOR (n:Person) ON (n.name)",
            "CREATE OR REPLACE DATABASE foo",
            "CREATE FULLTEXT INDEX names FOR (n:Person) ON EACH [n.name]",
            "CREATE CONSTRAINT FOR (p:Person) REQUIRE p.id IS UNIQUE",
            "GRANT ROLE admin TO bob",
        ] {
            assert_eq!(
                denied(q).as_deref(),
                Some("denylist: schema or administration command"),
                "{q}"
            );
        }
        assert_eq!(denied("CREATE (n:Index {name: 'x'})"), None);
        assert_eq!(denied("MATCH (n) RETURN n.drop"), None);
    }

    #[test]
    fn test_denied_procedures_and_load_csv() {
        assert_eq!(
            denied("CALL apoc.periodic.iterate('MATCH (n) RETURN n', 'DETACH DELETE n', {})").as_deref(),
            Some("denylist: procedure apoc.periodic.iterate is not allowed")
        );
        assert_eq!(
            denied("CALL apoc.schema.assert({}, {})").as_deref(),
            Some("denylist: procedure apoc.schema.assert is not allowed")
        );
        assert_eq!(
            denied("LOAD CSV FROM 'file:///a.csv' AS row RETURN row").as_deref(),
            Some("denylist: LOAD CSV is not allowed")
        );
        assert_eq!(denied("CALL db.labels() YIELD label RETURN label"), None);
        assert_eq!(denied("CALL apoc.meta.data()"), None);
    }
}
