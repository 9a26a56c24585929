//! Minimal Cypher lexer and intent classification
//!
//! This is not a parser. It splits a statement into tokens so keyword
//! checks never fire inside string literals, comments or backtick-quoted
//! identifiers, which is all the translator and validator need.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: keyword, variable, label, function or procedure segment.
    Word,
    Number,
    /// `'...'` or `"..."`
    StringLiteral,
    /// `` `...` ``
    QuotedIdentifier,
    /// `$name`
    Parameter,
    /// Any other single non-whitespace character.
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: usize,
}

impl Token<'_> {
    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct && self.text.starts_with(c)
    }

    /// Case-insensitive keyword match on a bare word.
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated quoted identifier")]
    UnterminatedIdentifier,
    #[error("unterminated block comment")]
    UnterminatedComment,
}

/// Split a statement into tokens, dropping whitespace and comments.
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, LexError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let start = i;

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            let end = src[i + 2..]
                .find("*/")
                .ok_or(LexError::UnterminatedComment)?;
            i += 2 + end + 2;
            continue;
        }

        let kind = match b {
            b'\'' | b'"' => {
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => return Err(LexError::UnterminatedString),
                        Some(b'\\') => i += 2,
                        Some(&c) if c == b => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                TokenKind::StringLiteral
            }
            b'`' => {
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => return Err(LexError::UnterminatedIdentifier),
                        // doubled backtick is an escaped backtick
                        Some(b'`') if bytes.get(i + 1) == Some(&b'`') => i += 2,
                        Some(b'`') => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                TokenKind::QuotedIdentifier
            }
            b'$' => {
                i += 1;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                TokenKind::Parameter
            }
            c if c.is_ascii_digit() => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    // `1..3` is a range, not a float
                    if bytes[i] == b'.' && bytes.get(i + 1) == Some(&b'.') {
                        break;
                    }
                    i += 1;
                }
                TokenKind::Number
            }
            c if is_word_byte(c) || c >= 0x80 => {
                while i < bytes.len() && (is_word_byte(bytes[i]) || bytes[i] >= 0x80) {
                    i += 1;
                }
                TokenKind::Word
            }
            _ => {
                i += 1;
                TokenKind::Punct
            }
        };

        // string and identifier scans may step past the end on a trailing escape
        let end = i.min(bytes.len());
        if !src.is_char_boundary(end) {
            return Err(LexError::UnterminatedString);
        }
        tokens.push(Token {
            kind,
            text: &src[start..end],
            offset: start,
        });
        i = end;
    }

    Ok(tokens)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Declared or derived effect of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryIntent {
    Read,
    Write,
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryIntent::Read => f.write_str("READ"),
            QueryIntent::Write => f.write_str("WRITE"),
        }
    }
}

/// Keywords that may start a statement.
pub const LEADING_KEYWORDS: &[&str] = &[
    "MATCH", "OPTIONAL", "RETURN", "WITH", "UNWIND", "CALL", "SHOW", "USE", "EXPLAIN", "PROFILE",
    "CREATE", "MERGE", "SET", "DELETE", "DETACH", "REMOVE", "DROP", "LOAD", "FOREACH",
];

/// Keywords that modify the graph or its schema.
pub const WRITE_KEYWORDS: &[&str] = &[
    "CREATE", "MERGE", "SET", "DELETE", "DETACH", "REMOVE", "DROP", "LOAD", "FOREACH",
];

/// Procedures known not to modify the graph, lowercased. An entry ending in
/// `.` admits its whole namespace; any other entry must match exactly. A
/// `CALL` to anything not listed is treated as a write.
pub const READ_ONLY_PROCEDURES: &[&str] = &[
    "db.labels",
    "db.relationshiptypes",
    "db.propertykeys",
    "db.schema.",
    "db.indexes",
    "db.constraints",
    "db.info",
    "db.ping",
    "db.index.fulltext.querynodes",
    "db.index.fulltext.queryrelationships",
    "db.index.vector.querynodes",
    "db.index.vector.queryrelationships",
    "apoc.meta.",
    "apoc.help",
];

/// True when a lowercased procedure name is on the read-only allowlist.
pub fn is_read_only_procedure(name: &str) -> bool {
    READ_ONLY_PROCEDURES.iter().any(|entry| {
        if entry.ends_with('.') {
            name.starts_with(entry)
        } else {
            name == *entry
        }
    })
}

/// True when `tokens[idx]` is a bare word used as a keyword rather than a
/// property key (`n.set`), label (`:Delete`) or map key (`{create: 1}`).
pub fn is_keyword_position(tokens: &[Token<'_>], idx: usize) -> bool {
    let tok = &tokens[idx];
    if tok.kind != TokenKind::Word {
        return false;
    }
    let prev_blocks = idx
        .checked_sub(1)
        .map(|p| tokens[p].is_punct('.') || tokens[p].is_punct(':'))
        .unwrap_or(false);
    let next_blocks = tokens.get(idx + 1).map(|t| t.is_punct(':')).unwrap_or(false);
    !prev_blocks && !next_blocks
}

/// Uppercased write keywords found in keyword position.
pub fn write_clauses(tokens: &[Token<'_>]) -> Vec<String> {
    tokens
        .iter()
        .enumerate()
        .filter(|(i, _)| is_keyword_position(tokens, *i))
        .map(|(_, t)| t.text.to_ascii_uppercase())
        .filter(|w| WRITE_KEYWORDS.contains(&w.as_str()))
        .collect()
}

/// Dotted procedure names following each `CALL`, lowercased.
pub fn procedure_calls(tokens: &[Token<'_>]) -> Vec<String> {
    let mut out = Vec::new();
    for (i, tok) in tokens.iter().enumerate() {
        if !(tok.is_word("CALL") && is_keyword_position(tokens, i)) {
            continue;
        }
        let mut name = String::new();
        let mut j = i + 1;
        while let Some(t) = tokens.get(j) {
            match t.kind {
                TokenKind::Word | TokenKind::QuotedIdentifier => {
                    name.push_str(t.text.trim_matches('`'));
                }
                TokenKind::Punct if t.is_punct('.') => name.push('.'),
                _ => break,
            }
            j += 1;
        }
        if !name.is_empty() {
            out.push(name.to_ascii_lowercase());
        }
    }
    out
}

/// First bare word of the statement, uppercased.
pub fn leading_keyword(tokens: &[Token<'_>]) -> Option<String> {
    tokens
        .first()
        .filter(|t| t.kind == TokenKind::Word)
        .map(|t| t.text.to_ascii_uppercase())
}

fn calls_write_procedure(tokens: &[Token<'_>]) -> bool {
    procedure_calls(tokens)
        .iter()
        .any(|p| !is_read_only_procedure(p))
}

/// Classify a statement as READ or WRITE.
///
/// WRITE when a write clause appears in keyword position or a `CALL`
/// targets a procedure outside [`READ_ONLY_PROCEDURES`]. A statement that
/// cannot be tokenized is classified WRITE.
pub fn classify_intent(cypher: &str) -> QueryIntent {
    let Ok(tokens) = tokenize(cypher) else {
        return QueryIntent::Write;
    };
    if !write_clauses(&tokens).is_empty() || calls_write_procedure(&tokens) {
        QueryIntent::Write
    } else {
        QueryIntent::Read
    }
}

/// Keywords that end a projection list.
const PROJECTION_END: &[&str] = &["ORDER", "SKIP", "LIMIT", "UNION", "WHERE"];

/// Column names of the final projection, in order.
///
/// Reads the last top-level `RETURN`, or the last `YIELD` when there is no
/// `RETURN`. Each item is named by its `AS` alias, otherwise by the
/// expression text as written. Empty for `RETURN *` and for statements that
/// cannot be tokenized.
pub fn return_columns(cypher: &str) -> Vec<String> {
    let Ok(tokens) = tokenize(cypher) else {
        return Vec::new();
    };

    let mut depth = 0usize;
    let mut last_return = None;
    let mut last_yield = None;
    for (i, t) in tokens.iter().enumerate() {
        if opens_group(t) {
            depth += 1;
        } else if closes_group(t) {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && is_keyword_position(&tokens, i) {
            if t.is_word("RETURN") {
                last_return = Some(i);
            } else if t.is_word("YIELD") {
                last_yield = Some(i);
            }
        }
    }
    let Some(keyword) = last_return.or(last_yield) else {
        return Vec::new();
    };
    let mut start = keyword + 1;
    if tokens.get(start).map(|t| t.is_word("DISTINCT")).unwrap_or(false) {
        start += 1;
    }

    let mut columns = Vec::new();
    let mut item_start = start;
    let mut end = tokens.len();
    let mut depth = 0usize;
    for (j, t) in tokens.iter().enumerate().skip(start) {
        if opens_group(t) {
            depth += 1;
        } else if closes_group(t) {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && t.is_punct(',') {
            columns.extend(column_name(cypher, &tokens[item_start..j]));
            item_start = j + 1;
        } else if depth == 0
            && (t.is_punct(';')
                || (is_keyword_position(&tokens, j)
                    && PROJECTION_END.iter().any(|k| t.is_word(k))))
        {
            end = j;
            break;
        }
    }
    if item_start < end {
        columns.extend(column_name(cypher, &tokens[item_start..end]));
    }
    columns
}

fn opens_group(t: &Token<'_>) -> bool {
    t.is_punct('(') || t.is_punct('[') || t.is_punct('{')
}

fn closes_group(t: &Token<'_>) -> bool {
    t.is_punct(')') || t.is_punct(']') || t.is_punct('}')
}

fn column_name(src: &str, item: &[Token<'_>]) -> Option<String> {
    let (first, last) = (item.first()?, item.last()?);
    if item.len() == 1 && first.is_punct('*') {
        return None;
    }
    if item.len() >= 2 && item[item.len() - 2].is_word("AS") {
        return Some(last.text.trim_matches('`').to_string());
    }
    if item.len() == 1 && first.kind == TokenKind::QuotedIdentifier {
        return Some(first.text.trim_matches('`').to_string());
    }
    let end = last.offset + last.text.len();
    src.get(first.offset..end).map(str::to_string)
}
