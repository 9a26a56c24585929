//! Static validation of candidate queries
//!
//! Validation is pure: it inspects the statement text and the policy and
//! never touches the database. Checks run in order (syntax, write policy,
//! denylist) and the first failure decides the reason.

pub mod denylist;

use crate::cypher::{
    classify_intent, leading_keyword, tokenize, write_clauses, QueryIntent, Token, TokenKind,
    LEADING_KEYWORDS,
};
use crate::translate::CandidateQuery;
use serde::{Deserialize, Serialize};

/// What the validator allows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub allow_writes: bool,
}

impl ValidationPolicy {
    pub fn read_only() -> Self {
        Self {
            allow_writes: false,
        }
    }
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub accepted: bool,
    pub reason: Option<String>,
}

impl ValidationVerdict {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Validate a candidate against the policy.
///
/// Intent is re-derived from the text; a candidate is treated as WRITE if
/// either the declared or the derived intent says so.
pub fn validate(candidate: &CandidateQuery, policy: &ValidationPolicy) -> ValidationVerdict {
    let tokens = match check_syntax(&candidate.cypher) {
        Ok(tokens) => tokens,
        Err(reason) => return ValidationVerdict::reject(reason),
    };

    let derived = classify_intent(&candidate.cypher);
    let is_write = candidate.intent == QueryIntent::Write || derived == QueryIntent::Write;
    if is_write && !policy.allow_writes {
        return ValidationVerdict::reject("policy: write operations are not allowed");
    }

    if let Some(reason) = denylist::check(&tokens) {
        return ValidationVerdict::reject(reason);
    }

    ValidationVerdict::accept()
}

fn check_syntax(cypher: &str) -> Result<Vec<Token<'_>>, String> {
    if cypher.trim().is_empty() {
        return Err("syntax: empty statement".to_string());
    }

    let mut tokens = tokenize(cypher).map_err(|e| format!("syntax: {e}"))?;
    if tokens.last().map(|t| t.is_punct(';')).unwrap_or(false) {
        tokens.pop();
    }
    if tokens.is_empty() {
        return Err("syntax: empty statement".to_string());
    }
    if tokens.iter().any(|t| t.is_punct(';')) {
        return Err("syntax: multiple statements are not allowed".to_string());
    }

    check_brackets(&tokens)?;

    let leading = leading_keyword(&tokens)
        .filter(|kw| LEADING_KEYWORDS.contains(&kw.as_str()))
        .ok_or_else(|| "syntax: statement must start with a clause keyword".to_string())?;

    if matches!(leading.as_str(), "MATCH" | "OPTIONAL" | "WITH" | "UNWIND") {
        let has_return = tokens.iter().any(|t| t.is_word("RETURN"));
        let has_call = tokens.iter().any(|t| t.is_word("CALL"));
        if !has_return && !has_call && write_clauses(&tokens).is_empty() {
            return Err("syntax: query has no RETURN clause".to_string());
        }
    }

    Ok(tokens)
}

fn check_brackets(tokens: &[Token<'_>]) -> Result<(), String> {
    let mut stack: Vec<char> = Vec::new();
    for tok in tokens.iter().filter(|t| t.kind == TokenKind::Punct) {
        let c = tok.text.chars().next().unwrap_or(' ');
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return Err(format!("syntax: unbalanced {}", bracket_name(c)));
                }
            }
            _ => {}
        }
    }
    match stack.last() {
        Some(&open) => Err(format!("syntax: unbalanced {}", bracket_name(open))),
        None => Ok(()),
    }
}

fn bracket_name(c: char) -> &'static str {
    match c {
        '(' | ')' => "parentheses",
        '[' | ']' => "brackets",
        _ => "braces",
    }
}
