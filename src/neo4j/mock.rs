//! In-memory scripted implementation of GraphDriver for testing.
//!
//! Responses are registered per Cypher substring. Each call is matched
//! against the rules in registration order; the first matching rule
//! answers. A rule replays its responses in order and keeps repeating the
//! last one. Unmatched statements return an empty result.

use crate::neo4j::models::{QueryParams, QueryRows, Record};
use crate::neo4j::traits::{DriverError, GraphDriver};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

/// One scripted driver response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Rows(QueryRows),
    Error(DriverError),
    /// Sleep before answering; used to exercise timeouts.
    Delayed(Duration, QueryRows),
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    responses: VecDeque<MockResponse>,
}

/// A recorded driver call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub cypher: String,
    pub params: QueryParams,
    pub max_rows: usize,
}

/// Scripted mock graph driver.
#[derive(Debug, Default)]
pub struct MockGraphDriver {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
    healthy: bool,
}

impl MockGraphDriver {
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Register a response for statements containing `pattern`.
    pub fn on(mut self, pattern: impl Into<String>, response: MockResponse) -> Self {
        let pattern = pattern.into();
        let rules = self.rules.get_mut();
        match rules.iter_mut().find(|r| r.pattern == pattern) {
            Some(rule) => rule.responses.push_back(response),
            None => rules.push(Rule {
                pattern,
                responses: VecDeque::from(vec![response]),
            }),
        }
        self
    }

    /// Shorthand for a rows response.
    pub fn on_rows(self, pattern: impl Into<String>, records: Vec<Record>) -> Self {
        self.on(pattern, MockResponse::Rows(QueryRows::from_records(records)))
    }

    /// Shorthand for an error response.
    pub fn on_error(self, pattern: impl Into<String>, error: DriverError) -> Self {
        self.on(pattern, MockResponse::Error(error))
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Number of calls whose statement contains `pattern`.
    pub async fn calls_matching(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.cypher.contains(pattern))
            .count()
    }

    async fn next_response(&self, cypher: &str) -> Option<MockResponse> {
        let mut rules = self.rules.lock().await;
        let rule = rules.iter_mut().find(|r| cypher.contains(&r.pattern))?;
        if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        }
    }
}

fn cap(mut rows: QueryRows, max_rows: usize) -> QueryRows {
    rows.records.truncate(max_rows);
    rows
}

#[async_trait]
impl GraphDriver for MockGraphDriver {
    async fn run_query(
        &self,
        cypher: &str,
        params: &QueryParams,
        timeout: Duration,
        max_rows: usize,
    ) -> Result<QueryRows, DriverError> {
        self.calls.lock().await.push(RecordedCall {
            cypher: cypher.to_string(),
            params: params.clone(),
            max_rows,
        });

        match self.next_response(cypher).await {
            None => Ok(QueryRows::default()),
            Some(MockResponse::Rows(rows)) => Ok(cap(rows, max_rows)),
            Some(MockResponse::Error(e)) => Err(e),
            Some(MockResponse::Delayed(delay, rows)) => {
                tokio::time::timeout(timeout, tokio::time::sleep(delay))
                    .await
                    .map_err(|_| DriverError::Timeout)?;
                Ok(cap(rows, max_rows))
            }
        }
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        Ok(self.healthy)
    }
}
