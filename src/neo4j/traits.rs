//! GraphDriver trait definition
//!
//! The pipeline only needs two things from the database: run a single
//! statement with bounded time and row count, and answer a health check.
//! Keeping the surface this small lets tests swap in `MockGraphDriver`.

use crate::neo4j::models::{QueryParams, QueryRows};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Driver-level failure, already classified for the executor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    /// The statement did not complete within the deadline.
    #[error("statement timed out")]
    Timeout,
    /// The database refused the statement (syntax, semantics, authorization).
    #[error("{0}")]
    Rejected(String),
    /// No connection could be obtained or the connection broke.
    #[error("{0}")]
    Unavailable(String),
}

/// Abstract interface to the graph database.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Run one Cypher statement.
    ///
    /// Implementations stop consuming the result stream after `max_rows`
    /// records and must give up after `timeout`, releasing any checked-out
    /// connection on every exit path.
    async fn run_query(
        &self,
        cypher: &str,
        params: &QueryParams,
        timeout: Duration,
        max_rows: usize,
    ) -> Result<QueryRows, DriverError>;

    /// Cheap connectivity check (`RETURN 1`).
    async fn health_check(&self) -> anyhow::Result<bool>;
}
