//! Bounded query execution
//!
//! Runs a validated statement through the graph driver with a statement
//! timeout and a row cap. The driver is asked for one row beyond the cap so
//! truncation can be detected without draining the stream.

use crate::error::PipelineError;
use crate::neo4j::{DriverError, GraphDriver, QueryParams, QueryRows, Record};
use crate::PipelineConfig;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Per-call execution bounds.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub row_limit: usize,
    pub query_timeout: Duration,
    /// Total attempts when the connection is unavailable (first try included).
    pub max_connection_attempts: u32,
    pub retry_base_delay: Duration,
    pub sanitize: bool,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl ExecutionLimits {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            row_limit: config.row_limit,
            query_timeout: config.query_timeout(),
            max_connection_attempts: config.max_connection_attempts.max(1),
            retry_base_delay: config.retry_base_delay(),
            sanitize: config.sanitize,
        }
    }
}

/// Rows returned to the caller, at most `row_limit` of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    /// The database had more rows than `row_limit`.
    pub truncated: bool,
}

impl ExecutionResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn bounded(raw: QueryRows, limits: &ExecutionLimits) -> Self {
        let QueryRows {
            mut columns,
            mut records,
        } = raw;
        let truncated = records.len() > limits.row_limit;
        records.truncate(limits.row_limit);
        if columns.is_empty() {
            if let Some(first) = records.first() {
                columns = first.columns().map(String::from).collect();
            }
        }
        if limits.sanitize {
            records = records.into_iter().map(Record::sanitize).collect();
        }
        Self {
            columns,
            rows: records,
            truncated,
        }
    }
}

pub struct QueryExecutor {
    driver: Arc<dyn GraphDriver>,
}

impl QueryExecutor {
    pub fn new(driver: Arc<dyn GraphDriver>) -> Self {
        Self { driver }
    }

    /// Execute one statement within `limits`.
    ///
    /// Failures for which [`PipelineError::is_retryable`] holds are retried
    /// with exponential backoff, up to `max_connection_attempts` attempts in
    /// total. Everything else fails immediately.
    pub async fn execute(
        &self,
        cypher: &str,
        params: &QueryParams,
        limits: &ExecutionLimits,
    ) -> Result<ExecutionResult, PipelineError> {
        let fetch = limits.row_limit.saturating_add(1);
        let driver = &self.driver;
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;

        let raw = backoff::future::retry_notify(
            retry_policy(limits.retry_base_delay),
            || async move {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                match driver.run_query(cypher, params, limits.query_timeout, fetch).await {
                    Ok(raw) => Ok(raw),
                    Err(e) => {
                        let err = into_pipeline_error(e, limits);
                        if err.is_retryable() && attempt < limits.max_connection_attempts {
                            Err(backoff::Error::transient(err))
                        } else {
                            Err(backoff::Error::permanent(err))
                        }
                    }
                }
            },
            |err: PipelineError, delay: Duration| {
                warn!(
                    attempt = attempts.load(Ordering::Relaxed),
                    max_attempts = limits.max_connection_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Connection unavailable, retrying"
                );
            },
        )
        .await?;

        let result = ExecutionResult::bounded(raw, limits);
        debug!(
            rows = result.rows.len(),
            truncated = result.truncated,
            attempts = attempts.load(Ordering::Relaxed),
            "Query executed"
        );
        Ok(result)
    }
}

/// Deterministic exponential backoff: `base`, `2 * base`, `4 * base`, ...
/// capped at [`MAX_RETRY_DELAY`]. The attempt budget is enforced by the
/// caller, so elapsed time is unbounded here.
fn retry_policy(base: Duration) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(base)
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_interval(MAX_RETRY_DELAY)
        .with_max_elapsed_time(None)
        .build()
}

fn into_pipeline_error(err: DriverError, limits: &ExecutionLimits) -> PipelineError {
    match err {
        DriverError::Timeout => PipelineError::ExecutionTimeout {
            timeout_ms: limits.query_timeout.as_millis() as u64,
        },
        DriverError::Rejected(msg) => PipelineError::ExecutionRejected(msg),
        DriverError::Unavailable(msg) => PipelineError::ConnectionUnavailable(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neo4j::{GraphValue, MockGraphDriver, MockResponse};

    fn limits(row_limit: usize) -> ExecutionLimits {
        ExecutionLimits {
            row_limit,
            query_timeout: Duration::from_millis(100),
            max_connection_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
            sanitize: true,
        }
    }

    fn people(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new().with("name", format!("p{i}")).with("age", i as i64))
            .collect()
    }

    fn executor(driver: MockGraphDriver) -> (Arc<MockGraphDriver>, QueryExecutor) {
        let driver = Arc::new(driver);
        (driver.clone(), QueryExecutor::new(driver))
    }

    #[tokio::test]
    async fn test_truncates_and_flags() {
        let (driver, exec) = executor(MockGraphDriver::new().on_rows("MATCH", people(10)));
        let result = exec
            .execute("MATCH (n) RETURN n.name AS name, n.age AS age", &QueryParams::new(), &limits(3))
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 3);
        assert!(result.truncated);
        assert_eq!(result.columns, vec!["name", "age"]);
        assert_eq!(driver.calls().await[0].max_rows, 4, "one extra row requested");
    }

    #[tokio::test]
    async fn test_exact_fit_is_not_truncated() {
        let (_, exec) = executor(MockGraphDriver::new().on_rows("MATCH", people(3)));
        let result = exec
            .execute("MATCH (n) RETURN n", &QueryParams::new(), &limits(3))
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 3);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_retries_unavailable_then_succeeds() {
        let driver = MockGraphDriver::new()
            .on_error("MATCH", DriverError::Unavailable("pool exhausted".into()))
            .on_error("MATCH", DriverError::Unavailable("pool exhausted".into()))
            .on_rows("MATCH", people(1));
        let (driver, exec) = executor(driver);
        let result = exec
            .execute("MATCH (n) RETURN n", &QueryParams::new(), &limits(10))
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(driver.call_count().await, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (driver, exec) = executor(
            MockGraphDriver::new().on_error("MATCH", DriverError::Unavailable("refused".into())),
        );
        let err = exec
            .execute("MATCH (n) RETURN n", &QueryParams::new(), &limits(10))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ConnectionUnavailable(_)));
        assert_eq!(driver.call_count().await, 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let (driver, exec) = executor(MockGraphDriver::new().on_error(
            "MATCH",
            DriverError::Rejected("Neo.ClientError.Statement.SyntaxError".into()),
        ));
        let err = exec
            .execute("MATCH (n) RETURN n", &QueryParams::new(), &limits(10))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ExecutionRejected(ref m) if m.contains("SyntaxError")));
        assert_eq!(driver.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_execution_timeout() {
        let (driver, exec) = executor(MockGraphDriver::new().on(
            "MATCH",
            MockResponse::Delayed(Duration::from_secs(2), QueryRows::default()),
        ));
        let err = exec
            .execute("MATCH (n) RETURN n", &QueryParams::new(), &limits(10))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ExecutionTimeout { timeout_ms: 100 }));
        assert_eq!(driver.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_sanitize_drops_embeddings() {
        let embedding: Vec<f64> = vec![0.5; 300];
        let (_, exec) = executor(MockGraphDriver::new().on_rows(
            "RETURN",
            vec![Record::new().with("name", "a").with("embedding", embedding)],
        ));
        let result = exec
            .execute("MATCH (n) RETURN n.name AS name, n.embedding AS embedding", &QueryParams::new(), &limits(10))
            .await
            .unwrap();
        assert_eq!(result.rows[0].get("name"), Some(&GraphValue::from("a")));
        assert!(result.rows[0].get("embedding").is_none());
    }

    #[test]
    fn test_retry_policy_doubles_and_caps() {
        use backoff::backoff::Backoff;

        let mut policy = retry_policy(Duration::from_millis(100));
        let delays: Vec<u128> = (0..8)
            .map(|_| policy.next_backoff().unwrap().as_millis())
            .collect();
        assert_eq!(&delays[..3], &[100, 200, 400]);
        assert_eq!(delays[7], MAX_RETRY_DELAY.as_millis());
    }
}
