//! Neo4j client backed by `neo4rs`
//!
//! Wraps a pooled `neo4rs::Graph` and adds what the pipeline needs on top:
//! a bounded checkout guard with an acquire timeout, a statement deadline,
//! early termination of result consumption, and conversion of Bolt values
//! into [`GraphValue`].

use super::models::*;
use super::traits::{DriverError, GraphDriver};
use crate::cypher::return_columns;
use crate::Neo4jConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{query, BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder, Graph, Query};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Client for Neo4j operations
pub struct Neo4jClient {
    graph: Arc<Graph>,
    /// One permit per pooled connection; checkout waits at most `acquire_timeout`.
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl Neo4jClient {
    /// Connect to Neo4j using the `neo4j` configuration section.
    pub async fn connect(config: &Neo4jConfig) -> Result<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .max_connections(config.max_connections)
            .fetch_size(config.fetch_size);
        if let Some(db) = &config.database {
            builder = builder.db(db.as_str());
        }
        let neo4rs_config = builder.build().context("Invalid Neo4j configuration")?;

        let graph = Graph::connect(neo4rs_config)
            .await
            .context("Failed to connect to Neo4j")?;

        tracing::info!(uri = %config.uri, max_connections = config.max_connections, "Connected to Neo4j");

        Ok(Self {
            graph: Arc::new(graph),
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
            acquire_timeout: config.acquire_timeout(),
        })
    }

    async fn consume(
        &self,
        q: Query,
        cypher: &str,
        max_rows: usize,
    ) -> Result<QueryRows, DriverError> {
        let mut stream = self.graph.execute(q).await.map_err(classify_error)?;
        let declared = return_columns(cypher);
        let mut records = Vec::new();
        let mut keys: Vec<String> = Vec::new();

        while records.len() < max_rows {
            let Some(row) = stream.next().await.map_err(classify_error)? else {
                break;
            };
            // BoltType deserializes through its own enum visitor, so graph
            // elements keep their variant here
            let mut fields: HashMap<String, BoltType> = row
                .to_strict()
                .map_err(|e| DriverError::Rejected(format!("could not decode row: {e}")))?;
            if keys.is_empty() {
                keys = order_columns(&declared, fields.keys().cloned().collect());
            }
            let mut record = Record::new();
            for key in &keys {
                let value = fields
                    .remove(key)
                    .map(bolt_to_value)
                    .unwrap_or(GraphValue::Null);
                record.insert(key.clone(), value);
            }
            records.push(record);
        }
        // Dropping the stream here abandons the remaining rows and returns
        // the connection to the pool.

        Ok(QueryRows {
            columns: keys,
            records,
        })
    }
}

#[async_trait]
impl GraphDriver for Neo4jClient {
    async fn run_query(
        &self,
        cypher: &str,
        params: &QueryParams,
        timeout: Duration,
        max_rows: usize,
    ) -> Result<QueryRows, DriverError> {
        let _permit = tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| {
                DriverError::Unavailable(format!(
                    "connection pool exhausted (waited {} ms)",
                    self.acquire_timeout.as_millis()
                ))
            })?
            .map_err(|_| DriverError::Unavailable("connection pool closed".to_string()))?;

        let q = build_query(cypher, params)?;

        tokio::time::timeout(timeout, self.consume(q, cypher, max_rows))
            .await
            .map_err(|_| DriverError::Timeout)?
    }

    async fn health_check(&self) -> Result<bool> {
        let mut result = self.graph.execute(query("RETURN 1 AS ok")).await?;
        Ok(result.next().await?.is_some())
    }
}

// ============================================================================
// Query building
// ============================================================================

fn build_query(cypher: &str, params: &QueryParams) -> Result<Query, DriverError> {
    let mut q = query(cypher);
    for (key, value) in params {
        q = q.param(key.as_str(), value_to_bolt(value)?);
    }
    Ok(q)
}

fn value_to_bolt(value: &GraphValue) -> Result<BoltType, DriverError> {
    Ok(match value {
        GraphValue::Null => BoltType::Null(BoltNull),
        GraphValue::Bool(b) => BoltType::from(*b),
        GraphValue::Integer(i) => BoltType::from(*i),
        GraphValue::Float(f) => BoltType::from(*f),
        GraphValue::String(s) => BoltType::from(s.clone()),
        GraphValue::List(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(value_to_bolt(item)?);
            }
            BoltType::List(list)
        }
        GraphValue::Map(map) => {
            let mut bolt = BoltMap::new();
            for (k, v) in map {
                bolt.put(BoltString::from(k.as_str()), value_to_bolt(v)?);
            }
            BoltType::Map(bolt)
        }
        GraphValue::Node(_) | GraphValue::Relationship(_) | GraphValue::Path(_) => {
            return Err(DriverError::Rejected(
                "graph elements cannot be passed as query parameters".to_string(),
            ))
        }
    })
}

// ============================================================================
// Result conversion
// ============================================================================

fn bolt_map_to_properties(map: &BoltMap) -> BTreeMap<String, GraphValue> {
    map.value
        .iter()
        .map(|(k, v)| (k.value.clone(), bolt_to_value(v.clone())))
        .collect()
}

fn bolt_list_to_strings(list: &BoltList) -> Vec<String> {
    list.value
        .iter()
        .filter_map(|v| match v {
            BoltType::String(s) => Some(s.value.clone()),
            _ => None,
        })
        .collect()
}

fn bolt_to_value(value: BoltType) -> GraphValue {
    match value {
        BoltType::Null(_) => GraphValue::Null,
        BoltType::Boolean(b) => GraphValue::Bool(b.value),
        BoltType::Integer(i) => GraphValue::Integer(i.value),
        BoltType::Float(f) => GraphValue::Float(f.value),
        BoltType::String(s) => GraphValue::String(s.value),
        BoltType::List(list) => {
            GraphValue::List(list.value.into_iter().map(bolt_to_value).collect())
        }
        BoltType::Map(map) => GraphValue::Map(bolt_map_to_properties(&map)),
        BoltType::Node(node) => GraphValue::Node(NodeValue {
            id: node.id.value,
            labels: bolt_list_to_strings(&node.labels),
            properties: bolt_map_to_properties(&node.properties),
        }),
        BoltType::Relation(rel) => GraphValue::Relationship(RelationshipValue {
            id: rel.id.value,
            start: rel.start_node_id.value,
            end: rel.end_node_id.value,
            rel_type: rel.typ.value.clone(),
            properties: bolt_map_to_properties(&rel.properties),
        }),
        BoltType::Path(path) => {
            let nodes: Vec<NodeValue> = path
                .nodes
                .value
                .into_iter()
                .filter_map(|n| match bolt_to_value(n) {
                    GraphValue::Node(node) => Some(node),
                    _ => None,
                })
                .collect();
            // Path segments carry unbound relationships; endpoints follow
            // the node sequence.
            let relationships = path
                .rels
                .value
                .into_iter()
                .enumerate()
                .filter_map(|(i, r)| match r {
                    BoltType::UnboundedRelation(rel) => Some(RelationshipValue {
                        id: rel.id.value,
                        start: nodes.get(i).map(|n| n.id).unwrap_or_default(),
                        end: nodes.get(i + 1).map(|n| n.id).unwrap_or_default(),
                        rel_type: rel.typ.value.clone(),
                        properties: bolt_map_to_properties(&rel.properties),
                    }),
                    _ => None,
                })
                .collect();
            GraphValue::Path(PathValue {
                nodes,
                relationships,
            })
        }
        // Temporal, spatial and byte values are rendered as text.
        other => GraphValue::String(format!("{:?}", other)),
    }
}

/// Order result keys by the statement's projection.
///
/// Bolt rows carry their fields in a hash map, so the declared columns of
/// the final `RETURN` decide the caller-visible order. Keys the projection
/// does not name go last, alphabetically.
pub(crate) fn order_columns(declared: &[String], mut keys: Vec<String>) -> Vec<String> {
    keys.sort_by_key(|k| {
        (
            declared.iter().position(|d| d == k).unwrap_or(usize::MAX),
            k.clone(),
        )
    });
    keys
}

// ============================================================================
// Error classification
// ============================================================================

fn classify_error(err: neo4rs::Error) -> DriverError {
    classify_message(&err.to_string())
}

/// Classify a driver error message as timeout, rejection or unavailability.
///
/// Neo4j status codes are checked first (`Neo.ClientError.*` is the
/// caller's fault, `Neo.TransientError.*` is retryable); transport-level
/// messages fall back to keyword matching.
pub(crate) fn classify_message(message: &str) -> DriverError {
    const TIMEOUT_CODES: &[&str] = &[
        "Neo.ClientError.Transaction.TransactionTimedOut",
        "Neo.TransientError.Transaction.LockClientStopped",
    ];
    const UNAVAILABLE_HINTS: &[&str] = &[
        "connection",
        "io error",
        "broken pipe",
        "unavailable",
        "pool",
        "refused",
        "reset by peer",
    ];

    if TIMEOUT_CODES.iter().any(|c| message.contains(c)) {
        return DriverError::Timeout;
    }
    if message.contains("Neo.TransientError") {
        return DriverError::Unavailable(message.to_string());
    }
    if message.contains("Neo.ClientError") || message.contains("Neo.DatabaseError") {
        return DriverError::Rejected(message.to_string());
    }

    let lower = message.to_lowercase();
    if UNAVAILABLE_HINTS.iter().any(|h| lower.contains(h)) {
        return DriverError::Unavailable(message.to_string());
    }
    DriverError::Rejected(message.to_string())
}
