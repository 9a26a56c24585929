//! Integration tests against a live Neo4j
//!
//! These tests require Neo4j to be running and skip themselves otherwise.
//! Run with: cargo test --test integration_tests

use neo4j_chat::executor::{ExecutionLimits, QueryExecutor};
use neo4j_chat::neo4j::{GraphDriver, GraphValue, Neo4jClient, QueryParams};
use neo4j_chat::schema::SchemaIntrospector;
use neo4j_chat::{ErrorKind, Neo4jConfig};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Get test configuration from environment or use defaults
fn test_config() -> Neo4jConfig {
    Neo4jConfig {
        uri: std::env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".into()),
        user: std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".into()),
        password: std::env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "password".into()),
        ..Default::default()
    }
}

/// Connect, or return None when no database is reachable.
async fn live_client() -> Option<Arc<Neo4jClient>> {
    let config = test_config();
    match Neo4jClient::connect(&config).await {
        Ok(client) if client.health_check().await.unwrap_or(false) => Some(Arc::new(client)),
        _ => {
            eprintln!("Neo4j not available at {}, skipping", config.uri);
            None
        }
    }
}

fn limits(row_limit: usize) -> ExecutionLimits {
    ExecutionLimits {
        row_limit,
        query_timeout: Duration::from_secs(10),
        max_connection_attempts: 2,
        retry_base_delay: Duration::from_millis(50),
        sanitize: true,
    }
}

#[tokio::test]
async fn test_scalar_roundtrip() {
    let Some(client) = live_client().await else {
        return;
    };
    let executor = QueryExecutor::new(client);

    let mut params = QueryParams::new();
    params.insert("n".into(), GraphValue::Integer(41));
    let result = executor
        .execute("RETURN $n + 1 AS answer, 'x' AS tag", &params, &limits(10))
        .await
        .unwrap();

    assert_eq!(result.columns, vec!["answer", "tag"]);
    assert_eq!(result.rows[0].get("answer"), Some(&GraphValue::Integer(42)));
    assert!(!result.truncated);
}

#[tokio::test]
async fn test_row_cap_against_server() {
    let Some(client) = live_client().await else {
        return;
    };
    let executor = QueryExecutor::new(client);

    let result = executor
        .execute("UNWIND range(1, 50) AS i RETURN i", &QueryParams::new(), &limits(5))
        .await
        .unwrap();

    assert_eq!(result.rows.len(), 5);
    assert!(result.truncated);
}

#[tokio::test]
async fn test_syntax_error_is_rejected() {
    let Some(client) = live_client().await else {
        return;
    };
    let executor = QueryExecutor::new(client);

    let err = executor
        .execute("MATCH (n RETURN n", &QueryParams::new(), &limits(5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionRejected);
}

#[tokio::test]
async fn test_schema_sees_new_label() {
    let Some(client) = live_client().await else {
        return;
    };

    // unique label so concurrent runs do not collide
    let label = format!("ChatTest{}", Uuid::new_v4().simple());
    let create = format!("CREATE (:{label} {{name: 'sample', score: 1.5}})");
    client
        .run_query(&create, &QueryParams::new(), Duration::from_secs(10), 1)
        .await
        .unwrap();

    let introspector = SchemaIntrospector::new(
        client.clone(),
        Duration::from_secs(300),
        Duration::from_secs(30),
    );
    let snapshot = introspector.get_schema(true).await.unwrap();
    assert!(!snapshot.stale);
    assert!(snapshot.schema.node_labels.contains(&label));
    let keys = snapshot.schema.property_keys(&label);
    assert!(keys.contains(&"name"));

    let cleanup = format!("MATCH (n:{label}) DETACH DELETE n");
    client
        .run_query(&cleanup, &QueryParams::new(), Duration::from_secs(10), 1)
        .await
        .unwrap();
}
