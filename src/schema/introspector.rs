//! Schema fetch with a TTL cache and stale fallback
//!
//! The cached snapshot is an `Arc<SchemaDescription>` swapped in whole, so
//! readers always see either the previous or the new snapshot. Refreshes are
//! serialized by a separate mutex so concurrent cache misses issue a single
//! round of metadata queries.

use crate::error::PipelineError;
use crate::neo4j::{DriverError, GraphDriver, GraphValue, QueryParams, QueryRows};
use crate::schema::models::{
    PropertyInfo, RelationshipPattern, SchemaDescription, EXCLUDED_LABELS, EXCLUDED_RELATIONSHIPS,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const METADATA_ROW_LIMIT: usize = 10_000;

const APOC_NODE_PROPERTIES: &str = r#"
CALL apoc.meta.data() YIELD label, other, elementType, type, property
WHERE NOT type = "RELATIONSHIP" AND elementType = "node" AND NOT label IN $excluded_labels
WITH label, collect({property: property, type: type}) AS properties
RETURN label, properties ORDER BY label"#;

const APOC_REL_PROPERTIES: &str = r#"
CALL apoc.meta.data() YIELD label, other, elementType, type, property
WHERE NOT type = "RELATIONSHIP" AND elementType = "relationship" AND NOT label IN $excluded_rels
WITH label, collect({property: property, type: type}) AS properties
RETURN label, properties ORDER BY label"#;

const APOC_REL_PATTERNS: &str = r#"
CALL apoc.meta.data() YIELD label, other, elementType, type, property
WHERE type = "RELATIONSHIP" AND elementType = "node"
UNWIND other AS other_node
WITH label, property, other_node
WHERE NOT label IN $excluded_labels AND NOT other_node IN $excluded_labels
RETURN label AS start, property AS type, toString(other_node) AS end"#;

const BUILTIN_NODE_PROPERTIES: &str = r#"
CALL db.schema.nodeTypeProperties() YIELD nodeLabels, propertyName, propertyTypes
UNWIND nodeLabels AS label
WITH label, propertyName, propertyTypes
WHERE NOT label IN $excluded_labels
RETURN label, collect({property: propertyName, type: coalesce(propertyTypes[0], 'ANY')}) AS properties"#;

const BUILTIN_REL_PROPERTIES: &str = r#"
CALL db.schema.relTypeProperties() YIELD relType, propertyName, propertyTypes
WITH replace(replace(relType, ':`', ''), '`', '') AS label, propertyName, propertyTypes
WHERE NOT label IN $excluded_rels
RETURN label, collect({property: propertyName, type: coalesce(propertyTypes[0], 'ANY')}) AS properties"#;

const BUILTIN_REL_PATTERNS: &str = r#"
MATCH (a)-[r]->(b)
WITH a, r, b LIMIT 10000
RETURN DISTINCT labels(a)[0] AS start, type(r) AS type, labels(b)[0] AS end"#;

struct MetadataQueries {
    node_properties: &'static str,
    rel_properties: &'static str,
    rel_patterns: &'static str,
}

const APOC: MetadataQueries = MetadataQueries {
    node_properties: APOC_NODE_PROPERTIES,
    rel_properties: APOC_REL_PROPERTIES,
    rel_patterns: APOC_REL_PATTERNS,
};

const BUILTIN: MetadataQueries = MetadataQueries {
    node_properties: BUILTIN_NODE_PROPERTIES,
    rel_properties: BUILTIN_REL_PROPERTIES,
    rel_patterns: BUILTIN_REL_PATTERNS,
};

/// A schema snapshot handed to callers.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    pub schema: Arc<SchemaDescription>,
    /// True when the last refresh failed and this is the last-known-good copy.
    pub stale: bool,
}

struct CachedSchema {
    schema: Arc<SchemaDescription>,
    loaded_at: Instant,
    stale: bool,
    invalidated: bool,
}

pub struct SchemaIntrospector {
    driver: Arc<dyn GraphDriver>,
    ttl: Duration,
    query_timeout: Duration,
    cache: RwLock<Option<CachedSchema>>,
    refresh_lock: Mutex<()>,
}

impl SchemaIntrospector {
    pub fn new(driver: Arc<dyn GraphDriver>, ttl: Duration, query_timeout: Duration) -> Self {
        Self {
            driver,
            ttl,
            query_timeout,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Return the cached snapshot if still fresh, otherwise fetch a new one.
    ///
    /// On fetch failure the previous snapshot is returned with `stale = true`;
    /// with nothing cached the call fails with `SchemaUnavailable`.
    pub async fn get_schema(&self, force_refresh: bool) -> Result<SchemaSnapshot, PipelineError> {
        if !force_refresh {
            if let Some(snapshot) = self.fresh().await {
                return Ok(snapshot);
            }
        }

        let _guard = self.refresh_lock.lock().await;

        // another caller may have refreshed while we waited on the lock
        if !force_refresh {
            if let Some(snapshot) = self.fresh().await {
                return Ok(snapshot);
            }
        }

        match self.fetch().await {
            Ok(schema) => {
                let schema = Arc::new(schema);
                info!(
                    labels = schema.node_labels.len(),
                    relationship_types = schema.relationship_types.len(),
                    patterns = schema.relationships.len(),
                    "Schema refreshed"
                );
                *self.cache.write().await = Some(CachedSchema {
                    schema: Arc::clone(&schema),
                    loaded_at: Instant::now(),
                    stale: false,
                    invalidated: false,
                });
                Ok(SchemaSnapshot {
                    schema,
                    stale: false,
                })
            }
            Err(e) => {
                let mut cache = self.cache.write().await;
                match cache.as_mut() {
                    Some(cached) => {
                        warn!(error = %e, "Schema refresh failed, serving stale snapshot");
                        cached.stale = true;
                        Ok(SchemaSnapshot {
                            schema: Arc::clone(&cached.schema),
                            stale: true,
                        })
                    }
                    None => Err(PipelineError::SchemaUnavailable(e.to_string())),
                }
            }
        }
    }

    /// Force the next `get_schema` to refetch. The current snapshot is kept
    /// as the stale fallback.
    pub async fn invalidate(&self) {
        if let Some(cached) = self.cache.write().await.as_mut() {
            cached.invalidated = true;
        }
    }

    async fn fresh(&self) -> Option<SchemaSnapshot> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref()?;
        if cached.invalidated || cached.stale || cached.loaded_at.elapsed() >= self.ttl {
            return None;
        }
        Some(SchemaSnapshot {
            schema: Arc::clone(&cached.schema),
            stale: false,
        })
    }

    async fn fetch(&self) -> Result<SchemaDescription, DriverError> {
        match self.fetch_with(&APOC).await {
            Err(DriverError::Rejected(msg)) if is_missing_procedure(&msg) => {
                debug!("APOC not available, using built-in schema procedures");
                self.fetch_with(&BUILTIN).await
            }
            other => other,
        }
    }

    async fn fetch_with(&self, queries: &MetadataQueries) -> Result<SchemaDescription, DriverError> {
        let params = metadata_params();
        let node_rows = self.run(queries.node_properties, &params).await?;
        let rel_rows = self.run(queries.rel_properties, &params).await?;
        let pattern_rows = self.run(queries.rel_patterns, &params).await?;

        Ok(SchemaDescription::build(
            parse_properties(&node_rows),
            parse_properties(&rel_rows),
            parse_patterns(&pattern_rows),
        ))
    }

    async fn run(&self, cypher: &str, params: &QueryParams) -> Result<QueryRows, DriverError> {
        self.driver
            .run_query(cypher, params, self.query_timeout, METADATA_ROW_LIMIT)
            .await
    }
}

fn metadata_params() -> QueryParams {
    let mut params = QueryParams::new();
    params.insert(
        "excluded_labels".to_string(),
        GraphValue::from(EXCLUDED_LABELS.iter().map(|s| s.to_string()).collect::<Vec<_>>()),
    );
    params.insert(
        "excluded_rels".to_string(),
        GraphValue::from(
            EXCLUDED_RELATIONSHIPS
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
        ),
    );
    params
}

fn is_missing_procedure(message: &str) -> bool {
    message.contains("ProcedureNotFound")
        || message.contains("no procedure with the name")
        || message.contains("Unknown function 'apoc")
}

fn string_field<'a>(value: Option<&'a GraphValue>) -> Option<&'a str> {
    match value {
        Some(GraphValue::String(s)) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Rows of `(label, [{property, type}])`.
fn parse_properties(rows: &QueryRows) -> BTreeMap<String, BTreeSet<PropertyInfo>> {
    let mut out: BTreeMap<String, BTreeSet<PropertyInfo>> = BTreeMap::new();
    for record in &rows.records {
        let Some(label) = string_field(record.get("label")) else {
            continue;
        };
        let entry = out.entry(label.to_string()).or_default();
        if let Some(GraphValue::List(items)) = record.get("properties") {
            for item in items {
                let GraphValue::Map(map) = item else { continue };
                if let Some(key) = string_field(map.get("property")) {
                    let ty = string_field(map.get("type")).unwrap_or("ANY");
                    entry.insert(PropertyInfo::new(key, ty.to_uppercase()));
                }
            }
        }
    }
    out
}

/// Rows of `(start, type, end)`.
fn parse_patterns(rows: &QueryRows) -> Vec<RelationshipPattern> {
    rows.records
        .iter()
        .filter_map(|record| {
            Some(RelationshipPattern {
                start: string_field(record.get("start"))?.to_string(),
                rel_type: string_field(record.get("type"))?.to_string(),
                end: string_field(record.get("end"))?.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neo4j::{MockGraphDriver, Record};

    fn property(key: &str, ty: &str) -> GraphValue {
        let mut map = BTreeMap::new();
        map.insert("property".to_string(), GraphValue::from(key));
        map.insert("type".to_string(), GraphValue::from(ty));
        GraphValue::Map(map)
    }

    fn movie_driver() -> MockGraphDriver {
        MockGraphDriver::new()
            .on_rows(
                "elementType = \"node\" AND NOT label",
                vec![
                    Record::new().with("label", "Person").with(
                        "properties",
                        GraphValue::List(vec![property("name", "STRING"), property("born", "INTEGER")]),
                    ),
                    Record::new()
                        .with("label", "Movie")
                        .with("properties", GraphValue::List(vec![property("title", "STRING")])),
                ],
            )
            .on_rows(
                "elementType = \"relationship\"",
                vec![Record::new()
                    .with("label", "ACTED_IN")
                    .with("properties", GraphValue::List(vec![property("roles", "LIST")]))],
            )
            .on_rows(
                "UNWIND other",
                vec![Record::new()
                    .with("start", "Person")
                    .with("type", "ACTED_IN")
                    .with("end", "Movie")],
            )
    }

    fn introspector(driver: MockGraphDriver, ttl: Duration) -> (Arc<MockGraphDriver>, SchemaIntrospector) {
        let driver = Arc::new(driver);
        let introspector =
            SchemaIntrospector::new(driver.clone(), ttl, Duration::from_secs(1));
        (driver, introspector)
    }

    #[tokio::test]
    async fn test_fetches_apoc_schema() {
        let (_, introspector) = introspector(movie_driver(), Duration::from_secs(60));
        let snapshot = introspector.get_schema(false).await.unwrap();
        assert!(!snapshot.stale);
        let schema = snapshot.schema;
        assert!(schema.node_labels.contains("Person"));
        assert!(schema.node_labels.contains("Movie"));
        assert!(schema.relationship_types.contains("ACTED_IN"));
        assert!(schema.property_keys("Person").contains("born"));
        assert!(schema.to_prompt_text().contains("(:Person)-[:ACTED_IN]->(:Movie)"));
    }

    #[tokio::test]
    async fn test_same_snapshot_within_ttl() {
        let (driver, introspector) = introspector(movie_driver(), Duration::from_secs(60));
        let a = introspector.get_schema(false).await.unwrap();
        let b = introspector.get_schema(false).await.unwrap();
        assert!(Arc::ptr_eq(&a.schema, &b.schema));
        assert_eq!(driver.call_count().await, 3, "one round of metadata queries");
    }

    #[tokio::test]
    async fn test_new_snapshot_after_ttl() {
        let (_, introspector) = introspector(movie_driver(), Duration::from_millis(30));
        let a = introspector.get_schema(false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let b = introspector.get_schema(false).await.unwrap();
        assert!(!Arc::ptr_eq(&a.schema, &b.schema));
        assert_eq!(a.schema.node_labels, b.schema.node_labels);
    }

    #[tokio::test]
    async fn test_force_refresh_and_invalidate() {
        let (driver, introspector) = introspector(movie_driver(), Duration::from_secs(60));
        let a = introspector.get_schema(false).await.unwrap();
        let b = introspector.get_schema(true).await.unwrap();
        assert!(!Arc::ptr_eq(&a.schema, &b.schema));

        introspector.invalidate().await;
        let c = introspector.get_schema(false).await.unwrap();
        assert!(!Arc::ptr_eq(&b.schema, &c.schema));
        assert_eq!(driver.call_count().await, 9);
    }

    #[tokio::test]
    async fn test_unavailable_without_cache() {
        let driver = MockGraphDriver::new().on_error(
            "apoc.meta.data",
            DriverError::Unavailable("connection refused".into()),
        );
        let (_, introspector) = introspector(driver, Duration::from_secs(60));
        let err = introspector.get_schema(false).await.unwrap_err();
        assert!(matches!(err, PipelineError::SchemaUnavailable(_)));
    }

    #[tokio::test]
    async fn test_stale_fallback_after_failed_refresh() {
        let driver = movie_driver().on_error(
            "elementType = \"node\" AND NOT label",
            DriverError::Unavailable("connection refused".into()),
        );
        let (_, introspector) = introspector(driver, Duration::from_secs(60));
        let first = introspector.get_schema(false).await.unwrap();
        assert!(!first.stale);

        let second = introspector.get_schema(true).await.unwrap();
        assert!(second.stale);
        assert!(Arc::ptr_eq(&first.schema, &second.schema));
    }

    #[tokio::test]
    async fn test_falls_back_to_builtin_procedures() {
        let driver = MockGraphDriver::new()
            .on_error(
                "apoc.meta.data",
                DriverError::Rejected(
                    "Neo.ClientError.Procedure.ProcedureNotFound: There is no procedure with the name `apoc.meta.data`".into(),
                ),
            )
            .on_rows(
                "db.schema.nodeTypeProperties",
                vec![Record::new()
                    .with("label", "Person")
                    .with("properties", GraphValue::List(vec![property("name", "String")]))],
            )
            .on_rows(
                "MATCH (a)-[r]->(b)",
                vec![Record::new()
                    .with("start", "Person")
                    .with("type", "KNOWS")
                    .with("end", "Person")],
            );
        let (driver, introspector) = introspector(driver, Duration::from_secs(60));
        let snapshot = introspector.get_schema(false).await.unwrap();
        assert!(snapshot.schema.relationship_types.contains("KNOWS"));
        assert!(snapshot
            .schema
            .node_properties
            .get("Person")
            .unwrap()
            .contains(&PropertyInfo::new("name", "STRING")));
        assert_eq!(driver.calls_matching("db.schema").await, 2);
    }

    #[tokio::test]
    async fn test_metadata_queries_pass_exclusions() {
        let (driver, introspector) = introspector(movie_driver(), Duration::from_secs(60));
        introspector.get_schema(false).await.unwrap();
        let calls = driver.calls().await;
        assert!(calls.iter().all(|c| c.params.contains_key("excluded_labels")));
    }
}
