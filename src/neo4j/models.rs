//! Typed graph values returned by query execution

use serde::Serialize;
use std::collections::BTreeMap;

/// Lists with at least this many elements are treated as embedding-like
/// payloads and removed by [`GraphValue::sanitize`].
pub const LIST_LIMIT: usize = 128;

// ============================================================================
// Values
// ============================================================================

/// A node as returned by the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeValue {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, GraphValue>,
}

/// A relationship as returned by the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipValue {
    pub id: i64,
    pub start: i64,
    pub end: i64,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub properties: BTreeMap<String, GraphValue>,
}

/// An alternating node/relationship path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathValue {
    pub nodes: Vec<NodeValue>,
    pub relationships: Vec<RelationshipValue>,
}

/// Any value a record column can hold: a scalar, a collection, or a graph
/// element. Serializes to plain JSON (graph elements become objects).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GraphValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<GraphValue>),
    Map(BTreeMap<String, GraphValue>),
    Node(NodeValue),
    Relationship(RelationshipValue),
    Path(PathValue),
}

impl GraphValue {
    /// Short type name used in templated summaries and logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            GraphValue::Null => "null",
            GraphValue::Bool(_) => "boolean",
            GraphValue::Integer(_) => "integer",
            GraphValue::Float(_) => "float",
            GraphValue::String(_) => "string",
            GraphValue::List(_) => "list",
            GraphValue::Map(_) => "map",
            GraphValue::Node(_) => "node",
            GraphValue::Relationship(_) => "relationship",
            GraphValue::Path(_) => "path",
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            GraphValue::Null
                | GraphValue::Bool(_)
                | GraphValue::Integer(_)
                | GraphValue::Float(_)
                | GraphValue::String(_)
        )
    }

    /// Human-readable rendering of a scalar (strings without quotes).
    pub fn display_scalar(&self) -> Option<String> {
        match self {
            GraphValue::Null => Some("null".to_string()),
            GraphValue::Bool(b) => Some(b.to_string()),
            GraphValue::Integer(i) => Some(i.to_string()),
            GraphValue::Float(f) => Some(f.to_string()),
            GraphValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Remove oversized lists (embeddings and similar) recursively.
    ///
    /// Returns `None` when the value itself is an oversized list. Map keys
    /// and properties whose value is removed are dropped entirely.
    pub fn sanitize(self) -> Option<GraphValue> {
        match self {
            GraphValue::List(items) => {
                if items.len() >= LIST_LIMIT {
                    return None;
                }
                Some(GraphValue::List(
                    items.into_iter().filter_map(GraphValue::sanitize).collect(),
                ))
            }
            GraphValue::Map(map) => Some(GraphValue::Map(sanitize_map(map))),
            GraphValue::Node(mut node) => {
                node.properties = sanitize_map(node.properties);
                Some(GraphValue::Node(node))
            }
            GraphValue::Relationship(mut rel) => {
                rel.properties = sanitize_map(rel.properties);
                Some(GraphValue::Relationship(rel))
            }
            GraphValue::Path(mut path) => {
                for node in &mut path.nodes {
                    node.properties = sanitize_map(std::mem::take(&mut node.properties));
                }
                for rel in &mut path.relationships {
                    rel.properties = sanitize_map(std::mem::take(&mut rel.properties));
                }
                Some(GraphValue::Path(path))
            }
            scalar => Some(scalar),
        }
    }
}

fn sanitize_map(map: BTreeMap<String, GraphValue>) -> BTreeMap<String, GraphValue> {
    map.into_iter()
        .filter_map(|(k, v)| v.sanitize().map(|v| (k, v)))
        .collect()
}

impl From<i64> for GraphValue {
    fn from(v: i64) -> Self {
        GraphValue::Integer(v)
    }
}

impl From<i32> for GraphValue {
    fn from(v: i32) -> Self {
        GraphValue::Integer(v.into())
    }
}

impl From<f64> for GraphValue {
    fn from(v: f64) -> Self {
        GraphValue::Float(v)
    }
}

impl From<bool> for GraphValue {
    fn from(v: bool) -> Self {
        GraphValue::Bool(v)
    }
}

impl From<&str> for GraphValue {
    fn from(v: &str) -> Self {
        GraphValue::String(v.to_string())
    }
}

impl From<String> for GraphValue {
    fn from(v: String) -> Self {
        GraphValue::String(v)
    }
}

impl<T: Into<GraphValue>> From<Vec<T>> for GraphValue {
    fn from(v: Vec<T>) -> Self {
        GraphValue::List(v.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Records
// ============================================================================

/// One result row: column name → value, in column order.
///
/// Serializes as a JSON object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, GraphValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used heavily by tests and mocks.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<GraphValue>) -> Self {
        self.insert(column, value.into());
        self
    }

    /// Insert or replace a column value, keeping the original position on replace.
    pub fn insert(&mut self, column: impl Into<String>, value: GraphValue) {
        let column = column.into();
        match self.fields.iter_mut().find(|(k, _)| *k == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&GraphValue> {
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GraphValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Apply [`GraphValue::sanitize`] to every column, dropping removed ones.
    pub fn sanitize(self) -> Record {
        Record {
            fields: self
                .fields
                .into_iter()
                .filter_map(|(k, v)| v.sanitize().map(|v| (k, v)))
                .collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.fields.iter().map(|(k, v)| (k, v)))
    }
}

/// Raw rows produced by a driver call, before executor-level limits apply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl QueryRows {
    /// Build from records, taking the column list from the first record.
    pub fn from_records(records: Vec<Record>) -> Self {
        let columns = records
            .first()
            .map(|r| r.columns().map(String::from).collect())
            .unwrap_or_default();
        Self { columns, records }
    }
}

/// Query parameters passed alongside a Cypher statement.
pub type QueryParams = BTreeMap<String, GraphValue>;
