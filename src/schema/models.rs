//! Schema snapshot model and its prompt rendering

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Labels never shown to the model (Neo4j Bloom bookkeeping, import base label).
pub const EXCLUDED_LABELS: &[&str] = &["_Bloom_Perspective_", "_Bloom_Scene_", "__Entity__"];

/// Relationship types never shown to the model.
pub const EXCLUDED_RELATIONSHIPS: &[&str] = &["_Bloom_HAS_SCENE_"];

/// A property key and its Neo4j type name (`STRING`, `INTEGER`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub key: String,
    #[serde(rename = "type")]
    pub property_type: String,
}

impl PropertyInfo {
    pub fn new(key: impl Into<String>, property_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            property_type: property_type.into(),
        }
    }
}

/// An observed relationship pattern `(:start)-[:rel_type]->(:end)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipPattern {
    pub start: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub end: String,
}

/// Immutable point-in-time description of the graph schema.
///
/// Never mutated once built; a refresh produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub node_labels: BTreeSet<String>,
    pub relationship_types: BTreeSet<String>,
    pub node_properties: BTreeMap<String, BTreeSet<PropertyInfo>>,
    pub relationship_properties: BTreeMap<String, BTreeSet<PropertyInfo>>,
    pub relationships: Vec<RelationshipPattern>,
    pub fetched_at: DateTime<Utc>,
}

impl SchemaDescription {
    /// Assemble a snapshot, deriving label/type sets from properties and
    /// patterns and dropping excluded labels and relationship types.
    pub fn build(
        node_properties: BTreeMap<String, BTreeSet<PropertyInfo>>,
        relationship_properties: BTreeMap<String, BTreeSet<PropertyInfo>>,
        relationships: Vec<RelationshipPattern>,
    ) -> Self {
        let node_properties: BTreeMap<_, _> = node_properties
            .into_iter()
            .filter(|(label, _)| !EXCLUDED_LABELS.contains(&label.as_str()))
            .collect();
        let relationship_properties: BTreeMap<_, _> = relationship_properties
            .into_iter()
            .filter(|(t, _)| !EXCLUDED_RELATIONSHIPS.contains(&t.as_str()))
            .collect();
        let mut relationships: Vec<RelationshipPattern> = relationships
            .into_iter()
            .filter(|p| {
                !EXCLUDED_LABELS.contains(&p.start.as_str())
                    && !EXCLUDED_LABELS.contains(&p.end.as_str())
                    && !EXCLUDED_RELATIONSHIPS.contains(&p.rel_type.as_str())
            })
            .collect();
        relationships.sort();
        relationships.dedup();

        let mut node_labels: BTreeSet<String> = node_properties.keys().cloned().collect();
        let mut relationship_types: BTreeSet<String> =
            relationship_properties.keys().cloned().collect();
        for p in &relationships {
            node_labels.insert(p.start.clone());
            node_labels.insert(p.end.clone());
            relationship_types.insert(p.rel_type.clone());
        }

        Self {
            node_labels,
            relationship_types,
            node_properties,
            relationship_properties,
            relationships,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.node_labels.is_empty() && self.relationship_types.is_empty()
    }

    /// Property keys known for a node label or relationship type.
    pub fn property_keys(&self, label_or_type: &str) -> BTreeSet<&str> {
        self.node_properties
            .get(label_or_type)
            .into_iter()
            .chain(self.relationship_properties.get(label_or_type))
            .flatten()
            .map(|p| p.key.as_str())
            .collect()
    }

    /// Render the snapshot for a translation prompt.
    ///
    /// ```text
    /// Node properties:
    /// Person {name: STRING, age: INTEGER}
    /// Relationship properties:
    /// KNOWS {since: INTEGER}
    /// The relationships:
    /// (:Person)-[:KNOWS]->(:Person)
    /// ```
    pub fn to_prompt_text(&self) -> String {
        let format_props = |props: Option<&BTreeSet<PropertyInfo>>| {
            props
                .map(|set| {
                    set.iter()
                        .map(|p| format!("{}: {}", p.key, p.property_type))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default()
        };

        let nodes: Vec<String> = self
            .node_labels
            .iter()
            .map(|label| format!("{} {{{}}}", label, format_props(self.node_properties.get(label))))
            .collect();
        let rels: Vec<String> = self
            .relationship_properties
            .iter()
            .map(|(t, props)| format!("{} {{{}}}", t, format_props(Some(props))))
            .collect();
        let patterns: Vec<String> = self
            .relationships
            .iter()
            .map(|p| format!("(:{})-[:{}]->(:{})", p.start, p.rel_type, p.end))
            .collect();

        [
            "Node properties:".to_string(),
            nodes.join("\n"),
            "Relationship properties:".to_string(),
            rels.join("\n"),
            "The relationships:".to_string(),
            patterns.join("\n"),
        ]
        .join("\n")
    }
}
