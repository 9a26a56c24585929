//! Graph schema introspection and caching
//!
//! The translator is grounded on a [`SchemaDescription`]: labels,
//! relationship types, property keys with their types, and the observed
//! `(:A)-[:T]->(:B)` patterns. [`SchemaIntrospector`] fetches it from the
//! database and keeps one immutable snapshot per process, replaced
//! wholesale on refresh.

pub mod introspector;
pub mod models;

pub use introspector::{SchemaIntrospector, SchemaSnapshot};
pub use models::{PropertyInfo, RelationshipPattern, SchemaDescription};
