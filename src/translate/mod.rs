//! Natural-language question → Cypher translation
//!
//! The translator grounds a completion provider with the schema text, then
//! pulls a single Cypher statement out of the free-form reply and labels
//! its intent.

pub mod extract;
pub mod prompt;
pub mod translator;

pub use extract::extract_cypher;
pub use translator::{CandidateQuery, QueryTranslator, TranslationRequest};
