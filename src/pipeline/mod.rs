//! Question pipeline orchestration
//!
//! `Pipeline::ask` drives one question through schema lookup, translation,
//! validation (with a single corrective retry), bounded execution and
//! summarization, and returns either an answer or a structured failure.

mod orchestrator;
pub mod models;

pub use models::{AskResponse, PipelineStage, TranslateResponse};
pub use orchestrator::{Pipeline, MAX_TRANSLATION_ATTEMPTS};
