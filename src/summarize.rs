//! Result summarization
//!
//! The summarizer shows the model a bounded preview of the rows together
//! with the question. A truncated result is always disclosed: the prompt
//! asks for it, and a note is appended if the reply leaves it out.
//! [`Summarizer::fallback`] produces a deterministic summary without the
//! model.

use crate::error::PipelineError;
use crate::executor::ExecutionResult;
use crate::llm::{ChatMessage, CompletionProvider};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const CLIP_MARKER: &str = "...[clipped]";

const ANSWER_TEMPLATE: &str = "### Instruction
Answer the user's question using the database query result below. Answer in one to three sentences and only state facts present in the result. If the result is empty, say that no matching data was found.{truncation}
### Input
{question}
### Query Result
{preview}
### Output
";

/// Answer text plus the rows it was derived from.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub text: String,
    pub result: ExecutionResult,
    /// The templated fallback was used instead of the model.
    pub degraded: bool,
}

pub struct Summarizer {
    llm: Arc<dyn CompletionProvider>,
    timeout: Duration,
    preview_rows: usize,
    preview_chars: usize,
}

impl Summarizer {
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        timeout: Duration,
        preview_rows: usize,
        preview_chars: usize,
    ) -> Self {
        Self {
            llm,
            timeout,
            preview_rows,
            preview_chars,
        }
    }

    /// Ask the model to answer the question from the rows.
    pub async fn summarize(
        &self,
        question: &str,
        result: &ExecutionResult,
    ) -> Result<Summary, PipelineError> {
        let truncation = if result.truncated {
            format!(
                "\nThe result was cut off after the first {} rows. Say that the answer is based on a partial result.",
                result.row_count()
            )
        } else {
            String::new()
        };
        let prompt = ANSWER_TEMPLATE
            .replace("{truncation}", &truncation)
            .replace("{question}", question.trim())
            .replace("{preview}", &self.preview(result));

        let reply = tokio::time::timeout(self.timeout, self.llm.complete(&[ChatMessage::user(prompt)]))
            .await
            .map_err(|_| {
                PipelineError::SummarizationFailed(format!(
                    "model did not answer within {} ms",
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| PipelineError::SummarizationFailed(format!("model call failed: {e:#}")))?;

        let mut text = reply.trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::SummarizationFailed(
                "model returned an empty reply".to_string(),
            ));
        }
        if result.truncated && !mentions_truncation(&text) {
            debug!("Summary omitted truncation, appending note");
            text.push_str("\n\n");
            text.push_str(&truncation_note(result));
        }

        Ok(Summary {
            text,
            result: result.clone(),
            degraded: false,
        })
    }

    /// Deterministic summary built from the rows alone.
    pub fn fallback(result: &ExecutionResult) -> Summary {
        let n = result.row_count();
        let mut text = match n {
            0 => "The query returned no rows.".to_string(),
            1 => match single_scalar(result) {
                Some((column, value)) => format!("The query returned 1 row: {column} = {value}."),
                None => format!("The query returned 1 row with columns: {}.", result.columns.join(", ")),
            },
            _ => format!(
                "The query returned {n} rows with columns: {}.",
                result.columns.join(", ")
            ),
        };
        if result.truncated {
            text.push(' ');
            text.push_str(&truncation_note(result));
        }
        Summary {
            text,
            result: result.clone(),
            degraded: true,
        }
    }

    /// Column header plus up to `preview_rows` JSON lines, never longer than
    /// `preview_chars` characters. A first row that does not fit on its own
    /// is clipped rather than dropped.
    fn preview(&self, result: &ExecutionResult) -> String {
        if result.rows.is_empty() {
            return "(no rows)".to_string();
        }
        let mut out = format!("columns: {}\n", result.columns.join(", "));
        let mut shown = 0;
        for row in result.rows.iter().take(self.preview_rows) {
            let line = serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string());
            let remaining = self.preview_chars.saturating_sub(out.chars().count());
            if line.chars().count() < remaining {
                out.push_str(&line);
                out.push('\n');
                shown += 1;
                continue;
            }
            if shown == 0 {
                out.push_str(&clip(&line, remaining.saturating_sub(1)));
                out.push('\n');
                shown = 1;
            }
            break;
        }
        let hidden = result.row_count() - shown;
        if hidden > 0 {
            out.push_str(&format!("... ({hidden} more rows not shown)\n"));
        }
        clip(&out, self.preview_chars)
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker_len = CLIP_MARKER.chars().count();
    if max_chars <= marker_len {
        return text.chars().take(max_chars).collect();
    }
    let mut clipped: String = text.chars().take(max_chars - marker_len).collect();
    clipped.push_str(CLIP_MARKER);
    clipped
}

fn truncation_note(result: &ExecutionResult) -> String {
    format!(
        "(Note: the result was truncated to the first {} rows; more rows exist.)",
        result.row_count()
    )
}

fn mentions_truncation(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["truncat", "partial", "more rows", "not all", "cut off"]
        .iter()
        .any(|hint| lower.contains(hint))
}

fn single_scalar(result: &ExecutionResult) -> Option<(&str, String)> {
    let row = result.rows.first()?;
    if row.len() != 1 {
        return None;
    }
    let (column, value) = row.iter().next()?;
    Some((column, value.display_scalar()?))
}
