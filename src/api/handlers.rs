//! API request handlers

use crate::error::{ErrorKind, PipelineError};
use crate::pipeline::{AskResponse, TranslateResponse};
use crate::schema::SchemaDescription;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Health
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub neo4j: bool,
    pub version: String,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let neo4j_ok = state.driver.health_check().await.unwrap_or(false);

    let (status, http_status) = if neo4j_ok {
        ("ok", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            neo4j: neo4j_ok,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SchemaQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Serialize)]
pub struct SchemaResponse {
    pub schema: SchemaDescription,
    /// The text block handed to the translator.
    pub prompt_text: String,
    pub stale: bool,
}

/// Current schema snapshot; `?refresh=true` forces a refetch.
pub async fn get_schema(
    State(state): State<AppState>,
    Query(query): Query<SchemaQuery>,
) -> Result<Json<SchemaResponse>, AppError> {
    let snapshot = state
        .pipeline
        .introspector()
        .get_schema(query.refresh)
        .await?;
    Ok(Json(SchemaResponse {
        prompt_text: snapshot.schema.to_prompt_text(),
        schema: snapshot.schema.as_ref().clone(),
        stale: snapshot.stale,
    }))
}

// ============================================================================
// Questions
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Answer a question: translate, validate, execute, summarize.
pub async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(AppError::BadRequest("question must not be empty".into()));
    }
    Ok(Json(state.pipeline.ask(&req.question).await?))
}

/// Return the validated Cypher for a question without running it.
pub async fn translate(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<TranslateResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(AppError::BadRequest("question must not be empty".into()));
    }
    Ok(Json(state.pipeline.translate_only(&req.question).await?))
}

// ============================================================================
// Error handling
// ============================================================================

/// API error type
#[derive(Debug)]
pub enum AppError {
    Pipeline(PipelineError),
    BadRequest(String),
}

/// HTTP status for a pipeline failure kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::SchemaUnavailable | ErrorKind::ConnectionUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorKind::TranslationFailed | ErrorKind::SummarizationFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::ValidationRejected | ErrorKind::ExecutionRejected => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::ExecutionTimeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::Pipeline(e) => {
                (status_for(e.kind()), Json(e.to_response())).into_response()
            }
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": msg })),
            )
                .into_response(),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::llm::MockCompletionProvider;
    use crate::neo4j::{MockGraphDriver, Record};
    use crate::Config;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    fn app(driver: MockGraphDriver, llm: MockCompletionProvider) -> axum::Router {
        create_router(AppState::from_parts(
            Arc::new(driver),
            Arc::new(llm),
            Config::default(),
        ))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_driver_state() {
        let resp = app(MockGraphDriver::new(), MockCompletionProvider::new())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");

        let resp = app(MockGraphDriver::new().unhealthy(), MockCompletionProvider::new())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_ask_returns_answer() {
        let driver = MockGraphDriver::new()
            .on_rows("count(n)", vec![Record::new().with("count", 42)]);
        let llm = MockCompletionProvider::new()
            .with_text("MATCH (n:Person) RETURN count(n) AS count")
            .with_text("There are 42 Person nodes.");

        let resp = app(driver, llm)
            .oneshot(post_json(
                "/api/ask",
                serde_json::json!({ "question": "How many Person nodes are there?" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["summary"], "There are 42 Person nodes.");
        assert_eq!(body["rows"][0]["count"], 42);
        assert_eq!(body["truncated"], false);
    }

    #[tokio::test]
    async fn test_ask_rejection_is_structured() {
        let llm = MockCompletionProvider::new().with_fallback("MATCH (n) DETACH DELETE n");
        let resp = app(MockGraphDriver::new(), llm)
            .oneshot(post_json(
                "/api/ask",
                serde_json::json!({ "question": "Delete all nodes" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(resp).await;
        assert_eq!(body["kind"], "validation_rejected");
        assert!(body["message"].as_str().unwrap().contains("write operations"));
    }

    #[tokio::test]
    async fn test_empty_question_is_bad_request() {
        let resp = app(MockGraphDriver::new(), MockCompletionProvider::new())
            .oneshot(post_json("/api/cypher", serde_json::json!({ "question": " " })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_schema_endpoint() {
        let driver = MockGraphDriver::new().on_rows(
            "UNWIND other",
            vec![Record::new()
                .with("start", "Person")
                .with("type", "KNOWS")
                .with("end", "Person")],
        );
        let resp = app(driver, MockCompletionProvider::new())
            .oneshot(Request::builder().uri("/api/schema?refresh=true").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["stale"], false);
        assert!(body["prompt_text"]
            .as_str()
            .unwrap()
            .contains("(:Person)-[:KNOWS]->(:Person)"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::ExecutionTimeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_for(ErrorKind::ConnectionUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(ErrorKind::ValidationRejected),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
