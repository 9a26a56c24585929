//! HTTP surface
//!
//! Thin axum adapter over [`crate::Pipeline`]: health, schema, ask and
//! translate-only endpoints.

pub mod handlers;
pub mod routes;

pub use handlers::AppError;
pub use routes::create_router;
