//! v1 API endpoints

pub mod workflows;

use axum::{routing::post, Router};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new().route("/workflows/execute", post(workflows::execute_workflow))
}
