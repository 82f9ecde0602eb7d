//! Workflow execution endpoint

use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::{ExecutionRequest, WorkflowDefinition};

/// Request to execute an inline workflow definition
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowExecuteRequest {
    pub definition: WorkflowDefinition,

    /// Startup parameters handed to the Start node
    #[serde(default)]
    pub inputs: Map<String, Value>,

    /// System variables visible to every node
    #[serde(default)]
    pub system: Map<String, Value>,

    #[serde(default)]
    pub instance_id: Option<String>,
}

/// POST /v1/workflows/execute
///
/// Streams one SSE `data:` frame per processing event. Dropping the
/// connection cancels the instance.
pub async fn execute_workflow(
    State(state): State<AppState>,
    Json(request): Json<WorkflowExecuteRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let execution = match request.instance_id {
        Some(id) => ExecutionRequest::new(id),
        None => ExecutionRequest::generated(),
    }
    .with_parameters(request.inputs)
    .with_system_variables(request.system);

    info!(
        instance_id = %execution.instance_id,
        workflow_id = request.definition.id(),
        "Executing workflow"
    );

    let cancel = CancellationToken::new();
    let events = state
        .executor
        .execute(Arc::new(request.definition), execution, cancel.clone())?;

    let guard = cancel.drop_guard();
    let stream = events.map(move |item| {
        let _connected = &guard;
        Event::default().json_data(&item)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
