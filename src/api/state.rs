//! Application state for shared services

use std::sync::Arc;

use crate::domain::WorkflowExecutor;

/// Application state shared by handlers
#[derive(Clone, Debug)]
pub struct AppState {
    pub executor: Arc<dyn WorkflowExecutor>,
}

impl AppState {
    pub fn new(executor: Arc<dyn WorkflowExecutor>) -> Self {
        Self { executor }
    }
}
