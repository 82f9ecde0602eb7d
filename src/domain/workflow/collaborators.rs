//! Contracts for the external systems node runtimes call out to

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::error::WorkflowError;
use super::node_types::HttpMethod;

/// Outbound HTTP call built by an Http node
#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

/// Response to an [`HttpCall`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpReply {
    pub status: u16,
    pub body: Value,
}

#[async_trait]
pub trait HttpInvoker: Send + Sync + Debug {
    /// Send the call; non-2xx statuses are failures
    async fn send(&self, call: HttpCall) -> Result<HttpReply, WorkflowError>;
}

/// Plugin action invocation
#[derive(Debug, Clone, PartialEq)]
pub struct PluginCall {
    pub plugin_id: String,
    pub action: String,
    pub inputs: Value,
    pub headers: BTreeMap<String, String>,
}

#[async_trait]
pub trait PluginInvoker: Send + Sync + Debug {
    async fn invoke(&self, call: PluginCall) -> Result<Value, WorkflowError>;
}

/// Knowledge-base search request
#[derive(Debug, Clone, PartialEq)]
pub struct WikiQuery {
    pub wiki_id: String,
    pub question: String,
    pub top_k: Option<u32>,
    pub inputs: Value,
}

#[async_trait]
pub trait KnowledgeBaseSearcher: Send + Sync + Debug {
    async fn search(&self, query: WikiQuery) -> Result<Value, WorkflowError>;
}

/// Script sandbox failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScriptError {
    #[error("script timed out after {0:?}")]
    Timeout(Duration),

    #[error("script failed: {0}")]
    Failed(String),
}

impl From<ScriptError> for WorkflowError {
    fn from(error: ScriptError) -> Self {
        WorkflowError::external_call("script", error.to_string())
    }
}

/// Runs user scripts in isolation; must not touch engine state
#[async_trait]
pub trait ScriptSandbox: Send + Sync + Debug {
    async fn execute(&self, source: &str, input: Value) -> Result<Value, ScriptError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_maps_to_external_failure() {
        let err: WorkflowError = ScriptError::Timeout(Duration::from_secs(2)).into();
        assert_eq!(
            err,
            WorkflowError::external_call("script", "script timed out after 2s")
        );
    }
}
