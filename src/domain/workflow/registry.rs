//! Node type to runtime dispatch table

use std::collections::HashMap;
use std::sync::Arc;

use super::error::WorkflowError;
use super::node_types::NodeType;
use super::runtime::NodeRuntime;

/// Maps each node type to the runtime that executes it
///
/// Built during initialization, then shared read-only behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct NodeRuntimeRegistry {
    runtimes: HashMap<NodeType, Arc<dyn NodeRuntime>>,
}

impl NodeRuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with_runtime(mut self, runtime: Arc<dyn NodeRuntime>) -> Self {
        self.register_runtime(runtime.node_type(), runtime);
        self
    }

    /// Register `runtime` for `node_type`, replacing any previous one
    pub fn register_runtime(
        &mut self,
        node_type: NodeType,
        runtime: Arc<dyn NodeRuntime>,
    ) -> Option<Arc<dyn NodeRuntime>> {
        self.runtimes.insert(node_type, runtime)
    }

    pub fn unregister_runtime(&mut self, node_type: NodeType) -> Option<Arc<dyn NodeRuntime>> {
        self.runtimes.remove(&node_type)
    }

    pub fn get_runtime(&self, node_type: NodeType) -> Result<Arc<dyn NodeRuntime>, WorkflowError> {
        self.runtimes
            .get(&node_type)
            .cloned()
            .ok_or_else(|| WorkflowError::unsupported_node_type(node_type))
    }

    pub fn is_registered(&self, node_type: NodeType) -> bool {
        self.runtimes.contains_key(&node_type)
    }

    /// Registered types in a stable order
    pub fn registered_node_types(&self) -> Vec<NodeType> {
        let mut types: Vec<NodeType> = self.runtimes.keys().copied().collect();
        types.sort();
        types
    }
}
