//! Workflow domain module
//!
//! A workflow is a directed graph of typed nodes. Executing it walks the graph
//! from the single Start node, records every node's output in a per-instance
//! [`WorkflowContext`], and reports progress as a stream of
//! [`WorkflowProcessingItem`] events.
//!
//! ## Variable References
//!
//! Node fields address data as `prefix.path`:
//! - `input.field` - startup parameter
//! - `sys.field` - system variable
//! - `nodeKey.items[0].name` - output of an executed node
//! - `nodeKey.items[*].name` - fan-out over an array

mod collaborators;
mod context;
mod definition;
mod error;
mod executor;
mod node_types;
mod registry;
mod runtime;
mod variable;

#[cfg(test)]
pub use collaborators::mock;
pub use collaborators::{
    HttpCall, HttpInvoker, HttpReply, KnowledgeBaseSearcher, PluginCall, PluginInvoker,
    ScriptError, ScriptSandbox, WikiQuery,
};
pub use context::{NodePipeline, WorkflowContext};
pub use definition::{NodeDefinition, WorkflowDefinition};
pub use error::{WorkflowError, WorkflowErrorKind};
pub use executor::{
    ExecutionRequest, NodeFailure, ProcessingState, WorkflowEventStream, WorkflowExecutor,
    WorkflowProcessingItem,
};
pub use node_types::{
    AiQuestionNode, ClassificationClass, ConditionBranch, ConditionNode, EndNode, ForNode,
    HttpMethod, HttpNode, JavaScriptNode, NodeKind, NodeType, PluginNode,
    QuestionClassificationNode, StartNode, StartOutputMode, WikiNode,
};
pub use registry::NodeRuntimeRegistry;
pub use runtime::{EventSink, ExecutionLimits, NodeExecution, NodeOutput, NodeRuntime};
pub use variable::{resolve_variable, VariableReference, INPUT_PREFIX, SYS_PREFIX};
