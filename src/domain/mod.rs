//! Domain layer - Core business logic and entities

pub mod error;
pub mod expression;
pub mod llm;
pub mod workflow;

pub use error::DomainError;
pub use llm::{
    FinishReason, LlmProvider, LlmRequest, LlmRequestBuilder, LlmResponse, LlmStream, Message,
    MessageRole, StreamChunk, Usage,
};
pub use workflow::{
    ExecutionRequest, NodeDefinition, NodeKind, NodeRuntimeRegistry, NodeType, WorkflowContext,
    WorkflowDefinition, WorkflowError, WorkflowEventStream, WorkflowExecutor,
    WorkflowProcessingItem,
};
