use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use super::fields::{interpolate, resolve_field};
use super::{kind_mismatch, require};
use crate::domain::expression::stringify;
use crate::domain::workflow::{
    NodeDefinition, NodeExecution, NodeKind, NodeOutput, NodeRuntime, NodeType, WorkflowError,
};
use crate::domain::{LlmProvider, LlmRequest, Usage};

/// Asks the chat-completion collaborator a question
#[derive(Debug, Default)]
pub struct AiQuestionRuntime {
    llm: Option<Arc<dyn LlmProvider>>,
}

impl AiQuestionRuntime {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { llm }
    }
}

/// Run a completion, forwarding each delta as a partial event when streaming
pub(super) async fn complete(
    llm: &dyn LlmProvider,
    node: &NodeDefinition,
    model_id: &str,
    request: LlmRequest,
    execution: &NodeExecution<'_>,
) -> Result<(String, Usage), WorkflowError> {
    if !request.stream {
        let response = llm.chat(model_id, request).await?;
        return Ok((response.content().to_string(), response.usage.unwrap_or_default()));
    }

    let mut stream = llm.chat_stream(model_id, request).await?;
    let mut text = String::new();
    let mut usage = Usage::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(delta) = chunk.delta {
            text.push_str(&delta);
            execution.events.partial(node, json!({"delta": delta})).await?;
        }
        if let Some(reported) = chunk.usage {
            usage = reported;
        }
    }

    Ok((text, usage))
}

pub(super) fn usage_json(usage: &Usage) -> Value {
    json!({
        "completion_tokens": usage.completion_tokens,
        "prompt_tokens": usage.prompt_tokens,
        "total_tokens": usage.total_tokens,
    })
}

#[async_trait]
impl NodeRuntime for AiQuestionRuntime {
    fn node_type(&self) -> NodeType {
        NodeType::AiQuestion
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        execution: &NodeExecution<'_>,
    ) -> Result<NodeOutput, WorkflowError> {
        let NodeKind::AiQuestion(ai) = node.kind() else {
            return Err(kind_mismatch(node, NodeType::AiQuestion));
        };
        let llm = require(&self.llm, "llm")?;

        let question = stringify(&resolve_field(&ai.question, execution.context)?);
        let prompt = interpolate(&ai.prompt, execution.context);

        let request = LlmRequest::builder()
            .system(prompt)
            .user(question)
            .temperature(ai.temperature)
            .max_tokens(ai.max_tokens)
            .stream(ai.stream)
            .build();

        debug!(node_key = node.key(), model = %ai.model_id, stream = ai.stream, "Asking model");

        let (text, usage) = complete(llm, node, &ai.model_id, request, execution).await?;

        Ok(NodeOutput::new(json!({
            "text": text,
            "usage": usage_json(&usage),
        })))
    }
}
