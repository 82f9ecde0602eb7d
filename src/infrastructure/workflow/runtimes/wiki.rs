use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::fields::{derive_outputs, resolve_inputs};
use super::{kind_mismatch, require};
use crate::domain::expression::stringify;
use crate::domain::workflow::{
    KnowledgeBaseSearcher, NodeDefinition, NodeExecution, NodeKind, NodeOutput, NodeRuntime,
    NodeType, WikiQuery, WorkflowError,
};

/// Input field holding the search text
const QUESTION_FIELD: &str = "question";

/// Searches a knowledge base with the node's `question` input
#[derive(Debug, Default)]
pub struct WikiRuntime {
    knowledge_base: Option<Arc<dyn KnowledgeBaseSearcher>>,
}

impl WikiRuntime {
    pub fn new(knowledge_base: Option<Arc<dyn KnowledgeBaseSearcher>>) -> Self {
        Self { knowledge_base }
    }
}

#[async_trait]
impl NodeRuntime for WikiRuntime {
    fn node_type(&self) -> NodeType {
        NodeType::Wiki
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        execution: &NodeExecution<'_>,
    ) -> Result<NodeOutput, WorkflowError> {
        let NodeKind::Wiki(wiki) = node.kind() else {
            return Err(kind_mismatch(node, NodeType::Wiki));
        };
        let knowledge_base = require(&self.knowledge_base, "knowledge_base")?;

        let inputs = resolve_inputs(&wiki.inputs, execution.context)?;
        let question = inputs
            .get(QUESTION_FIELD)
            .map(stringify)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| WorkflowError::property_not_found(node.key(), QUESTION_FIELD))?;

        debug!(node_key = node.key(), wiki_id = %wiki.wiki_id, "Searching knowledge base");

        let result = knowledge_base
            .search(WikiQuery {
                wiki_id: wiki.wiki_id.clone(),
                question,
                top_k: wiki.top_k,
                inputs,
            })
            .await?;

        let output = derive_outputs(&wiki.outputs, &result, execution.context)?;
        Ok(NodeOutput::new(output))
    }
}
