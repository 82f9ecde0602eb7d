use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::ai_question::{complete, usage_json};
use super::fields::{interpolate, resolve_field};
use super::{kind_mismatch, require};
use crate::domain::expression::stringify;
use crate::domain::workflow::{
    ClassificationClass, NodeDefinition, NodeExecution, NodeKind, NodeOutput, NodeRuntime,
    NodeType, QuestionClassificationNode, WorkflowContext, WorkflowError,
};
use crate::domain::{LlmProvider, LlmRequest};

/// Sorts a question into one of the node's classes
#[derive(Debug, Default)]
pub struct QuestionClassificationRuntime {
    llm: Option<Arc<dyn LlmProvider>>,
}

impl QuestionClassificationRuntime {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { llm }
    }

    fn system_prompt(node: &QuestionClassificationNode, context: &WorkflowContext) -> String {
        let mut prompt = interpolate(&node.prompt, context);
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str(
            "Classify the user's question into exactly one of the following classes. \
             Reply with the class label only.\n",
        );
        for class in &node.classes {
            match &class.description {
                Some(description) => {
                    let _ = writeln!(prompt, "- {}: {}", class.label, description);
                }
                None => {
                    let _ = writeln!(prompt, "- {}", class.label);
                }
            }
        }
        prompt
    }
}

/// Exact label first, then the first label mentioned anywhere in the reply
fn match_class<'n>(classes: &'n [ClassificationClass], reply: &str) -> Option<&'n ClassificationClass> {
    let cleaned = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c.is_whitespace())
        .to_lowercase();

    classes
        .iter()
        .find(|class| class.label.to_lowercase() == cleaned)
        .or_else(|| {
            classes
                .iter()
                .find(|class| cleaned.contains(&class.label.to_lowercase()))
        })
}

#[async_trait]
impl NodeRuntime for QuestionClassificationRuntime {
    fn node_type(&self) -> NodeType {
        NodeType::QuestionClassification
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        execution: &NodeExecution<'_>,
    ) -> Result<NodeOutput, WorkflowError> {
        let NodeKind::QuestionClassification(classification) = node.kind() else {
            return Err(kind_mismatch(node, NodeType::QuestionClassification));
        };
        let llm = require(&self.llm, "llm")?;

        let question = stringify(&resolve_field(&classification.question, execution.context)?);
        let request = LlmRequest::builder()
            .system(Self::system_prompt(classification, execution.context))
            .user(question)
            .temperature(Some(0.0))
            .build();

        let (text, usage) = complete(llm, node, &classification.model_id, request, execution).await?;

        let Some(class) = match_class(&classification.classes, &text) else {
            if node.next().is_some() {
                warn!(node_key = node.key(), reply = %text, "No class matched, using default successor");
                return Ok(NodeOutput::new(json!({
                    "class": null,
                    "text": text,
                    "usage": usage_json(&usage),
                })));
            }
            return Err(WorkflowError::external_call(
                "llm",
                format!("reply '{}' matches none of the classes of node '{}'", text, node.key()),
            ));
        };

        debug!(node_key = node.key(), class = %class.label, "Question classified");

        let output = NodeOutput::new(json!({
            "class": class.label,
            "text": text,
            "usage": usage_json(&usage),
        }));
        Ok(match &class.next {
            Some(next) => output.with_next(next.clone()),
            None => output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::expression::{FieldDefinition, FieldType};
    use crate::domain::llm::MockLlmProvider;
    use crate::infrastructure::workflow::runtimes::testing::Harness;

    fn classifier(default_next: Option<&str>) -> NodeDefinition {
        let mut billing = ClassificationClass::new("billing").with_next("nodeBilling");
        billing.description = Some("Invoices and payments".to_string());

        let node = NodeDefinition::new(
            "classify",
            NodeKind::QuestionClassification(
                QuestionClassificationNode::new(
                    "gpt-4o-mini",
                    FieldDefinition::variable("question", FieldType::String, "input.q"),
                )
                .with_class(billing)
                .with_class(ClassificationClass::new("technical").with_next("nodeTech"))
                .with_class(ClassificationClass::new("other")),
            ),
        );
        match default_next {
            Some(next) => node.with_next(next),
            None => node,
        }
    }

    async fn classify(answer: &str, default_next: Option<&str>) -> Result<NodeOutput, WorkflowError> {
        let llm = Arc::new(MockLlmProvider::new("mock").with_answer(answer));
        let harness = Harness::new().with_inputs(json!({"q": "Why was I charged twice?"}));
        QuestionClassificationRuntime::new(Some(llm))
            .execute(&classifier(default_next), &harness.execution())
            .await
    }

    #[tokio::test]
    async fn test_exact_label_routes_to_class_successor() {
        let output = classify("\"Billing\".", None).await.unwrap();
        assert_eq!(output.output["class"], "billing");
        assert_eq!(output.next.as_deref(), Some("nodeBilling"));
    }

    #[tokio::test]
    async fn test_label_mentioned_in_reply() {
        let output = classify("This looks technical to me", None).await.unwrap();
        assert_eq!(output.output["class"], "technical");
        assert_eq!(output.next.as_deref(), Some("nodeTech"));
    }

    #[tokio::test]
    async fn test_class_without_successor_keeps_static_next() {
        let output = classify("other", Some("nodeFallback")).await.unwrap();
        assert_eq!(output.output["class"], "other");
        assert!(output.next.is_none());
    }

    #[tokio::test]
    async fn test_unmatched_reply() {
        let output = classify("no idea", Some("nodeFallback")).await.unwrap();
        assert!(output.output["class"].is_null());

        let err = classify("no idea", None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::ExternalCallFailure { .. }));
    }

    #[test]
    fn test_system_prompt_lists_classes() {
        let harness = Harness::new();
        let NodeKind::QuestionClassification(node) = classifier(None).kind().clone() else {
            panic!("expected classification node");
        };

        let prompt = QuestionClassificationRuntime::system_prompt(&node, &harness.context);
        assert!(prompt.contains("- billing: Invoices and payments\n"));
        assert!(prompt.contains("- other\n"));
    }
}
