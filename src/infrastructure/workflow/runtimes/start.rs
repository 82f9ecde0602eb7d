use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::fields::resolve_inputs;
use super::{kind_mismatch, require};
use crate::domain::expression::{
    convert_type, flatten_into, unflatten_object, ExpressionEvaluator, FlatMap,
};
use crate::domain::workflow::{
    NodeDefinition, NodeExecution, NodeKind, NodeOutput, NodeRuntime, NodeType, ScriptSandbox,
    StartNode, StartOutputMode, WorkflowContext, WorkflowError,
};

/// Builds the instance's initial variables
#[derive(Debug, Default)]
pub struct StartRuntime {
    sandbox: Option<Arc<dyn ScriptSandbox>>,
}

impl StartRuntime {
    pub fn new(sandbox: Option<Arc<dyn ScriptSandbox>>) -> Self {
        Self { sandbox }
    }

    /// Startup parameters for declared fields, the field's own expression otherwise
    fn fixed_output(start: &StartNode, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        let parameters = context.runtime_parameters();
        if start.inputs.is_empty() {
            return Ok(Value::Object(parameters.clone()));
        }

        let document = context.document();
        let evaluator = ExpressionEvaluator::new(&document, context.flatten_variables())
            .with_fallback(context);

        let mut output = FlatMap::new();
        for field in &start.inputs {
            match parameters.get(&field.name) {
                Some(value) if field.field_type.is_structural() => {
                    flatten_into(&field.name, value, &mut output);
                }
                Some(value) => {
                    output.insert(field.name.clone(), convert_type(value, field.field_type)?);
                }
                None => output.extend(evaluator.parse_field_value(field)?),
            }
        }

        unflatten_object(&output)
    }

    async fn script_output(
        &self,
        node: &NodeDefinition,
        start: &StartNode,
        execution: &NodeExecution<'_>,
    ) -> Result<Value, WorkflowError> {
        let script = start.script.as_deref().ok_or_else(|| {
            WorkflowError::definition_invalid(format!(
                "start node '{}' uses script output without a script",
                node.key()
            ))
        })?;
        let sandbox = require(&self.sandbox, "script")?;

        let input = json!({
            "parameters": execution.context.runtime_parameters(),
            "sys": execution.context.system_variables(),
            "globals": execution.definition.globals(),
        });

        Ok(sandbox.execute(script, input).await?)
    }
}

#[async_trait]
impl NodeRuntime for StartRuntime {
    fn node_type(&self) -> NodeType {
        NodeType::Start
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        execution: &NodeExecution<'_>,
    ) -> Result<NodeOutput, WorkflowError> {
        let NodeKind::Start(start) = node.kind() else {
            return Err(kind_mismatch(node, NodeType::Start));
        };

        debug!(node_key = node.key(), mode = ?start.output_mode, "Deriving start output");

        let output = match start.output_mode {
            StartOutputMode::Fixed => Self::fixed_output(start, execution.context)?,
            StartOutputMode::Dynamic => resolve_inputs(&start.inputs, execution.context)?,
            StartOutputMode::Script => self.script_output(node, start, execution).await?,
        };

        Ok(NodeOutput::new(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::expression::{FieldDefinition, FieldType};
    use crate::domain::workflow::mock::MockScriptSandbox;
    use crate::domain::workflow::WorkflowDefinition;
    use crate::infrastructure::workflow::runtimes::testing::Harness;

    fn start_node(start: StartNode) -> NodeDefinition {
        NodeDefinition::new("start", NodeKind::Start(start)).with_next("end")
    }

    #[tokio::test]
    async fn test_passes_parameters_through_without_fields() {
        let harness = Harness::new().with_inputs(json!({"name": "Ann", "age": 30}));
        let node = start_node(StartNode::new());

        let output = StartRuntime::default()
            .execute(&node, &harness.execution())
            .await
            .unwrap();

        assert_eq!(output.output, json!({"name": "Ann", "age": 30}));
        assert!(output.next.is_none());
        assert!(!output.terminal);
    }

    #[tokio::test]
    async fn test_fixed_fields_coerce_and_default() {
        let harness = Harness::new().with_inputs(json!({"age": "41", "tags": ["x"], "extra": 1}));
        let node = start_node(
            StartNode::new()
                .with_input(FieldDefinition::new("age", FieldType::Integer))
                .with_input(FieldDefinition::new("tags", FieldType::Array))
                .with_input(FieldDefinition::fixed("lang", FieldType::String, "en")),
        );

        let output = StartRuntime::default()
            .execute(&node, &harness.execution())
            .await
            .unwrap();

        assert_eq!(output.output, json!({"age": 41, "tags": ["x"], "lang": "en"}));
    }

    #[tokio::test]
    async fn test_fixed_field_rejects_bad_parameter() {
        let harness = Harness::new().with_inputs(json!({"age": "old"}));
        let node = start_node(StartNode::new().with_input(FieldDefinition::new("age", FieldType::Number)));

        let err = StartRuntime::default()
            .execute(&node, &harness.execution())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::TypeConversion { .. }));
    }

    #[tokio::test]
    async fn test_dynamic_mode_evaluates_expressions() {
        let harness = Harness::new().with_inputs(json!({"first": "Ann", "last": "Lee"}));
        let node = start_node(
            StartNode::new()
                .with_output_mode(StartOutputMode::Dynamic)
                .with_input(FieldDefinition::interpolated("full", "{input.first} {input.last}")),
        );

        let output = StartRuntime::default()
            .execute(&node, &harness.execution())
            .await
            .unwrap();
        assert_eq!(output.output, json!({"full": "Ann Lee"}));
    }

    #[tokio::test]
    async fn test_script_mode_receives_parameters_and_globals() {
        let definition = WorkflowDefinition::new("wf", "Scripted").with_global("region", json!("eu"));
        let harness = Harness::new()
            .with_inputs(json!({"q": 1}))
            .with_definition(definition);
        let node = start_node(
            StartNode::new()
                .with_output_mode(StartOutputMode::Script)
                .with_script("echo"),
        );

        let runtime = StartRuntime::new(Some(Arc::new(MockScriptSandbox)));
        let output = runtime.execute(&node, &harness.execution()).await.unwrap();

        assert_eq!(
            output.output,
            json!({"parameters": {"q": 1}, "sys": {}, "globals": {"region": "eu"}})
        );
    }

    #[tokio::test]
    async fn test_script_mode_requires_script_and_sandbox() {
        let harness = Harness::new();
        let without_script = start_node(StartNode::new().with_output_mode(StartOutputMode::Script));
        let err = StartRuntime::new(Some(Arc::new(MockScriptSandbox)))
            .execute(&without_script, &harness.execution())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DefinitionInvalid(_)));

        let with_script = start_node(
            StartNode::new()
                .with_output_mode(StartOutputMode::Script)
                .with_script("echo"),
        );
        let err = StartRuntime::default()
            .execute(&with_script, &harness.execution())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ExternalCallFailure { .. }));
    }
}
