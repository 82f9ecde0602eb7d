use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::fields::{derive_outputs, resolve_headers, resolve_inputs};
use super::{kind_mismatch, require};
use crate::domain::workflow::{
    NodeDefinition, NodeExecution, NodeKind, NodeOutput, NodeRuntime, NodeType, PluginCall,
    PluginInvoker, WorkflowError,
};

#[derive(Debug, Default)]
pub struct PluginRuntime {
    plugins: Option<Arc<dyn PluginInvoker>>,
}

impl PluginRuntime {
    pub fn new(plugins: Option<Arc<dyn PluginInvoker>>) -> Self {
        Self { plugins }
    }
}

#[async_trait]
impl NodeRuntime for PluginRuntime {
    fn node_type(&self) -> NodeType {
        NodeType::Plugin
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        execution: &NodeExecution<'_>,
    ) -> Result<NodeOutput, WorkflowError> {
        let NodeKind::Plugin(plugin) = node.kind() else {
            return Err(kind_mismatch(node, NodeType::Plugin));
        };
        let plugins = require(&self.plugins, "plugin")?;

        let call = PluginCall {
            plugin_id: plugin.plugin_id.clone(),
            action: plugin.action.clone(),
            inputs: resolve_inputs(&plugin.inputs, execution.context)?,
            headers: resolve_headers(&plugin.headers, execution.context)?,
        };

        debug!(node_key = node.key(), plugin_id = %call.plugin_id, action = %call.action, "Invoking plugin");

        let response = plugins.invoke(call).await?;
        let output = derive_outputs(&plugin.outputs, &response, execution.context)?;
        Ok(NodeOutput::new(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::expression::{FieldDefinition, FieldType};
    use crate::domain::workflow::mock::EchoPluginInvoker;
    use crate::domain::workflow::PluginNode;
    use crate::infrastructure::workflow::runtimes::testing::Harness;
    use serde_json::json;

    #[tokio::test]
    async fn test_invokes_plugin_with_resolved_inputs() {
        let harness = Harness::new()
            .with_inputs(json!({"city": "Oslo"}))
            .with_output("geo", json!({"coords": {"lat": 59.9, "lon": 10.7}}));
        let node = NodeDefinition::new(
            "weather",
            NodeKind::Plugin(
                PluginNode::new("weather-plugin", "forecast")
                    .with_input(FieldDefinition::variable("city", FieldType::String, "input.city"))
                    .with_input(FieldDefinition::variable("at", FieldType::Object, "geo.coords"))
                    .with_output(FieldDefinition::json_path("lat", FieldType::Number, "$.inputs.at.lat"))
                    .with_output(FieldDefinition::interpolated("label", "{action} in {inputs.city}")),
            ),
        )
        .with_next("end");

        let output = PluginRuntime::new(Some(Arc::new(EchoPluginInvoker)))
            .execute(&node, &harness.execution())
            .await
            .unwrap();

        assert_eq!(output.output, json!({"lat": 59.9, "label": "forecast in Oslo"}));
    }

    #[tokio::test]
    async fn test_without_outputs_returns_response() {
        let harness = Harness::new();
        let node = NodeDefinition::new("p", NodeKind::Plugin(PluginNode::new("crm", "sync")));

        let output = PluginRuntime::new(Some(Arc::new(EchoPluginInvoker)))
            .execute(&node, &harness.execution())
            .await
            .unwrap();
        assert_eq!(
            output.output,
            json!({"plugin_id": "crm", "action": "sync", "inputs": {}})
        );
    }

    #[tokio::test]
    async fn test_requires_plugin_collaborator() {
        let harness = Harness::new();
        let node = NodeDefinition::new("p", NodeKind::Plugin(PluginNode::new("crm", "sync")));

        let err = PluginRuntime::default()
            .execute(&node, &harness.execution())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::external_call("plugin", "no plugin collaborator is configured")
        );
    }
}
