use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::fields::derive_outputs;
use super::kind_mismatch;
use crate::domain::workflow::{
    resolve_variable, NodeDefinition, NodeExecution, NodeKind, NodeOutput, NodeRuntime, NodeType,
    WorkflowError,
};

/// Runs the loop body once per collection element
///
/// Each iteration sees a copy of the instance context where the loop's own key
/// is bound to `{item, index}`; body outputs are collected into
/// `{results, count}` in collection order.
#[derive(Debug, Default)]
pub struct ForRuntime;

#[async_trait]
impl NodeRuntime for ForRuntime {
    fn node_type(&self) -> NodeType {
        NodeType::For
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        execution: &NodeExecution<'_>,
    ) -> Result<NodeOutput, WorkflowError> {
        let NodeKind::For(for_node) = node.kind() else {
            return Err(kind_mismatch(node, NodeType::For));
        };

        let items = match resolve_variable(&for_node.collection, execution.context)? {
            Value::Array(items) => items,
            other => return Err(WorkflowError::type_conversion(other, "Array")),
        };
        if items.len() > execution.limits.max_loop_iterations {
            return Err(WorkflowError::index_out_of_range(
                &for_node.collection,
                format!(
                    "{} items exceed the loop limit of {}",
                    items.len(),
                    execution.limits.max_loop_iterations
                ),
            ));
        }

        let body = execution.definition.node(&for_node.body).ok_or_else(|| {
            WorkflowError::definition_invalid(format!(
                "loop '{}' references unknown body node '{}'",
                node.key(),
                for_node.body
            ))
        })?;
        let runtime = execution.registry.get_runtime(body.node_type())?;

        debug!(node_key = node.key(), body = body.key(), items = items.len(), "Running loop");

        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            if execution.cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }

            let mut scope = execution.context.clone();
            scope.record_node_output(node.key(), json!({"item": item, "index": index}));

            let iteration = runtime.execute(body, &execution.with_context(&scope)).await?;
            execution
                .events
                .partial(node, json!({"index": index, "output": iteration.output}))
                .await?;
            results.push(iteration.output);
        }

        let aggregate = json!({"count": results.len(), "results": results});
        let output = derive_outputs(&for_node.outputs, &aggregate, execution.context)?;
        Ok(NodeOutput::new(output))
    }
}
