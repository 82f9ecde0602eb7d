use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::fields::derive_outputs;
use super::kind_mismatch;
use crate::domain::expression::evaluate_condition;
use crate::domain::workflow::{
    ConditionNode, NodeDefinition, NodeExecution, NodeKind, NodeOutput, NodeRuntime, NodeType,
    WorkflowContext, WorkflowError,
};

/// Routes to the first branch whose rule holds, else to the fallback
#[derive(Debug, Default)]
pub struct ConditionRuntime;

impl ConditionRuntime {
    fn select_branch<'n>(
        condition: &'n ConditionNode,
        context: &WorkflowContext,
    ) -> Result<(String, &'n str), WorkflowError> {
        if evaluate_condition(&condition.if_branch.expression, context)? {
            return Ok(("if".to_string(), condition.if_branch.next.as_str()));
        }

        for (index, branch) in condition.else_ifs.iter().enumerate() {
            if evaluate_condition(&branch.expression, context)? {
                return Ok((format!("else_if[{}]", index), branch.next.as_str()));
            }
        }

        Ok(("else".to_string(), condition.else_next.as_str()))
    }
}

#[async_trait]
impl NodeRuntime for ConditionRuntime {
    fn node_type(&self) -> NodeType {
        NodeType::Condition
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        execution: &NodeExecution<'_>,
    ) -> Result<NodeOutput, WorkflowError> {
        let NodeKind::Condition(condition) = node.kind() else {
            return Err(kind_mismatch(node, NodeType::Condition));
        };

        let (branch, next) = Self::select_branch(condition, execution.context)?;
        debug!(node_key = node.key(), branch = %branch, next, "Condition branch selected");

        let decision = json!({"branch": branch, "next": next});
        let output = derive_outputs(&condition.outputs, &decision, execution.context)?;

        Ok(NodeOutput::new(output).with_next(next))
    }
}
