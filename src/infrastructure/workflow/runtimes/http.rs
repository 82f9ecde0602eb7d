use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::fields::{derive_outputs, interpolate, resolve_headers, resolve_inputs};
use super::{kind_mismatch, require};
use crate::domain::workflow::{
    HttpCall, HttpInvoker, NodeDefinition, NodeExecution, NodeKind, NodeOutput, NodeRuntime,
    NodeType, WorkflowError,
};

/// Calls an HTTP endpoint and derives outputs from the response body
#[derive(Debug, Default)]
pub struct HttpRuntime {
    invoker: Option<Arc<dyn HttpInvoker>>,
}

impl HttpRuntime {
    pub fn new(invoker: Option<Arc<dyn HttpInvoker>>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl NodeRuntime for HttpRuntime {
    fn node_type(&self) -> NodeType {
        NodeType::Http
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        execution: &NodeExecution<'_>,
    ) -> Result<NodeOutput, WorkflowError> {
        let NodeKind::Http(http) = node.kind() else {
            return Err(kind_mismatch(node, NodeType::Http));
        };
        let invoker = require(&self.invoker, "http")?;
        let context = execution.context;

        let body = if http.inputs.is_empty() {
            None
        } else {
            Some(resolve_inputs(&http.inputs, context)?)
        };
        let call = HttpCall {
            method: http.method,
            url: interpolate(&http.url, context),
            headers: resolve_headers(&http.headers, context)?,
            body,
            timeout: http.timeout_ms.map(Duration::from_millis),
        };

        let mut attempt = 0;
        let reply = loop {
            match invoker.send(call.clone()).await {
                Ok(reply) => break reply,
                Err(err @ WorkflowError::ExternalCallFailure { .. }) if attempt < http.retries => {
                    attempt += 1;
                    warn!(
                        node_key = node.key(),
                        attempt,
                        retries = http.retries,
                        error = %err,
                        "HTTP call failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(http.retry_delay_ms)).await;
                }
                Err(err) => return Err(err),
            }
        };

        debug!(node_key = node.key(), status = reply.status, "HTTP call completed");

        let output = derive_outputs(&http.outputs, &reply.body, context)?;
        Ok(NodeOutput::new(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::expression::{FieldDefinition, FieldType};
    use crate::domain::workflow::mock::MockHttpInvoker;
    use crate::domain::workflow::{HttpMethod, HttpNode};
    use crate::infrastructure::workflow::runtimes::testing::Harness;
    use serde_json::json;

    fn order_node(retries: u32) -> NodeDefinition {
        NodeDefinition::new(
            "order",
            NodeKind::Http(
                HttpNode::new(HttpMethod::POST, "https://shop.example.com/users/{input.user_id}/orders")
                    .with_header(FieldDefinition::fixed("x-api-key", FieldType::String, "k-1"))
                    .with_input(FieldDefinition::variable("sku", FieldType::String, "input.sku"))
                    .with_input(FieldDefinition::fixed("qty", FieldType::Integer, "2"))
                    .with_output(FieldDefinition::json_path("order_id", FieldType::String, "$.order.id"))
                    .with_output(FieldDefinition::variable("state", FieldType::String, "order.state"))
                    .with_retries(retries),
            ),
        )
        .with_next("end")
    }

    fn harness() -> Harness {
        Harness::new().with_inputs(json!({"user_id": 42, "sku": "A1"}))
    }

    #[tokio::test]
    async fn test_builds_call_and_derives_outputs() {
        let invoker = Arc::new(
            MockHttpInvoker::new().with_reply(201, json!({"order": {"id": "o-9", "state": "new"}})),
        );

        let output = HttpRuntime::new(Some(invoker.clone()))
            .execute(&order_node(0), &harness().execution())
            .await
            .unwrap();

        assert_eq!(output.output, json!({"order_id": "o-9", "state": "new"}));

        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, HttpMethod::POST);
        assert_eq!(calls[0].url, "https://shop.example.com/users/42/orders");
        assert_eq!(calls[0].headers.get("x-api-key").map(String::as_str), Some("k-1"));
        assert_eq!(calls[0].body, Some(json!({"sku": "A1", "qty": 2})));
    }

    #[tokio::test]
    async fn test_retries_external_failures() {
        let invoker = Arc::new(
            MockHttpInvoker::new()
                .with_failure("HTTP 503")
                .with_failure("HTTP 502")
                .with_reply(200, json!({"order": {"id": "o-1", "state": "ok"}})),
        );

        let output = HttpRuntime::new(Some(invoker.clone()))
            .execute(&order_node(2), &harness().execution())
            .await
            .unwrap();

        assert_eq!(output.output["order_id"], "o-1");
        assert_eq!(invoker.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_between_retries() {
        let invoker = Arc::new(
            MockHttpInvoker::new()
                .with_failure("HTTP 503")
                .with_failure("HTTP 503")
                .with_reply(200, json!({"order": {"id": "o-2", "state": "ok"}})),
        );
        let node = NodeDefinition::new(
            "order",
            NodeKind::Http(
                HttpNode::new(HttpMethod::GET, "https://shop.example.com/orders/latest")
                    .with_output(FieldDefinition::json_path("order_id", FieldType::String, "$.order.id"))
                    .with_retries(2)
                    .with_retry_delay_ms(1_500),
            ),
        );

        let started = tokio::time::Instant::now();
        let output = HttpRuntime::new(Some(invoker.clone()))
            .execute(&node, &harness().execution())
            .await
            .unwrap();

        assert_eq!(output.output["order_id"], "o-2");
        assert_eq!(invoker.calls().len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(3_000));
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let invoker = Arc::new(
            MockHttpInvoker::new()
                .with_failure("HTTP 503")
                .with_failure("HTTP 503"),
        );

        let err = HttpRuntime::new(Some(invoker.clone()))
            .execute(&order_node(1), &harness().execution())
            .await
            .unwrap_err();

        assert_eq!(err, WorkflowError::external_call("http", "HTTP 503"));
        assert_eq!(invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_get_without_body_passes_response_through() {
        let invoker = Arc::new(MockHttpInvoker::new().with_reply(200, json!({"pong": true})));
        let node = NodeDefinition::new(
            "ping",
            NodeKind::Http(HttpNode::new(HttpMethod::GET, "https://status.example.com/ping")),
        );

        let output = HttpRuntime::new(Some(invoker.clone()))
            .execute(&node, &harness().execution())
            .await
            .unwrap();

        assert_eq!(output.output, json!({"pong": true}));
        assert_eq!(invoker.calls()[0].body, None);
    }
}
