//! Workflow executor implementation

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::domain::workflow::{
    EventSink, ExecutionLimits, ExecutionRequest, NodeDefinition, NodeExecution, NodeOutput,
    NodeRuntimeRegistry, WorkflowContext, WorkflowDefinition, WorkflowError, WorkflowEventStream,
    WorkflowExecutor, WorkflowProcessingItem,
};

/// Configuration for the workflow executor
#[derive(Debug, Clone)]
pub struct WorkflowExecutorConfig {
    /// Maximum number of node visits per instance
    pub max_steps: usize,

    /// Maximum collection size a For node will iterate
    pub max_loop_iterations: usize,

    /// Events buffered before the instance waits for the consumer
    pub event_buffer: usize,
}

impl Default for WorkflowExecutorConfig {
    fn default() -> Self {
        let limits = ExecutionLimits::default();
        Self {
            max_steps: limits.max_steps,
            max_loop_iterations: limits.max_loop_iterations,
            event_buffer: 32,
        }
    }
}

impl WorkflowExecutorConfig {
    fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            max_steps: self.max_steps,
            max_loop_iterations: self.max_loop_iterations,
        }
    }
}

/// Walks a workflow graph node by node, one spawned task per instance
#[derive(Debug, Clone)]
pub struct WorkflowRuntime {
    registry: Arc<NodeRuntimeRegistry>,
    config: WorkflowExecutorConfig,
}

impl WorkflowRuntime {
    pub fn new(registry: Arc<NodeRuntimeRegistry>) -> Self {
        Self::with_config(registry, WorkflowExecutorConfig::default())
    }

    pub fn with_config(registry: Arc<NodeRuntimeRegistry>, config: WorkflowExecutorConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &NodeRuntimeRegistry {
        &self.registry
    }
}

impl WorkflowExecutor for WorkflowRuntime {
    fn execute(
        &self,
        definition: Arc<WorkflowDefinition>,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<WorkflowEventStream, WorkflowError> {
        definition.validate()?;

        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let span = info_span!(
            "workflow",
            instance_id = %request.instance_id,
            workflow_id = %definition.id()
        );

        let instance = Instance {
            events: EventSink::new(request.instance_id.clone(), tx),
            context: WorkflowContext::new(
                request.instance_id,
                request.startup_parameters,
                request.system_variables,
            ),
            definition,
            registry: self.registry.clone(),
            cancel: cancel.clone(),
            limits: self.config.limits(),
        };
        tokio::spawn(instance.run().instrument(span));

        let stream = ReceiverStream::new(rx).take_until(cancel.cancelled_owned());
        Ok(Box::pin(stream))
    }
}

/// State of one running instance, owned by its task
struct Instance {
    definition: Arc<WorkflowDefinition>,
    registry: Arc<NodeRuntimeRegistry>,
    context: WorkflowContext,
    events: EventSink,
    cancel: CancellationToken,
    limits: ExecutionLimits,
}

impl Instance {
    async fn run(mut self) {
        let definition = self.definition.clone();
        let Some(start) = definition.start_node() else {
            return;
        };

        info!("Workflow instance started");

        let mut current = start;
        let mut visited: HashSet<&str> = HashSet::new();
        let mut steps = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                info!(node_key = current.key(), "Workflow instance cancelled");
                return;
            }

            steps += 1;
            if !visited.insert(current.key()) {
                self.fail(current, WorkflowError::cycle_detected(current.key())).await;
                return;
            }
            if steps > self.limits.max_steps {
                let err = WorkflowError::definition_invalid(format!(
                    "step budget of {} exhausted",
                    self.limits.max_steps
                ));
                self.fail(current, err).await;
                return;
            }

            let output = match self.execute_node(current).await {
                Ok(output) => output,
                Err(WorkflowError::Cancelled) => {
                    info!(node_key = current.key(), "Workflow instance cancelled");
                    return;
                }
                Err(err) => {
                    self.fail(current, err).await;
                    return;
                }
            };

            let next = output.next.clone().or_else(|| current.next().map(str::to_string));
            let terminal = output.terminal;

            self.context.record_node_output(current.key(), output.output.clone());
            let item = WorkflowProcessingItem::succeeded(
                self.context.instance_id(),
                current,
                output.output,
            );
            if self.events.emit(item).await.is_err() {
                debug!("Event consumer went away, stopping");
                return;
            }

            if terminal {
                info!(node_key = current.key(), "Workflow instance completed");
                return;
            }

            let Some(next_key) = next else {
                info!(node_key = current.key(), "No successor, workflow instance completed");
                return;
            };
            current = match definition.node(&next_key) {
                Some(node) => node,
                None => {
                    let err = WorkflowError::definition_invalid(format!(
                        "node '{}' points to unknown node '{}'",
                        current.key(),
                        next_key
                    ));
                    self.fail(current, err).await;
                    return;
                }
            };
        }
    }

    async fn execute_node(&self, node: &NodeDefinition) -> Result<NodeOutput, WorkflowError> {
        let runtime = self.registry.get_runtime(node.node_type())?;
        debug!(node_key = node.key(), node_type = %node.node_type(), "Executing node");

        let execution = NodeExecution {
            definition: &self.definition,
            context: &self.context,
            registry: &self.registry,
            events: &self.events,
            cancel: &self.cancel,
            limits: self.limits,
        };

        let run = AssertUnwindSafe(runtime.execute(node, &execution)).catch_unwind();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WorkflowError::Cancelled),
            result = run => result.unwrap_or_else(|panic| {
                Err(WorkflowError::node_panicked(panic_message(panic.as_ref())))
            }),
        }
    }

    async fn fail(&self, node: &NodeDefinition, error: WorkflowError) {
        warn!(
            node_key = node.key(),
            node_type = %node.node_type(),
            kind = ?error.kind(),
            error = %error,
            "Node failed, stopping workflow instance"
        );
        let item = WorkflowProcessingItem::failed(self.context.instance_id(), node, &error);
        let _ = self.events.emit(item).await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
