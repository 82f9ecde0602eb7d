//! Node runtime implementations, one per node type

mod ai_question;
mod classification;
mod condition;
mod end;
mod fields;
mod for_loop;
mod http;
mod javascript;
mod plugin;
mod start;
mod wiki;

use std::sync::Arc;

pub use ai_question::AiQuestionRuntime;
pub use classification::QuestionClassificationRuntime;
pub use condition::ConditionRuntime;
pub use end::EndRuntime;
pub use for_loop::ForRuntime;
pub use http::HttpRuntime;
pub use javascript::JavaScriptRuntime;
pub use plugin::PluginRuntime;
pub use start::StartRuntime;
pub use wiki::WikiRuntime;

use crate::domain::workflow::{
    HttpInvoker, KnowledgeBaseSearcher, NodeDefinition, NodeRuntimeRegistry, NodeType,
    PluginInvoker, ScriptSandbox, WorkflowError,
};
use crate::domain::LlmProvider;

/// External systems available to node runtimes
///
/// A missing collaborator only fails the nodes that need it.
#[derive(Debug, Clone, Default)]
pub struct Collaborators {
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub http: Option<Arc<dyn HttpInvoker>>,
    pub plugins: Option<Arc<dyn PluginInvoker>>,
    pub knowledge_base: Option<Arc<dyn KnowledgeBaseSearcher>>,
    pub sandbox: Option<Arc<dyn ScriptSandbox>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_http(mut self, http: Arc<dyn HttpInvoker>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_plugins(mut self, plugins: Arc<dyn PluginInvoker>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn with_knowledge_base(mut self, knowledge_base: Arc<dyn KnowledgeBaseSearcher>) -> Self {
        self.knowledge_base = Some(knowledge_base);
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn ScriptSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }
}

/// Registry with a runtime for every node type
pub fn default_registry(collaborators: &Collaborators) -> NodeRuntimeRegistry {
    NodeRuntimeRegistry::new()
        .with_runtime(Arc::new(StartRuntime::new(collaborators.sandbox.clone())))
        .with_runtime(Arc::new(EndRuntime))
        .with_runtime(Arc::new(ConditionRuntime))
        .with_runtime(Arc::new(AiQuestionRuntime::new(collaborators.llm.clone())))
        .with_runtime(Arc::new(QuestionClassificationRuntime::new(
            collaborators.llm.clone(),
        )))
        .with_runtime(Arc::new(HttpRuntime::new(collaborators.http.clone())))
        .with_runtime(Arc::new(PluginRuntime::new(collaborators.plugins.clone())))
        .with_runtime(Arc::new(WikiRuntime::new(
            collaborators.knowledge_base.clone(),
        )))
        .with_runtime(Arc::new(JavaScriptRuntime::new(collaborators.sandbox.clone())))
        .with_runtime(Arc::new(ForRuntime))
}

/// Borrow a configured collaborator or fail the node
fn require<'a, T: ?Sized>(
    collaborator: &'a Option<Arc<T>>,
    name: &str,
) -> Result<&'a T, WorkflowError> {
    collaborator.as_deref().ok_or_else(|| {
        WorkflowError::external_call(name, format!("no {} collaborator is configured", name))
    })
}

fn kind_mismatch(node: &NodeDefinition, expected: NodeType) -> WorkflowError {
    WorkflowError::definition_invalid(format!(
        "node '{}' is a {} node, expected {}",
        node.key(),
        node.node_type(),
        expected
    ))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Harness for running a single node outside the executor

    use serde_json::{Map, Value};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::domain::workflow::{
        EventSink, ExecutionLimits, NodeExecution, NodeRuntimeRegistry, WorkflowContext,
        WorkflowDefinition, WorkflowProcessingItem,
    };

    pub struct Harness {
        pub definition: WorkflowDefinition,
        pub context: WorkflowContext,
        pub registry: NodeRuntimeRegistry,
        pub events: EventSink,
        pub cancel: CancellationToken,
        pub limits: ExecutionLimits,
        receiver: Option<mpsc::Receiver<WorkflowProcessingItem>>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                definition: WorkflowDefinition::new("wf-test", "Test"),
                context: WorkflowContext::new("instance-1", Map::new(), Map::new()),
                registry: NodeRuntimeRegistry::new(),
                events: EventSink::discard("instance-1"),
                cancel: CancellationToken::new(),
                limits: ExecutionLimits::default(),
                receiver: None,
            }
        }

        /// Replaces the context; call before `with_output`
        pub fn with_inputs(mut self, inputs: Value) -> Self {
            let parameters = inputs.as_object().cloned().unwrap_or_default();
            self.context = WorkflowContext::new("instance-1", parameters, Map::new());
            self
        }

        pub fn with_output(mut self, node_key: &str, output: Value) -> Self {
            self.context.record_node_output(node_key, output);
            self
        }

        pub fn with_definition(mut self, definition: WorkflowDefinition) -> Self {
            self.definition = definition;
            self
        }

        pub fn with_registry(mut self, registry: NodeRuntimeRegistry) -> Self {
            self.registry = registry;
            self
        }

        pub fn with_events(mut self) -> Self {
            let (tx, rx) = mpsc::channel(64);
            self.events = EventSink::new("instance-1", tx);
            self.receiver = Some(rx);
            self
        }

        pub fn execution(&self) -> NodeExecution<'_> {
            NodeExecution {
                definition: &self.definition,
                context: &self.context,
                registry: &self.registry,
                events: &self.events,
                cancel: &self.cancel,
                limits: self.limits,
            }
        }

        /// Events emitted so far
        pub fn drain(&mut self) -> Vec<WorkflowProcessingItem> {
            let mut items = Vec::new();
            if let Some(rx) = self.receiver.as_mut() {
                while let Ok(item) = rx.try_recv() {
                    items.push(item);
                }
            }
            items
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_every_type() {
        let registry = default_registry(&Collaborators::new());
        for node_type in NodeType::ALL {
            assert!(registry.is_registered(node_type), "{} missing", node_type);
        }
    }

    #[test]
    fn test_require_missing_collaborator() {
        let missing: Option<Arc<dyn PluginInvoker>> = None;
        let err = require(&missing, "plugin").unwrap_err();
        assert_eq!(
            err,
            WorkflowError::external_call("plugin", "no plugin collaborator is configured")
        );
    }
}
