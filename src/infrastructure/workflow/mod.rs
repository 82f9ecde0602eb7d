//! Workflow engine: node runtimes and the instance executor

mod executor_impl;
pub mod runtimes;

pub use executor_impl::{WorkflowExecutorConfig, WorkflowRuntime};
pub use runtimes::{default_registry, Collaborators};
