//! Infrastructure layer - External service implementations

pub mod http;
pub mod llm;
pub mod logging;
pub mod workflow;
