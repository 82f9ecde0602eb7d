use async_trait::async_trait;
use std::fmt::Debug;
use std::pin::Pin;
use futures::Stream;

use super::response::StreamChunk;
use super::{LlmRequest, LlmResponse};
use crate::domain::DomainError;

/// Stream type for LLM responses
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, DomainError>> + Send>>;

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync + Debug {
    /// Send a chat completion request
    async fn chat(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, DomainError>;

    /// Send a streaming chat completion request
    async fn chat_stream(&self, model: &str, request: LlmRequest) -> Result<LlmStream, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::llm::{FinishReason, Message, Usage};
    use futures::stream;

    /// Answers every request with a fixed text, streamed word by word
    #[derive(Debug)]
    pub struct MockLlmProvider {
        name: &'static str,
        answer: Option<String>,
        usage: Usage,
        error: Option<String>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl MockLlmProvider {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                answer: None,
                usage: Usage::default(),
                error: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
            self.answer = Some(answer.into());
            self
        }

        pub fn with_usage(mut self, usage: Usage) -> Self {
            self.usage = usage;
            self
        }

        pub fn with_error(mut self, error: impl Into<String>) -> Self {
            self.error = Some(error.into());
            self
        }

        /// Requests received so far
        pub fn requests(&self) -> Vec<LlmRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn answer(&self, request: LlmRequest) -> Result<String, DomainError> {
            self.requests.lock().unwrap().push(request);
            if let Some(ref error) = self.error {
                return Err(DomainError::provider(self.name, error));
            }
            self.answer
                .clone()
                .ok_or_else(|| DomainError::provider(self.name, "No mock response configured"))
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn chat(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, DomainError> {
            let answer = self.answer(request)?;
            Ok(LlmResponse::new("mock-response", model, Message::assistant(answer))
                .with_finish_reason(FinishReason::Stop)
                .with_usage(self.usage))
        }

        async fn chat_stream(
            &self,
            _model: &str,
            request: LlmRequest,
        ) -> Result<LlmStream, DomainError> {
            let answer = self.answer(request)?;

            let mut chunks: Vec<Result<StreamChunk, DomainError>> = answer
                .split_inclusive(' ')
                .map(|word| Ok(StreamChunk::new("mock-stream").with_delta(word)))
                .collect();
            chunks.push(Ok(StreamChunk::new("mock-stream")
                .with_finish_reason(FinishReason::Stop)
                .with_usage(self.usage)));

            Ok(Box::pin(stream::iter(chunks)))
        }

        fn provider_name(&self) -> &'static str {
            self.name
        }
    }
}
