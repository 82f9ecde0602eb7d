use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::domain::llm::{
    FinishReason, LlmProvider, LlmRequest, LlmResponse, LlmStream, Message, MessageRole,
    StreamChunk, Usage,
};
use crate::domain::DomainError;
use crate::infrastructure::http::HttpClientTrait;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// OpenAI-compatible chat completions provider
#[derive(Debug)]
pub struct OpenAiProvider<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
}

impl<C: HttpClientTrait> OpenAiProvider<C> {
    pub fn new(client: C, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_OPENAI_BASE_URL)
    }

    pub fn with_base_url(client: C, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            auth_header: format!("Bearer {}", api_key.into()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request(&self, model: &str, request: &LlmRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<OpenAiMessage> = request.messages.iter().map(OpenAiMessage::from_domain).collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<LlmResponse, DomainError> {
        let response: OpenAiResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider("openai", format!("Failed to parse response: {}", e))
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::provider("openai", "No choices in response"))?;

        let message = Message::assistant(choice.message.content.unwrap_or_default());
        let mut llm_response = LlmResponse::new(response.id, response.model, message);

        if let Some(reason) = choice.finish_reason {
            llm_response = llm_response.with_finish_reason(parse_finish_reason(&reason));
        }

        if let Some(usage) = response.usage {
            llm_response = llm_response.with_usage(usage.into());
        }

        Ok(llm_response)
    }
}

#[async_trait]
impl<C: HttpClientTrait> LlmProvider for OpenAiProvider<C> {
    async fn chat(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, DomainError> {
        let body = self.build_request(model, &request, false);
        let response = self
            .client
            .post_json(&self.chat_completions_url(), self.headers(), &body)
            .await?;

        self.parse_response(response)
    }

    async fn chat_stream(&self, model: &str, request: LlmRequest) -> Result<LlmStream, DomainError> {
        let body = self.build_request(model, &request, true);
        let byte_stream = self
            .client
            .post_json_stream(&self.chat_completions_url(), self.headers(), &body)
            .await?;

        // SSE events may straddle network chunks; carry the unfinished line over
        let stream = byte_stream
            .scan(String::new(), |buffer, result| {
                let events = match result {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        drain_sse_events(buffer)
                    }
                    Err(e) => vec![Err(e)],
                };
                future::ready(Some(stream::iter(events)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Parse every complete `data:` line in `buffer`, leaving any partial line behind
fn drain_sse_events(buffer: &mut String) -> Vec<Result<StreamChunk, DomainError>> {
    let Some(last_newline) = buffer.rfind('\n') else {
        return Vec::new();
    };
    let complete: String = buffer.drain(..=last_newline).collect();

    complete
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:").map(str::trim))
        .filter(|data| !data.is_empty() && *data != "[DONE]")
        .map(parse_stream_event)
        .collect()
}

fn parse_stream_event(data: &str) -> Result<StreamChunk, DomainError> {
    let chunk: OpenAiStreamChunk = serde_json::from_str(data).map_err(|e| {
        DomainError::provider("openai", format!("Malformed stream chunk: {}", e))
    })?;

    let mut stream_chunk = StreamChunk::new(chunk.id);
    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
            stream_chunk = stream_chunk.with_delta(delta);
        }
        if let Some(reason) = choice.finish_reason {
            stream_chunk = stream_chunk.with_finish_reason(parse_finish_reason(&reason));
        }
    }
    if let Some(usage) = chunk.usage {
        stream_chunk = stream_chunk.with_usage(usage.into());
    }

    Ok(stream_chunk)
}

fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> OpenAiMessage<'a> {
    fn from_domain(message: &'a Message) -> Self {
        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };

        Self {
            role,
            content: message.content_text(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    id: String,
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        Usage::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http::mock::MockHttpClient;
    use bytes::Bytes;

    const TEST_URL: &str = "https://api.openai.com/v1/chat/completions";

    #[tokio::test]
    async fn test_openai_chat() {
        let mock_response = serde_json::json!({
            "id": "chatcmpl-123",
            "model": "gpt-4o",
            "choices": [{
                "message": {"role": "assistant", "content": "Paris"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13}
        });

        let provider = OpenAiProvider::new(
            MockHttpClient::new().with_response(TEST_URL, mock_response),
            "test-api-key",
        );

        let request = LlmRequest::builder()
            .system("Answer in one word")
            .user("Capital of France?")
            .temperature(Some(0.0))
            .build();
        let response = provider.chat("gpt-4o", request).await.unwrap();

        assert_eq!(response.content(), "Paris");
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        assert_eq!(response.usage, Some(Usage::new(12, 1)));
    }

    #[tokio::test]
    async fn test_openai_request_body() {
        let client = MockHttpClient::new().with_error(TEST_URL, "unused");
        let provider = OpenAiProvider::new(client, "key");
        let request = LlmRequest::builder().user("hi").max_tokens(Some(16)).build();

        let _ = provider.chat("gpt-4o-mini", request).await;

        let bodies = provider.client.bodies();
        assert_eq!(bodies[0]["model"], "gpt-4o-mini");
        assert_eq!(bodies[0]["stream"], false);
        assert_eq!(bodies[0]["max_tokens"], 16);
        assert_eq!(bodies[0]["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_openai_error_handling() {
        let provider = OpenAiProvider::new(
            MockHttpClient::new().with_error(TEST_URL, "API key invalid"),
            "invalid-key",
        );

        let result = provider.chat("gpt-4o", LlmRequest::builder().user("Hello!").build()).await;
        assert!(matches!(result, Err(DomainError::Provider { .. })));
    }

    #[tokio::test]
    async fn test_openai_stream_across_chunk_boundaries() {
        let chunks = vec![
            Bytes::from("data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\ndata: {\"id\":\"c1\",\"choi"),
            Bytes::from("ces\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n"),
            Bytes::from("data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2}}\n\ndata: [DONE]\n\n"),
        ];
        let provider = OpenAiProvider::new(
            MockHttpClient::new().with_stream_response(TEST_URL, chunks),
            "key",
        );

        let stream = provider
            .chat_stream("gpt-4o", LlmRequest::builder().user("hi").build())
            .await
            .unwrap();
        let events: Vec<StreamChunk> = stream.map(|r| r.unwrap()).collect().await;

        let text: String = events.iter().filter_map(|c| c.delta.clone()).collect();
        assert_eq!(text, "Hello");
        assert_eq!(events[1].finish_reason, Some(FinishReason::Stop));
        assert_eq!(events.last().unwrap().usage, Some(Usage::new(3, 2)));
        assert_eq!(provider.client.bodies()[0]["stream_options"]["include_usage"], true);
    }

    #[tokio::test]
    async fn test_openai_custom_base_url() {
        let custom_url = "http://localhost:8080/v1/chat/completions";
        let mock_response = serde_json::json!({
            "id": "chatcmpl-custom",
            "model": "local",
            "choices": [{"message": {"content": "ok"}, "finish_reason": "stop"}]
        });

        let provider = OpenAiProvider::with_base_url(
            MockHttpClient::new().with_response(custom_url, mock_response),
            "test-key",
            "http://localhost:8080/",
        );

        let response = provider
            .chat("local", LlmRequest::builder().user("Test").build())
            .await
            .unwrap();
        assert_eq!(response.id, "chatcmpl-custom");
        assert!(response.usage.is_none());
    }
}
