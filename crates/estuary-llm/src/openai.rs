// OpenAI-specific client implementation

use crate::streaming::{parse_chat_sse_stream, StreamEvent};
use crate::traits::{ChatClient, ChatOptions, ChatRequest, ChatResponse, JsonSchemaFormat};
use anyhow::{Context, Result};
use async_trait::async_trait;
use estuary_types::Message;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI chat-completions client (HTTP direct, no SDK)
pub struct OpenAiClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    /// Create new client with API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Invalid API key format")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    /// Point the client at a compatible server (useful for tests/proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build chat completion request payload
    fn build_chat_request(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
        stream: bool,
        format: Option<&JsonSchemaFormat>,
    ) -> Value {
        let openai_messages: Vec<Value> = messages.iter().map(convert_message).collect();

        let mut request = serde_json::json!({
            "model": model,
            "messages": openai_messages,
            "stream": stream,
        });

        if let Some(obj) = request.as_object_mut() {
            if let Some(temp) = options.temperature {
                obj.insert("temperature".to_string(), serde_json::json!(temp));
            }
            if let Some(max_tokens) = options.max_tokens {
                obj.insert("max_tokens".to_string(), serde_json::json!(max_tokens));
            }
            if let Some(format) = format {
                obj.insert(
                    "response_format".to_string(),
                    serde_json::json!({
                        "type": "json_schema",
                        "json_schema": {
                            "name": format.name,
                            "schema": format.schema,
                        },
                    }),
                );
            }
        }

        request
    }

    async fn post_chat(&self, payload: &Value) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(payload)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
        }

        Ok(response)
    }
}

/// Convert our Message type to OpenAI format
fn convert_message(message: &Message) -> Value {
    serde_json::json!({
        "role": message.role_str(),
        "content": message.content,
    })
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let payload = self.build_chat_request(
            &request.model,
            &request.messages,
            &request.options,
            false,
            None,
        );

        let response = self.post_chat(&payload).await?;

        let raw: OpenAiChatResponse = response
            .json()
            .await
            .context("Failed to parse response")?;

        let choice = raw.choices.first();
        Ok(ChatResponse {
            content: choice
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default(),
            finish_reason: choice.and_then(|c| c.finish_reason.clone()),
        })
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>> {
        let payload = self.build_chat_request(
            &request.model,
            &request.messages,
            &request.options,
            true,
            None,
        );

        let response = self.post_chat(&payload).await?;
        Ok(parse_chat_sse_stream(response))
    }

    async fn chat_structured(
        &self,
        request: ChatRequest,
        format: JsonSchemaFormat,
    ) -> Result<Value> {
        let payload = self.build_chat_request(
            &request.model,
            &request.messages,
            &request.options,
            false,
            Some(&format),
        );

        let response = self.post_chat(&payload).await?;

        let raw: OpenAiChatResponse = response
            .json()
            .await
            .context("Failed to parse response")?;

        let content = raw
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .context("Structured response missing content")?;

        serde_json::from_str(content).context("Structured response is not valid JSON")
    }
}

// ============================================================================
// OPENAI-SPECIFIC RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResponseMessage {
    pub role: String,
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_chat_request_payload() {
        let client = OpenAiClient::new("test-key").unwrap();
        let messages = vec![Message::user("hello")];
        let options = ChatOptions::new().temperature(0.2).max_tokens(64);

        let payload = client.build_chat_request("gpt-4o-mini", &messages, &options, false, None);

        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["stream"], false);
        assert_eq!(payload["messages"][0]["role"], "user");
        // Temperature travels as f32; compare through the same widening
        assert_eq!(payload["temperature"], serde_json::json!(0.2_f32));
        assert_eq!(payload["max_tokens"], 64);
    }

    #[test]
    fn test_build_structured_request_has_response_format() {
        let client = OpenAiClient::new("test-key").unwrap();
        let format = JsonSchemaFormat::new(
            "chunk_plan",
            serde_json::json!({"type": "object"}),
        );

        let payload = client.build_chat_request(
            "gpt-4o-mini",
            &[Message::system("plan")],
            &ChatOptions::default(),
            false,
            Some(&format),
        );

        assert_eq!(payload["response_format"]["type"], "json_schema");
        assert_eq!(payload["response_format"]["json_schema"]["name"], "chunk_plan");
    }
}
