//! OpenAI-compatible chat completions backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::llm::{ChatModel, Decision, ToolDefinition};
use crate::error::LlmError;
use crate::models::config::LlmConfig;
use crate::models::session::{Message, ToolCall};

/// Chat model reached over the `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiChat {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAiChat {
    /// Build a client, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            http_client: builder.build()?,
            api_key: api_key.into(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn request_body(&self, transcript: &[Message], tools: &[ToolDefinition]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": transcript.iter().map(to_openai_message).collect::<Vec<_>>(),
            "temperature": self.temperature,
        });

        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolDefinition::to_openai_format).collect());
            body["tool_choice"] = json!("auto");
        }
        if let Some(max) = self.max_tokens {
            body["max_tokens"] = json!(max);
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn decide(
        &self,
        transcript: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Decision, LlmError> {
        let start = Instant::now();
        debug!(model = %self.model, messages = transcript.len(), "Sending chat completion request");

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&self.request_body(transcript, tools))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %body, "Chat completion failed");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Chat completion received");
        parse_decision(&payload)
    }
}

/// Wire form of a transcript turn.
pub fn to_openai_message(message: &Message) -> Value {
    match message {
        Message::System { content } => json!({ "role": "system", "content": content }),
        Message::User { content } => json!({ "role": "user", "content": content }),
        Message::Assistant {
            content,
            tool_calls,
        } => {
            let mut value = json!({ "role": "assistant", "content": content });
            if !tool_calls.is_empty() {
                value["tool_calls"] = tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
            }
            value
        }
        Message::Tool {
            tool_call_id,
            content,
            ..
        } => json!({ "role": "tool", "tool_call_id": tool_call_id, "content": content }),
    }
}

/// Read the first choice of a chat completion response.
pub fn parse_decision(payload: &Value) -> Result<Decision, LlmError> {
    let message = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| LlmError::Decode("no message in response".to_string()))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let raw_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if raw_calls.is_empty() {
        return Ok(Decision::Final(content.unwrap_or_default()));
    }

    let calls = raw_calls
        .iter()
        .map(parse_tool_call)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Decision::ToolCalls { content, calls })
}

fn parse_tool_call(value: &Value) -> Result<ToolCall, LlmError> {
    let field = |name: &str| {
        value
            .get("function")
            .and_then(|f| f.get(name))
            .and_then(Value::as_str)
    };

    let id = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::Decode("tool call without id".to_string()))?;
    let name = field("name").ok_or_else(|| LlmError::Decode("tool call without name".to_string()))?;
    let raw = field("arguments").unwrap_or("{}");

    // Malformed arguments are handed to the tool, which reports them back.
    let arguments = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    Ok(ToolCall::new(id, name, arguments))
}
