//! Model provider abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;
use crate::models::session::{Message, ToolCall};

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

impl ToolDefinition {
    /// OpenAI `tools` array entry.
    pub fn to_openai_format(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }
}

/// What the model wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Stop and answer the user.
    Final(String),
    /// Run these tools, in order, then ask again.
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
}

impl Decision {
    /// The assistant turn recording this decision.
    pub fn to_message(&self) -> Message {
        match self {
            Decision::Final(text) => Message::assistant(text.clone()),
            Decision::ToolCalls { content, calls } => Message::Assistant {
                content: content.clone(),
                tool_calls: calls.clone(),
            },
        }
    }
}

/// A chat model that can request tool calls.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Decide the next step given the transcript so far.
    async fn decide(
        &self,
        transcript: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Decision, LlmError>;
}
