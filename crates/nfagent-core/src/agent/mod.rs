//! Tool-calling agent: model abstraction, tool table and the orchestration loop.

pub mod llm;
pub mod openai;
pub mod orchestrator;
pub mod prompt;
pub mod scripted;
pub mod store;
pub mod tools;

pub use crate::models::session::ToolCall;
pub use llm::{ChatModel, Decision, ToolDefinition};
pub use openai::OpenAiChat;
pub use orchestrator::{ERROR_PREFIX, Orchestrator, RunReport};
pub use scripted::ScriptedModel;
pub use store::{SessionStore, SharedSession};
pub use tools::{ToolKind, Toolbox};
