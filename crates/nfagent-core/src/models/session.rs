//! Per-thread conversation state.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::InvoiceRecord;

/// Persistence mode for a processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// One spreadsheet per invoice.
    #[default]
    Single,
    /// Every invoice appended to one master spreadsheet.
    #[serde(alias = "accumulated")]
    Accumulate,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Single => "single",
            Mode::Accumulate => "accumulate",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(Mode::Single),
            "accumulate" | "accumulated" => Ok(Mode::Accumulate),
            other => Err(format!(
                "unknown mode '{other}' (expected 'single' or 'accumulate')"
            )),
        }
    }
}

/// Opaque conversation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned id, echoed back on the matching result.
    pub id: String,
    /// Tool name as emitted by the model.
    pub name: String,
    /// Parsed JSON arguments.
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One transcript turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Assistant turn with a final answer and no tool requests.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Text content, if this turn carries any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::System { content } | Message::User { content } => Some(content),
            Message::Assistant { content, .. } => content.as_deref(),
            Message::Tool { content, .. } => Some(content),
        }
    }
}

/// State owned by one conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub thread_id: ThreadId,
    pub mode: Mode,
    /// Append-only within a run.
    pub transcript: Vec<Message>,
    /// File the extractors read, regardless of what path the model names.
    pub input_path: Option<PathBuf>,
    /// Most recent successfully written artifact.
    pub last_output: Option<PathBuf>,
    /// Most recent successfully saved record.
    pub last_record: Option<InvoiceRecord>,
    /// Raw output of the most recent successful extraction.
    pub last_extraction: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(thread_id: ThreadId, mode: Mode) -> Self {
        Self {
            thread_id,
            mode,
            transcript: Vec::new(),
            input_path: None,
            last_output: None,
            last_record: None,
            last_extraction: None,
            created_at: Utc::now(),
        }
    }

    /// Session with a freshly generated thread id.
    pub fn fresh(mode: Mode) -> Self {
        Self::new(ThreadId::generate(), mode)
    }

    /// Drop the conversation and switch mode, keeping the thread id.
    pub fn reset(&mut self, mode: Mode) {
        *self = Self::new(self.thread_id.clone(), mode);
    }

    /// Text of the last assistant turn that carried any.
    pub fn last_answer(&self) -> Option<&str> {
        self.transcript.iter().rev().find_map(|m| match m {
            Message::Assistant {
                content: Some(c), ..
            } => Some(c.as_str()),
            _ => None,
        })
    }
}
