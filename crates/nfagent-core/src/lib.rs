//! Core library for the invoice extraction agent.
//!
//! This crate provides:
//! - Format extractors for NF-e XML, PDF, HTML and scanned images
//! - The structured invoice record and its advisory validation rules
//! - CSV persistence in single-file and accumulating master-file modes
//! - The tool-calling orchestration loop driven by an LLM

pub mod agent;
pub mod error;
pub mod extract;
pub mod models;
pub mod ocr;
pub mod persist;
pub mod rules;

pub use agent::{
    ChatModel, Decision, OpenAiChat, Orchestrator, RunReport, ScriptedModel, SessionStore,
    ToolCall, ToolDefinition, ToolKind, Toolbox,
};
pub use error::{AgentError, Result};
pub use extract::ExtractorKind;
pub use models::config::AgentConfig;
pub use models::record::InvoiceRecord;
pub use models::session::{Message, Mode, SessionState, ThreadId};
pub use persist::{CsvStore, RecordSink, SavedArtifact};
