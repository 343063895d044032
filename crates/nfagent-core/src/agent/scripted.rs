//! Deterministic [`ChatModel`] that replays a fixed list of decisions.
//!
//! Used by tests and by offline dry runs of the pipeline.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::llm::{ChatModel, Decision, ToolDefinition};
use crate::error::LlmError;
use crate::models::session::Message;

pub struct ScriptedModel {
    decisions: Mutex<VecDeque<Decision>>,
    seen: Mutex<Vec<Vec<Message>>>,
    repeat_last: bool,
}

impl ScriptedModel {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
            repeat_last: false,
        }
    }

    /// Keep returning the final decision once the script runs out.
    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Transcripts passed to each `decide` call, oldest first.
    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn decide(
        &self,
        transcript: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<Decision, LlmError> {
        let served = {
            let mut seen = self
                .seen
                .lock()
                .map_err(|e| LlmError::Decode(e.to_string()))?;
            seen.push(transcript.to_vec());
            seen.len()
        };

        let mut decisions = self
            .decisions
            .lock()
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        match decisions.len() {
            0 => Err(LlmError::Exhausted(served - 1)),
            1 if self.repeat_last => decisions.front().cloned().ok_or(LlmError::Exhausted(served)),
            _ => decisions.pop_front().ok_or(LlmError::Exhausted(served - 1)),
        }
    }
}
