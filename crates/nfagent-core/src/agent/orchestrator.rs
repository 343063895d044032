//! The decide / execute-tools loop.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::llm::{ChatModel, Decision, ToolDefinition};
use super::prompt;
use super::tools::{ToolKind, Toolbox};
use crate::error::{AgentError, ExtractionError, Result, ToolError};
use crate::extract::ExtractorKind;
use crate::models::config::LoopConfig;
use crate::models::record::InvoiceRecord;
use crate::models::session::{Message, Mode, SessionState, ToolCall};
use crate::persist::SavedArtifact;
use crate::rules;

/// Prefix of every failed tool result.
pub const ERROR_PREFIX: &str = "Error: ";

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// The model's final answer.
    pub answer: String,
    /// Model consultations used.
    pub turns: usize,
    /// Tool calls executed.
    pub tool_calls: usize,
    /// The last record saved during this run, if any.
    pub saved: Option<SavedArtifact>,
}

enum LoopState {
    AwaitingDecision,
    ExecutingTools(Vec<ToolCall>),
}

struct ToolOutput {
    content: String,
    saved: Option<SavedArtifact>,
}

impl From<String> for ToolOutput {
    fn from(content: String) -> Self {
        Self {
            content,
            saved: None,
        }
    }
}

/// Drives a session until the model stops requesting tools.
pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    toolbox: Toolbox,
    config: LoopConfig,
    definitions: Vec<ToolDefinition>,
}

impl Orchestrator {
    /// Fails with [`AgentError::MissingHandler`] if any tool has no handler.
    pub fn new(model: Arc<dyn ChatModel>, toolbox: Toolbox, config: LoopConfig) -> Result<Self> {
        if let Some(kind) = toolbox.missing().first() {
            return Err(AgentError::MissingHandler(kind.name()));
        }
        if config.max_turns == 0 {
            return Err(AgentError::Config("agent.max_turns must be at least 1".to_string()));
        }

        let definitions = toolbox.definitions();
        Ok(Self {
            model,
            toolbox,
            config,
            definitions,
        })
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Attach `path` to the session and ask the model to process it.
    pub async fn process_file(&self, session: &mut SessionState, path: &Path) -> Result<RunReport> {
        info!(
            thread = %session.thread_id,
            mode = %session.mode,
            "Processing {}",
            path.display()
        );
        session.input_path = Some(path.to_path_buf());
        session.last_extraction = None;
        self.seed(session);
        session.transcript.push(Message::user(prompt::file_request(path)));
        self.run(session).await
    }

    /// Continue a thread with a free-form user message.
    pub async fn chat(&self, session: &mut SessionState, text: &str) -> Result<RunReport> {
        self.seed(session);
        session.transcript.push(Message::user(text));
        self.run(session).await
    }

    fn seed(&self, session: &mut SessionState) {
        if session.transcript.is_empty() {
            session.transcript.push(Message::system(prompt::system_prompt()));
        }
    }

    /// Run the loop on the session's current transcript.
    pub async fn run(&self, session: &mut SessionState) -> Result<RunReport> {
        let mut state = LoopState::AwaitingDecision;
        let mut turns = 0;
        let mut tool_calls = 0;
        let mut saved = None;

        loop {
            state = match state {
                LoopState::AwaitingDecision => {
                    if turns >= self.config.max_turns {
                        warn!(
                            thread = %session.thread_id,
                            max_turns = self.config.max_turns,
                            "Model did not finish"
                        );
                        return Err(AgentError::TurnLimit(self.config.max_turns));
                    }
                    turns += 1;
                    debug!(turn = turns, messages = session.transcript.len(), "Consulting model");

                    let decision = self
                        .model
                        .decide(&session.transcript, &self.definitions)
                        .await?;
                    session.transcript.push(decision.to_message());

                    match decision {
                        Decision::ToolCalls { calls, .. } if !calls.is_empty() => {
                            info!(turn = turns, count = calls.len(), "Model requested tools");
                            LoopState::ExecutingTools(calls)
                        }
                        Decision::ToolCalls { content, .. } => {
                            return Ok(self.finish(
                                content.unwrap_or_default(),
                                turns,
                                tool_calls,
                                saved,
                            ));
                        }
                        Decision::Final(answer) => {
                            return Ok(self.finish(answer, turns, tool_calls, saved));
                        }
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    for call in &calls {
                        let (result, artifact) = self.execute(session, call).await;
                        session.transcript.push(result);
                        tool_calls += 1;
                        if artifact.is_some() {
                            saved = artifact;
                        }
                    }
                    LoopState::AwaitingDecision
                }
            };
        }
    }

    fn finish(
        &self,
        answer: String,
        turns: usize,
        tool_calls: usize,
        saved: Option<SavedArtifact>,
    ) -> RunReport {
        info!(turns, tool_calls, saved = saved.is_some(), "Run finished");
        RunReport {
            answer,
            turns,
            tool_calls,
            saved,
        }
    }

    /// Run one call and turn its outcome into a tool-result turn.
    async fn execute(
        &self,
        session: &mut SessionState,
        call: &ToolCall,
    ) -> (Message, Option<SavedArtifact>) {
        info!(tool = %call.name, id = %call.id, "Executing tool call");

        let (content, is_error, saved) = match self.dispatch(session, call).await {
            Ok(output) => {
                debug!(tool = %call.name, len = output.content.len(), "Tool succeeded");
                (output.content, false, output.saved)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool failed");
                (format!("{ERROR_PREFIX}{}", describe(&e)), true, None)
            }
        };

        let message = Message::Tool {
            tool_call_id: call.id.clone(),
            content,
            is_error,
        };
        (message, saved)
    }

    async fn dispatch(&self, session: &mut SessionState, call: &ToolCall) -> Result<ToolOutput> {
        let kind = ToolKind::from_name(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        match kind.extractor() {
            Some(extractor) => self
                .extract(session, extractor, &call.arguments)
                .await
                .map(ToolOutput::from),
            None => self.save(session, &call.arguments),
        }
    }

    async fn extract(
        &self,
        session: &mut SessionState,
        kind: ExtractorKind,
        arguments: &Value,
    ) -> Result<String> {
        let input = session.input_path.clone().ok_or(ToolError::NoInputFile)?;

        // The session's file always wins over whatever path the model names.
        if let Some(requested) = arguments.get("file_path").and_then(Value::as_str) {
            if Path::new(requested) != input {
                warn!(
                    requested,
                    using = %input.display(),
                    "Ignoring model-supplied path"
                );
            }
        }

        let extractor = self
            .toolbox
            .extractor(kind)
            .ok_or(AgentError::MissingHandler(ToolKind::for_extractor(kind).name()))?
            .clone();

        // OCR and PDF parsing are CPU-bound and may panic inside third-party code.
        let text = tokio::task::spawn_blocking(move || extractor(&input))
            .await
            .map_err(|e| ExtractionError::Aborted(join_failure(e)))??;
        session.last_extraction = Some(text.clone());
        Ok(text)
    }

    fn save(&self, session: &mut SessionState, arguments: &Value) -> Result<ToolOutput> {
        let record = InvoiceRecord::from_tool_args(arguments)?;
        let sink = self.toolbox.sink();

        let saved = match session.mode {
            Mode::Single => sink.write_single(&record)?,
            Mode::Accumulate => sink.write_accumulate(&record)?,
        };

        let mut confirmation = format!("File saved successfully at: {}", saved.path.display());
        let issues = rules::validate(&saved.record);
        if !issues.is_empty() {
            confirmation.push_str("\nWarnings:");
            for issue in &issues {
                confirmation.push_str("\n- ");
                confirmation.push_str(issue);
            }
        }

        session.last_output = Some(saved.path.clone());
        session.last_record = Some(saved.record.clone());
        Ok(ToolOutput {
            content: confirmation,
            saved: Some(saved),
        })
    }
}

fn join_failure(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic in extractor".to_string())
}

/// Innermost message of a tool failure, without the wrapping category.
fn describe(error: &AgentError) -> String {
    match error {
        AgentError::Extraction(e) => e.to_string(),
        AgentError::Persist(e) => e.to_string(),
        AgentError::Tool(e) => e.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::scripted::ScriptedModel;
    use crate::error::{LlmError, PersistError};
    use crate::models::config::StorageConfig;
    use crate::models::session::ThreadId;
    use crate::persist::{CsvStore, RecordSink, SavedArtifact};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(&'static str, InvoiceRecord)>>,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<(&'static str, InvoiceRecord)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RecordSink for RecordingSink {
        fn write_single(
            &self,
            record: &InvoiceRecord,
        ) -> std::result::Result<SavedArtifact, PersistError> {
            self.calls.lock().unwrap().push(("single", record.clone()));
            Ok(SavedArtifact {
                path: PathBuf::from("single.csv"),
                record: record.clone(),
                rows: 1,
            })
        }

        fn write_accumulate(
            &self,
            record: &InvoiceRecord,
        ) -> std::result::Result<SavedArtifact, PersistError> {
            self.calls.lock().unwrap().push(("accumulate", record.clone()));
            Ok(SavedArtifact {
                path: PathBuf::from("master.csv"),
                record: record.clone(),
                rows: 1,
            })
        }
    }

    struct FailingSink;

    impl RecordSink for FailingSink {
        fn write_single(&self, _: &InvoiceRecord) -> std::result::Result<SavedArtifact, PersistError> {
            Err(PersistError::Io(std::io::Error::other("disk full")))
        }

        fn write_accumulate(
            &self,
            record: &InvoiceRecord,
        ) -> std::result::Result<SavedArtifact, PersistError> {
            self.write_single(record)
        }
    }

    fn toolbox(sink: Arc<dyn RecordSink>, seen: Arc<Mutex<Vec<PathBuf>>>) -> Toolbox {
        let mut toolbox = Toolbox::with_sink(sink);
        for kind in ExtractorKind::ALL {
            let seen = seen.clone();
            toolbox = toolbox.with_extractor(kind, move |path: &Path| {
                seen.lock().unwrap().push(path.to_path_buf());
                Ok(format!("{kind} text of {}", path.display()))
            });
        }
        toolbox
    }

    fn call(id: &str, tool: ToolKind, arguments: Value) -> ToolCall {
        ToolCall::new(id, tool.name(), arguments)
    }

    fn tools(calls: Vec<ToolCall>) -> Decision {
        Decision::ToolCalls {
            content: None,
            calls,
        }
    }

    fn tool_results(session: &SessionState) -> Vec<(String, String, bool)> {
        session
            .transcript
            .iter()
            .filter_map(|m| match m {
                Message::Tool {
                    tool_call_id,
                    content,
                    is_error,
                } => Some((tool_call_id.clone(), content.clone(), *is_error)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_extractor_uses_session_path() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::new(RecordingSink::default());
        let model = Arc::new(ScriptedModel::new([
            tools(vec![call(
                "c1",
                ToolKind::ExtractXml,
                json!({ "file_path": "/somewhere/else.xml" }),
            )]),
            Decision::Final("done".to_string()),
        ]));

        let orchestrator =
            Orchestrator::new(model.clone(), toolbox(sink, seen.clone()), LoopConfig::default())
                .unwrap();
        let mut session = SessionState::new(ThreadId::from("t"), Mode::Single);

        let report = orchestrator
            .process_file(&mut session, Path::new("/uploads/nota.xml"))
            .await
            .unwrap();

        assert_eq!(report.answer, "done");
        assert_eq!(report.turns, 2);
        assert_eq!(report.tool_calls, 1);
        assert_eq!(report.saved, None);
        assert_eq!(*seen.lock().unwrap(), vec![PathBuf::from("/uploads/nota.xml")]);
        assert_eq!(
            session.last_extraction.as_deref(),
            Some("xml text of /uploads/nota.xml")
        );

        // system, user, assistant(tool call), tool, assistant(final)
        assert_eq!(session.transcript.len(), 5);
        assert!(matches!(session.transcript[0], Message::System { .. }));
        assert_eq!(session.last_answer(), Some("done"));
        assert_eq!(model.transcripts()[1].len(), 4);
    }

    #[tokio::test]
    async fn test_single_mode_routes_to_write_single() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(&StorageConfig {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        let expected = dir.path().join("invoice_1254.csv");

        let model = Arc::new(ScriptedModel::new([
            tools(vec![call(
                "save",
                ToolKind::SaveRecord,
                json!({ "record": { "invoice_number": "1254", "total_value": "R$ 138,95" } }),
            )]),
            Decision::Final("saved".to_string()),
        ]));
        let orchestrator = Orchestrator::new(
            model,
            toolbox(Arc::new(store), Arc::default()),
            LoopConfig::default(),
        )
        .unwrap();

        let mut session = SessionState::new(ThreadId::from("t"), Mode::Single);
        let report = orchestrator
            .process_file(&mut session, Path::new("nota.pdf"))
            .await
            .unwrap();

        assert_eq!(report.saved.map(|a| a.path), Some(expected.clone()));
        assert_eq!(session.last_output, Some(expected.clone()));
        assert!(expected.exists());
        assert!(!dir.path().join("invoices_master.csv").exists());

        let record = session.last_record.clone().unwrap();
        assert_eq!(record.total_value, Some(rust_decimal::Decimal::new(13895, 2)));

        let results = tool_results(&session);
        assert_eq!(
            results[0].1,
            format!("File saved successfully at: {}", expected.display())
        );
    }

    #[tokio::test]
    async fn test_accumulate_mode_routes_to_write_accumulate() {
        let sink = Arc::new(RecordingSink::default());
        let model = Arc::new(ScriptedModel::new([
            tools(vec![call("s", ToolKind::SaveRecord, json!({ "issuer_name": "ACME" }))]),
            Decision::Final("ok".to_string()),
        ]));
        let orchestrator =
            Orchestrator::new(model, toolbox(sink.clone(), Arc::default()), LoopConfig::default())
                .unwrap();

        let mut session = SessionState::new(ThreadId::from("t"), Mode::Accumulate);
        orchestrator.chat(&mut session, "save it").await.unwrap();

        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "accumulate");
        assert_eq!(calls[0].1.issuer_name.as_deref(), Some("ACME"));
        assert_eq!(session.last_output, Some(PathBuf::from("master.csv")));
    }

    #[tokio::test]
    async fn test_failing_and_succeeding_calls_in_one_turn() {
        let model = Arc::new(ScriptedModel::new([
            tools(vec![
                call("bad", ToolKind::SaveRecord, json!({ "record": { "total_value": "lots" } })),
                call("good", ToolKind::ExtractPdf, json!({})),
            ]),
            Decision::Final("partial".to_string()),
        ]));
        let orchestrator = Orchestrator::new(
            model,
            toolbox(Arc::new(RecordingSink::default()), Arc::default()),
            LoopConfig::default(),
        )
        .unwrap();

        let mut session = SessionState::new(ThreadId::from("t"), Mode::Single);
        let report = orchestrator
            .process_file(&mut session, Path::new("a.pdf"))
            .await
            .unwrap();

        assert_eq!(report.answer, "partial");
        let results = tool_results(&session);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "bad");
        assert!(results[0].1.starts_with(ERROR_PREFIX));
        assert!(results[0].2);
        assert_eq!(results[1], ("good".to_string(), "pdf text of a.pdf".to_string(), false));
        assert_eq!(session.last_output, None);
        assert_eq!(session.last_record, None);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_output() {
        let model = Arc::new(ScriptedModel::new([
            tools(vec![call("s", ToolKind::SaveRecord, json!({ "record": {} }))]),
            Decision::Final("sorry".to_string()),
        ]));
        let orchestrator = Orchestrator::new(
            model,
            toolbox(Arc::new(FailingSink), Arc::default()),
            LoopConfig::default(),
        )
        .unwrap();

        let mut session = SessionState::new(ThreadId::from("t"), Mode::Single);
        session.last_output = Some(PathBuf::from("earlier.csv"));
        orchestrator.chat(&mut session, "save").await.unwrap();

        assert_eq!(session.last_output, Some(PathBuf::from("earlier.csv")));
        let results = tool_results(&session);
        assert_eq!(results[0].1, "Error: I/O error: disk full");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_missing_input() {
        let model = Arc::new(ScriptedModel::new([
            tools(vec![
                ToolCall::new("x", "format_disk", json!({})),
                call("y", ToolKind::ExtractHtml, json!({})),
            ]),
            Decision::Final("hm".to_string()),
        ]));
        let orchestrator = Orchestrator::new(
            model,
            toolbox(Arc::new(RecordingSink::default()), Arc::default()),
            LoopConfig::default(),
        )
        .unwrap();

        let mut session = SessionState::new(ThreadId::from("t"), Mode::Single);
        orchestrator.chat(&mut session, "hi").await.unwrap();

        let results = tool_results(&session);
        assert_eq!(results[0].1, "Error: unknown tool 'format_disk'");
        assert_eq!(
            results[1].1,
            "Error: no input file is attached to this session"
        );
    }

    #[tokio::test]
    async fn test_extraction_error_becomes_tool_result() {
        let model = Arc::new(ScriptedModel::new([
            tools(vec![call("c", ToolKind::ExtractImage, json!({}))]),
            Decision::Final("could not read".to_string()),
        ]));
        let toolbox = toolbox(Arc::new(RecordingSink::default()), Arc::default())
            .with_extractor(ExtractorKind::Image, |path: &Path| {
                Err(ExtractionError::FileNotFound(path.to_path_buf()))
            });
        let orchestrator = Orchestrator::new(model, toolbox, LoopConfig::default()).unwrap();

        let mut session = SessionState::new(ThreadId::from("t"), Mode::Single);
        orchestrator
            .process_file(&mut session, Path::new("gone.png"))
            .await
            .unwrap();

        let results = tool_results(&session);
        assert_eq!(results[0].1, "Error: file not found: gone.png");
        assert_eq!(session.last_extraction, None);
    }

    #[tokio::test]
    async fn test_panicking_extractor_does_not_stop_the_turn() {
        let model = Arc::new(ScriptedModel::new([
            tools(vec![
                call("broken", ToolKind::ExtractPdf, json!({})),
                call("save", ToolKind::SaveRecord, json!({ "invoice_number": "7" })),
            ]),
            Decision::Final("recovered".to_string()),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let toolbox = toolbox(sink.clone(), Arc::default())
            .with_extractor(ExtractorKind::Pdf, |_: &Path| -> crate::extract::Result<String> {
                panic!("bad font program")
            });
        let orchestrator = Orchestrator::new(model, toolbox, LoopConfig::default()).unwrap();

        let mut session = SessionState::new(ThreadId::from("t"), Mode::Single);
        let report = orchestrator
            .process_file(&mut session, Path::new("scan.pdf"))
            .await
            .unwrap();

        assert_eq!(report.answer, "recovered");
        let results = tool_results(&session);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1, "Error: extractor aborted: bad font program");
        assert!(results[0].2);
        assert!(!results[1].2);
        assert_eq!(sink.calls().len(), 1);
        assert_eq!(session.last_extraction, None);
    }

    #[tokio::test]
    async fn test_turn_limit() {
        let model = Arc::new(
            ScriptedModel::new([tools(vec![call("c", ToolKind::ExtractXml, json!({}))])])
                .repeating(),
        );
        let config = LoopConfig {
            max_turns: 3,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(
            model.clone(),
            toolbox(Arc::new(RecordingSink::default()), Arc::default()),
            config,
        )
        .unwrap();

        let mut session = SessionState::new(ThreadId::from("t"), Mode::Single);
        let result = orchestrator
            .process_file(&mut session, Path::new("a.xml"))
            .await;

        assert!(matches!(result, Err(AgentError::TurnLimit(3))));
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_model_error_propagates_without_mutation() {
        let model = Arc::new(ScriptedModel::new([]));
        let orchestrator = Orchestrator::new(
            model,
            toolbox(Arc::new(RecordingSink::default()), Arc::default()),
            LoopConfig::default(),
        )
        .unwrap();

        let mut session = SessionState::new(ThreadId::from("t"), Mode::Single);
        let result = orchestrator.chat(&mut session, "hi").await;

        assert!(matches!(result, Err(AgentError::Llm(LlmError::Exhausted(0)))));
        // system + user only
        assert_eq!(session.transcript.len(), 2);
    }

    #[test]
    fn test_new_rejects_incomplete_toolbox() {
        let toolbox = Toolbox::with_sink(Arc::new(RecordingSink::default()))
            .with_extractor(ExtractorKind::Xml, |_| Ok(String::new()));

        let result = Orchestrator::new(
            Arc::new(ScriptedModel::new([])),
            toolbox,
            LoopConfig::default(),
        );
        assert!(matches!(
            result,
            Err(AgentError::MissingHandler("extract_image_text"))
        ));
    }

    #[tokio::test]
    async fn test_save_warnings_are_reported() {
        let model = Arc::new(ScriptedModel::new([
            tools(vec![call(
                "s",
                ToolKind::SaveRecord,
                json!({ "record": { "issuer_tax_id": "123" } }),
            )]),
            Decision::Final("ok".to_string()),
        ]));
        let orchestrator = Orchestrator::new(
            model,
            toolbox(Arc::new(RecordingSink::default()), Arc::default()),
            LoopConfig::default(),
        )
        .unwrap();

        let mut session = SessionState::new(ThreadId::from("t"), Mode::Single);
        orchestrator.chat(&mut session, "save").await.unwrap();

        let results = tool_results(&session);
        assert!(!results[0].2);
        assert!(results[0].1.contains("\nWarnings:\n- issuer tax id '123'"));
    }
}
