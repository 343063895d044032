//! Error types for the nfagent-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for a processing run.
///
/// Only [`AgentError::Llm`] and [`AgentError::TurnLimit`] normally escape the
/// orchestration loop; tool-level errors are turned into transcript content.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Persistence error.
    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),

    /// Tool dispatch error.
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    /// The model call itself failed.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// The model kept requesting tools past the configured bound.
    #[error("no final answer after {0} model turns")]
    TurnLimit(usize),

    /// A tool kind has no registered handler.
    #[error("no handler registered for tool '{0}'")]
    MissingHandler(&'static str),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised by the format extractors.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The input file does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Reading the input failed.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// The XML document is malformed.
    #[error("failed to parse XML: {0}")]
    Xml(String),

    /// The HTML document could not be converted to text.
    #[error("failed to convert HTML: {0}")]
    Html(String),

    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Image decoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The extractor panicked or its worker was cancelled.
    #[error("extractor aborted: {0}")]
    Aborted(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text detection/recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// The crate was built without OCR support.
    #[error("OCR support is not enabled in this build")]
    Unavailable,
}

/// Errors raised while persisting a record.
#[derive(Error, Debug)]
pub enum PersistError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding/decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The master file exists but does not match the record layout.
    #[error("master file {} is not a valid record sheet: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// Errors raised while dispatching a tool call.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The model asked for a tool that is not in the dispatch table.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// An extractor was requested but the session has no input file.
    #[error("no input file is attached to this session")]
    NoInputFile,

    /// The arguments could not be turned into the expected shape.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Errors raised by the model provider.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The API key environment variable is not set.
    #[error("environment variable {0} is not set")]
    MissingApiKey(String),

    /// Transport-level failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// A scripted model ran out of decisions.
    #[error("scripted model exhausted after {0} decisions")]
    Exhausted(usize),
}

/// Result type for the nfagent library.
pub type Result<T> = std::result::Result<T, AgentError>;
