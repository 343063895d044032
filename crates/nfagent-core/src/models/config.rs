//! Configuration structures for the agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::session::Mode;

/// Main configuration for the nfagent pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model provider configuration.
    pub llm: LlmConfig,

    /// Orchestration loop configuration.
    pub agent: LoopConfig,

    /// Upload and output locations.
    pub storage: StorageConfig,

    /// OCR configuration.
    pub ocr: OcrConfig,

    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// HTTP upload endpoint configuration.
    pub server: ServerConfig,
}

/// OpenAI-compatible chat completion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the API (without the `/chat/completions` suffix).
    pub api_base: String,

    /// Model identifier.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Name of the environment variable holding the API key.
    pub api_key_env: String,

    /// Optional completion token cap.
    pub max_tokens: Option<u32>,

    /// Optional request timeout in seconds. None waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: None,
            timeout_secs: None,
        }
    }
}

/// Orchestration loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Maximum model consultations per run.
    pub max_turns: usize,

    /// Mode used when the caller does not pick one.
    pub default_mode: Mode,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            default_mode: Mode::Single,
        }
    }
}

/// Where uploads land and where spreadsheets are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for uploaded files awaiting processing.
    pub upload_dir: PathBuf,

    /// Directory for persisted spreadsheets.
    pub output_dir: PathBuf,

    /// File name of the accumulate-mode master sheet.
    pub master_file: String,

    /// Name used in single mode when the invoice number is missing.
    pub placeholder_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            master_file: "invoices_master.csv".to_string(),
            placeholder_name: "unnumbered".to_string(),
        }
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,

    /// Keep `[UNK]` markers emitted by the recognizer.
    pub keep_unk: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "latin_rec.onnx".to_string(),
            dictionary: "latin_dict.txt".to_string(),
            keep_unk: false,
        }
    }
}

impl OcrConfig {
    /// Whether the detection and recognition models are present on disk.
    pub fn models_available(&self) -> bool {
        self.model_dir.join(&self.detection_model).exists()
            && self.model_dir.join(&self.recognition_model).exists()
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Maximum pages to OCR for scanned PDFs (0 = unlimited).
    pub max_pages: usize,

    /// Minimum embedded text length to skip OCR.
    pub min_text_length: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            min_text_length: 50,
        }
    }
}

/// HTTP upload endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub bind: String,

    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,

    /// Threads kept in memory; the least recently used one is dropped beyond this.
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
            max_sessions: 256,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }

    /// Full path of the accumulate-mode master sheet.
    pub fn master_path(&self) -> PathBuf {
        self.storage.output_dir.join(&self.storage.master_file)
    }
}
