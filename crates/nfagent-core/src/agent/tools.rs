//! Tool dispatch table.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use super::llm::ToolDefinition;
use crate::extract::{self, ExtractFn, ExtractorKind};
use crate::models::config::AgentConfig;
use crate::models::record::InvoiceRecord;
use crate::persist::{CsvStore, RecordSink};

/// Every tool the model can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ExtractXml,
    ExtractImage,
    ExtractPdf,
    ExtractHtml,
    SaveRecord,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::ExtractXml,
        ToolKind::ExtractImage,
        ToolKind::ExtractPdf,
        ToolKind::ExtractHtml,
        ToolKind::SaveRecord,
    ];

    /// Name the model uses to call this tool.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::ExtractXml => "extract_xml_data",
            ToolKind::ExtractImage => "extract_image_text",
            ToolKind::ExtractPdf => "extract_pdf_text",
            ToolKind::ExtractHtml => "extract_html_text",
            ToolKind::SaveRecord => "save_invoice_record",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// The extractor behind this tool, if it is one.
    pub fn extractor(&self) -> Option<ExtractorKind> {
        match self {
            ToolKind::ExtractXml => Some(ExtractorKind::Xml),
            ToolKind::ExtractImage => Some(ExtractorKind::Image),
            ToolKind::ExtractPdf => Some(ExtractorKind::Pdf),
            ToolKind::ExtractHtml => Some(ExtractorKind::Html),
            ToolKind::SaveRecord => None,
        }
    }

    pub fn for_extractor(kind: ExtractorKind) -> Self {
        match kind {
            ExtractorKind::Xml => ToolKind::ExtractXml,
            ExtractorKind::Image => ToolKind::ExtractImage,
            ExtractorKind::Pdf => ToolKind::ExtractPdf,
            ExtractorKind::Html => ToolKind::ExtractHtml,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let path_params = json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to read"
                }
            }
        });

        let (description, parameters) = match self {
            ToolKind::ExtractXml => (
                "Read an NF-e XML file (.xml) and return its main fields as 'Label: value' lines.",
                path_params,
            ),
            ToolKind::ExtractImage => (
                "Read the text of a scanned or photographed invoice (.png, .jpg, .jpeg) using OCR.",
                path_params,
            ),
            ToolKind::ExtractPdf => (
                "Read the text of an invoice PDF (.pdf), using OCR for scanned pages.",
                path_params,
            ),
            ToolKind::ExtractHtml => (
                "Read the visible text of an invoice web page (.html, .htm).",
                path_params,
            ),
            ToolKind::SaveRecord => (
                "Save the structured invoice fields to a spreadsheet. Call only after the fields \
                 have been extracted from the document.",
                json!({
                    "type": "object",
                    "properties": { "record": InvoiceRecord::json_schema() },
                    "required": ["record"]
                }),
            ),
        };

        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handlers backing each [`ToolKind`].
#[derive(Clone)]
pub struct Toolbox {
    extractors: HashMap<ExtractorKind, ExtractFn>,
    sink: Arc<dyn RecordSink>,
}

impl Toolbox {
    /// Production extractors and the CSV store from `config`.
    pub fn from_config(config: &AgentConfig) -> Self {
        let extractors = ExtractorKind::ALL
            .into_iter()
            .map(|kind| (kind, extract::default_extractor(kind, config)))
            .collect();

        Self {
            extractors,
            sink: Arc::new(CsvStore::new(&config.storage)),
        }
    }

    /// A toolbox with no extractors registered yet.
    pub fn with_sink(sink: Arc<dyn RecordSink>) -> Self {
        Self {
            extractors: HashMap::new(),
            sink,
        }
    }

    /// Register or replace the handler for one format.
    pub fn with_extractor<F>(mut self, kind: ExtractorKind, extractor: F) -> Self
    where
        F: Fn(&Path) -> extract::Result<String> + Send + Sync + 'static,
    {
        self.extractors.insert(kind, Arc::new(extractor));
        self
    }

    pub fn extractor(&self, kind: ExtractorKind) -> Option<&ExtractFn> {
        self.extractors.get(&kind)
    }

    pub fn sink(&self) -> &dyn RecordSink {
        self.sink.as_ref()
    }

    /// Tools whose handler is missing.
    pub fn missing(&self) -> Vec<ToolKind> {
        ToolKind::ALL
            .into_iter()
            .filter(|k| k.extractor().is_some_and(|e| !self.extractors.contains_key(&e)))
            .collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolKind::ALL.iter().map(ToolKind::definition).collect()
    }
}

impl fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.extractors.keys().map(ExtractorKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("Toolbox").field("extractors", &kinds).finish()
    }
}
