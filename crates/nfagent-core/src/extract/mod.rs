//! Format-specific extractors.
//!
//! Each extractor takes a file path and returns either the extracted text or an
//! explicit "nothing found" sentence. Only I/O-level problems (missing file,
//! undecodable bytes, corrupt structure) are returned as errors.

pub mod html;
pub mod image;
pub mod pdf;
pub mod xml;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::ExtractionError;
use crate::models::config::AgentConfig;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// A stateless extractor bound to its configuration.
pub type ExtractFn = Arc<dyn Fn(&Path) -> Result<String> + Send + Sync>;

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractorKind {
    Xml,
    Image,
    Pdf,
    Html,
}

impl ExtractorKind {
    pub const ALL: [ExtractorKind; 4] = [
        ExtractorKind::Xml,
        ExtractorKind::Image,
        ExtractorKind::Pdf,
        ExtractorKind::Html,
    ];

    /// Guess the extractor from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "xml" => Some(ExtractorKind::Xml),
            "pdf" => Some(ExtractorKind::Pdf),
            "html" | "htm" => Some(ExtractorKind::Html),
            "png" | "jpg" | "jpeg" | "webp" | "tif" | "tiff" | "bmp" => {
                Some(ExtractorKind::Image)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorKind::Xml => "xml",
            ExtractorKind::Image => "image",
            ExtractorKind::Pdf => "pdf",
            ExtractorKind::Html => "html",
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the production extractor for `kind`.
pub fn default_extractor(kind: ExtractorKind, config: &AgentConfig) -> ExtractFn {
    match kind {
        ExtractorKind::Xml => Arc::new(xml::extract_nfe_fields),
        ExtractorKind::Html => Arc::new(html::extract_html_text),
        ExtractorKind::Image => {
            let ocr = config.ocr.clone();
            Arc::new(move |path: &Path| image::extract_image_text(path, &ocr))
        }
        ExtractorKind::Pdf => {
            let ocr = config.ocr.clone();
            let pdf = config.pdf.clone();
            Arc::new(move |path: &Path| pdf::extract_pdf_text(path, &pdf, &ocr))
        }
    }
}

/// Fail early with a clear error when the input is missing.
pub(crate) fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ExtractionError::FileNotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(
            ExtractorKind::from_path(Path::new("nota.XML")),
            Some(ExtractorKind::Xml)
        );
        assert_eq!(
            ExtractorKind::from_path(Path::new("scan.jpeg")),
            Some(ExtractorKind::Image)
        );
        assert_eq!(
            ExtractorKind::from_path(Path::new("page.htm")),
            Some(ExtractorKind::Html)
        );
        assert_eq!(ExtractorKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(ExtractorKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_every_default_extractor_reports_missing_file() {
        let config = AgentConfig::default();
        let missing = PathBuf::from("/definitely/not/here/invoice.bin");

        for kind in ExtractorKind::ALL {
            let extractor = default_extractor(kind, &config);
            match extractor(&missing) {
                Err(ExtractionError::FileNotFound(p)) => assert_eq!(p, missing),
                other => panic!("{kind}: expected FileNotFound, got {other:?}"),
            }
        }
    }
}
