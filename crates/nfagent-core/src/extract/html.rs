//! HTML invoice pages (e.g. NFS-e portal printouts) to plain text.

use std::path::Path;

use tracing::{info, warn};

use super::{Result, ensure_exists};
use crate::error::ExtractionError;

/// Returned when the page renders to no visible text.
pub const NOTHING_FOUND: &str = "No text found in the HTML.";

/// Wrap width for rendered text.
const WRAP_WIDTH: usize = 120;

/// Render an HTML file to its visible text.
///
/// Non-UTF-8 files are decoded as ISO-8859-1, which older municipal portals
/// still emit.
pub fn extract_html_text(path: &Path) -> Result<String> {
    ensure_exists(path)?;
    info!("Extracting text from HTML {}", path.display());

    let bytes = std::fs::read(path)?;
    let markup = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            warn!("{} is not valid UTF-8, decoding as ISO-8859-1", path.display());
            e.into_bytes().iter().map(|&b| char::from(b)).collect()
        }
    };

    let text = html_to_text(&markup)?;
    if text.is_empty() {
        Ok(NOTHING_FOUND.to_string())
    } else {
        Ok(text)
    }
}

/// Convert markup to text, dropping blank lines and trailing whitespace.
pub fn html_to_text(markup: &str) -> Result<String> {
    let rendered = html2text::from_read(markup.as_bytes(), WRAP_WIDTH)
        .map_err(|e| ExtractionError::Html(e.to_string()))?;

    Ok(rendered
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}
