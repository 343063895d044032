//! Scanned invoice images through OCR.

use std::path::Path;

use tracing::info;

use super::{Result, ensure_exists};
use crate::models::config::OcrConfig;
use crate::ocr;

/// Returned when OCR finds no text in the image.
pub const NOTHING_FOUND: &str = "No text found in the image.";

/// OCR an image file.
pub fn extract_image_text(path: &Path, config: &OcrConfig) -> Result<String> {
    ensure_exists(path)?;
    info!("Extracting text from image {}", path.display());

    let img = ::image::open(path)?;
    let text = ocr::recognize(&img, config)?;

    if text.trim().is_empty() {
        Ok(NOTHING_FOUND.to_string())
    } else {
        Ok(text)
    }
}
