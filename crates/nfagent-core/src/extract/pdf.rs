//! PDF text extraction with an OCR fallback for scanned documents.

use std::path::Path;

use image::{DynamicImage, ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, info, trace, warn};

use super::{Result, ensure_exists};
use crate::error::PdfError;
use crate::models::config::{OcrConfig, PdfConfig};
use crate::ocr;

/// Returned when neither the text layer nor OCR produce anything.
pub const NOTHING_FOUND: &str = "No text found in the PDF.";

/// Extract the text of a PDF file.
///
/// The embedded text layer is used when it is long enough; otherwise the page
/// images are run through OCR (if models are installed) with each page's text
/// introduced by a `--- Page N ---` line.
pub fn extract_pdf_text(path: &Path, pdf: &PdfConfig, ocr_config: &OcrConfig) -> Result<String> {
    ensure_exists(path)?;
    info!("Extracting text from PDF {}", path.display());

    let data = std::fs::read(path)?;
    let document = PdfDocument::load(&data)?;

    let text = document.text().unwrap_or_else(|e| {
        warn!("Text layer unreadable, treating as scanned: {}", e);
        String::new()
    });
    let text = text.trim().to_string();

    if text.chars().count() >= pdf.min_text_length {
        debug!("Using embedded text layer ({} chars)", text.len());
        return Ok(text);
    }

    if !ocr_config.models_available() {
        warn!(
            "PDF has little embedded text and no OCR models are installed in {}",
            ocr_config.model_dir.display()
        );
        return Ok(non_empty_or(text));
    }

    let scanned = document.ocr_pages(pdf.max_pages, ocr_config)?;
    if scanned.trim().is_empty() {
        Ok(non_empty_or(text))
    } else {
        Ok(scanned)
    }
}

fn non_empty_or(text: String) -> String {
    if text.is_empty() {
        NOTHING_FOUND.to_string()
    } else {
        text
    }
}

/// A loaded (and, if needed, decrypted) PDF.
pub struct PdfDocument {
    document: Document,
    raw_data: Vec<u8>,
}

impl PdfDocument {
    /// Parse a PDF from bytes, decrypting it if it only has an empty user password.
    pub fn load(data: &[u8]) -> std::result::Result<Self, PdfError> {
        let mut document = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        let raw_data = if document.is_encrypted() {
            if document.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            // pdf-extract needs the decrypted bytes
            let mut decrypted = Vec::new();
            document
                .save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        let page_count = document.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        Ok(Self { document, raw_data })
    }

    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Text of the whole document's text layer.
    pub fn text(&self) -> std::result::Result<String, PdfError> {
        pdf_extract::extract_text_from_mem(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }

    /// OCR the images of the first `max_pages` pages (0 = all).
    fn ocr_pages(&self, max_pages: usize, config: &OcrConfig) -> Result<String> {
        #[cfg(feature = "ocr")]
        let engine = ocr::OcrEngine::from_config(config)?;

        let limit = match max_pages {
            0 => self.page_count(),
            n => self.page_count().min(n as u32),
        };

        let mut out = String::new();
        for page in 1..=limit {
            let images = self.page_images(page)?;
            if images.is_empty() {
                continue;
            }
            info!("OCR on page {} ({} images)", page, images.len());

            let mut page_text = Vec::with_capacity(images.len());
            for img in &images {
                #[cfg(feature = "ocr")]
                page_text.push(engine.extract_text(img)?);
                #[cfg(not(feature = "ocr"))]
                page_text.push(ocr::recognize(img, config)?);
            }

            out.push_str(&format!("\n--- Page {} ---\n", page));
            out.push_str(&page_text.join("\n"));
        }

        Ok(out.trim().to_string())
    }

    /// Decodable images referenced by a page's XObject resources.
    pub fn page_images(&self, page: u32) -> std::result::Result<Vec<DynamicImage>, PdfError> {
        let doc = &self.document;
        let pages = doc.get_pages();
        let page_id = pages.get(&page).ok_or(PdfError::InvalidPage(page))?;

        let mut images = Vec::new();
        if let Some(resources) = page_resources(doc, *page_id) {
            if let Ok(xobjects) = resources.get(b"XObject") {
                if let Ok((_, Object::Dictionary(xobj_dict))) = doc.dereference(xobjects) {
                    for (_name, obj_ref) in xobj_dict.iter() {
                        if let Ok((_, obj)) = doc.dereference(obj_ref) {
                            if let Some(img) = decode_image_object(doc, obj) {
                                images.push(img);
                            }
                        }
                    }
                }
            }
        }

        debug!("Found {} images on page {}", images.len(), page);
        Ok(images)
    }
}

/// Resources of a page or the nearest ancestor that defines them.
fn page_resources(doc: &Document, node_id: ObjectId) -> Option<lopdf::Dictionary> {
    let Ok(Object::Dictionary(dict)) = doc.get_object(node_id) else {
        return None;
    };

    if let Ok(resources) = dict.get(b"Resources") {
        if let Ok((_, Object::Dictionary(res_dict))) = doc.dereference(resources) {
            return Some(res_dict.clone());
        }
    }

    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => page_resources(doc, *parent_id),
        _ => None,
    }
}

fn decode_image_object(doc: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;

    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;
    trace!("Found image object: {}x{}", width, height);

    if let Ok(filter) = dict.get(b"Filter") {
        let filter_name = match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            _ => None,
        };

        match filter_name {
            Some(b"DCTDecode") => {
                return image::load_from_memory_with_format(
                    &stream.content,
                    image::ImageFormat::Jpeg,
                )
                .ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("Skipping unsupported image filter");
                return None;
            }
            _ => {}
        }
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);

    if bits != 8 {
        trace!("Unsupported bits per component: {}", bits);
        return None;
    }

    raw_to_image(&data, width, height, color_space)
}

/// Build an RGBA image from uncompressed 8-bit RGB or gray samples.
fn raw_to_image(data: &[u8], width: u32, height: u32, color_space: &[u8]) -> Option<DynamicImage> {
    let pixels = (width as usize) * (height as usize);
    let channels = match color_space {
        b"DeviceRGB" | b"RGB" => 3,
        b"DeviceGray" | b"G" => 1,
        _ => return None,
    };

    if data.len() < pixels * channels {
        trace!(
            "Image data too short: {} < {}",
            data.len(),
            pixels * channels
        );
        return None;
    }

    let mut rgba = Vec::with_capacity(pixels * 4);
    for chunk in data[..pixels * channels].chunks(channels) {
        match chunk {
            [r, g, b] => rgba.extend_from_slice(&[*r, *g, *b, 255]),
            [gray] => rgba.extend_from_slice(&[*gray, *gray, *gray, 255]),
            _ => return None,
        }
    }

    ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba).map(DynamicImage::ImageRgba8)
}
