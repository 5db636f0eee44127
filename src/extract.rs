// src/extract.rs

use crate::error::BillError;
use crate::ocr::OcrEngine;
use lopdf::Document;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Produces raw bill text for one input file.
pub trait TextSource {
    fn extract(&self, path: &Path) -> Result<String, BillError>;
}

/// How a PDF's text was classified after the per-page probe.
#[derive(Debug, PartialEq)]
pub enum PdfContent {
    /// At least one page carries a text layer.
    Text,
    /// No page yielded any text; needs OCR.
    ScannedImage,
}

/// Decide digital vs scanned from the per-page texts.
pub fn classify(pages: &[String]) -> PdfContent {
    if pages.iter().any(|p| !p.trim().is_empty()) {
        PdfContent::Text
    } else {
        PdfContent::ScannedImage
    }
}

/// Text layer first, OCR only when every page is blank.
pub struct PdfTextExtractor<O> {
    ocr: O,
}

impl<O: OcrEngine> PdfTextExtractor<O> {
    pub fn new(ocr: O) -> Self {
        Self { ocr }
    }

    fn extract_bytes(&self, path: &Path, pdf_bytes: &[u8]) -> Result<String, BillError> {
        let doc = Document::load_mem(pdf_bytes)
            .map_err(|e| BillError::Extraction(format!("Failed to parse PDF: {e}")))?;

        let pages = page_texts(&doc);
        if pages.is_empty() {
            return Err(BillError::Extraction("PDF has no pages".to_string()));
        }
        let text = self.text_from_pages(path, pdf_bytes, &pages, image_only_pages(&doc))?;

        if text.trim().is_empty() {
            return Err(BillError::Extraction(
                "No readable text found in PDF".to_string(),
            ));
        }
        Ok(text.trim().to_string())
    }

    fn text_from_pages(
        &self,
        path: &Path,
        pdf_bytes: &[u8],
        pages: &[String],
        image_only: usize,
    ) -> Result<String, BillError> {
        match classify(pages) {
            PdfContent::Text => {
                info!(pages = pages.len(), "Detected text-based PDF");
                Ok(digital_text(pdf_bytes, pages))
            }
            PdfContent::ScannedImage => {
                info!(
                    pages = pages.len(),
                    image_only, "Detected scanned PDF, falling back to OCR"
                );
                self.ocr
                    .recognize(path)
                    .map_err(|e| BillError::Extraction(format!("Failed to extract text: {e}")))
            }
        }
    }
}

impl<O: OcrEngine> TextSource for PdfTextExtractor<O> {
    fn extract(&self, path: &Path) -> Result<String, BillError> {
        let bytes = fs::read(path).map_err(|e| {
            BillError::Extraction(format!("Failed to read {}: {e}", path.display()))
        })?;
        self.extract_bytes(path, &bytes)
    }
}

/// Text of every page in page order; a page that fails to decode counts as blank.
fn page_texts(doc: &Document) -> Vec<String> {
    doc.get_pages()
        .keys()
        .map(|&page_num| doc.extract_text(&[page_num]).unwrap_or_default())
        .collect()
}

/// Full text of a digital PDF. `pdf-extract` keeps layout better than the
/// raw per-page pass, but it can panic on odd fonts, so it is fenced off.
fn digital_text(pdf_bytes: &[u8], pages: &[String]) -> String {
    let extracted = std::panic::catch_unwind(|| ::pdf_extract::extract_text_from_mem(pdf_bytes));
    match extracted {
        Ok(Ok(text)) if !text.trim().is_empty() => {
            info!(chars = text.len(), "Text extracted with pdf-extract");
            text
        }
        Ok(Ok(_)) => {
            warn!("pdf-extract returned no text, using per-page text");
            join_pages(pages)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "pdf-extract failed, using per-page text");
            join_pages(pages)
        }
        Err(_) => {
            warn!("pdf-extract panicked, using per-page text");
            join_pages(pages)
        }
    }
}

fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Count pages whose resources hold XObject images but no fonts.
/// Only used to annotate the scanned-PDF log line.
fn image_only_pages(doc: &Document) -> usize {
    let mut image_only = 0;

    for object_id in doc.get_pages().values() {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Some(page_dict) = page_obj.as_dict().ok() else {
            continue;
        };

        let resources = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok());

        let non_empty = |key: &[u8]| {
            resources
                .and_then(|res| res.get(key).ok())
                .and_then(|o| doc.dereference(o).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
                .is_some_and(|d| !d.is_empty())
        };

        if non_empty(b"XObject") && !non_empty(b"Font") {
            image_only += 1;
        }
    }

    image_only
}
