// src/ocr.rs

use crate::config::OcrSection;
use crate::error::BillError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Turns a scanned PDF into text.
pub trait OcrEngine {
    fn recognize(&self, pdf_path: &Path) -> Result<String, BillError>;
}

/// Rasterizes with Poppler's `pdftoppm`, then reads each page with `tesseract`.
pub struct TesseractOcr {
    dpi: u32,
    languages: String,
    pdftoppm: String,
    tesseract: String,
}

impl TesseractOcr {
    pub fn new(cfg: &OcrSection) -> Self {
        Self {
            dpi: cfg.dpi,
            languages: cfg.languages.clone(),
            pdftoppm: cfg.pdftoppm.clone(),
            tesseract: cfg.tesseract.clone(),
        }
    }

    /// Both binaries must start and answer `-v`.
    pub fn is_available(&self) -> bool {
        [&self.pdftoppm, &self.tesseract]
            .iter()
            .all(|bin| Command::new(bin).arg("-v").output().is_ok())
    }

    fn rasterize(&self, pdf_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, BillError> {
        let prefix = out_dir.join("page");
        let output = Command::new(&self.pdftoppm)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(pdf_path)
            .arg(&prefix)
            .output()
            .map_err(|e| BillError::Ocr(format!("{} failed to start: {e}", self.pdftoppm)))?;

        if !output.status.success() {
            return Err(BillError::Ocr(format!(
                "{} exited with {}: {}",
                self.pdftoppm,
                output.status,
                single_line(&String::from_utf8_lossy(&output.stderr))
            )));
        }

        let mut pages: Vec<PathBuf> = fs::read_dir(out_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        // pdftoppm zero-pads page numbers to a common width, so a name sort is page order.
        pages.sort();

        if pages.is_empty() {
            return Err(BillError::Ocr(format!(
                "{} produced no page images",
                self.pdftoppm
            )));
        }
        Ok(pages)
    }

    fn read_page(&self, image: &Path) -> Result<String, BillError> {
        let output = Command::new(&self.tesseract)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .output()
            .map_err(|e| BillError::Ocr(format!("{} failed to start: {e}", self.tesseract)))?;

        if !output.status.success() {
            return Err(BillError::Ocr(format!(
                "{} failed on {}: {}",
                self.tesseract,
                image.display(),
                single_line(&String::from_utf8_lossy(&output.stderr))
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, pdf_path: &Path) -> Result<String, BillError> {
        let scratch = tempfile::Builder::new().prefix("bill_ocr").tempdir()?;
        let pages = self.rasterize(pdf_path, scratch.path())?;
        info!(pages = pages.len(), dpi = self.dpi, langs = %self.languages, "Running OCR");

        let mut text = String::new();
        for page in &pages {
            let page_text = self.read_page(page)?;
            debug!(page = %page.display(), chars = page_text.len(), "OCR page done");
            text.push_str(&page_text);
            text.push('\n');
        }
        Ok(text)
    }
}

fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_ocr_error() {
        let ocr = TesseractOcr::new(&OcrSection {
            pdftoppm: "definitely-not-a-real-pdftoppm".to_string(),
            ..OcrSection::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("scan.pdf");
        fs::write(&pdf, b"%PDF-1.4").unwrap();

        let err = ocr.recognize(&pdf).unwrap_err();
        assert!(matches!(err, BillError::Ocr(ref m) if m.contains("failed to start")));
        assert!(!ocr.is_available());
    }

    #[test]
    fn test_single_line_collapses_whitespace() {
        assert_eq!(single_line("  bad\n  page\tnumber \n"), "bad page number");
    }
}
