// src/error.rs

use thiserror::Error;

/// Everything that can go wrong while turning one PDF into a bill record.
///
/// These never abort a batch: the pipeline folds them into a failed row
/// for the offending file and moves on.
#[derive(Debug, Error)]
pub enum BillError {
    /// No usable text could be recovered from the PDF.
    #[error("{0}")]
    Extraction(String),

    /// pdftoppm / tesseract failed or are missing.
    #[error("OCR failed: {0}")]
    Ocr(String),

    /// Network, auth, quota or an empty reply from the model endpoint.
    #[error("Model API error: {0}")]
    Model(String),

    /// The model replied, but nothing in the reply parsed as a JSON object.
    #[error("{message}:\n{reply}")]
    Parse { message: String, reply: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<reqwest::Error> for BillError {
    fn from(e: reqwest::Error) -> Self {
        BillError::Model(e.to_string())
    }
}
