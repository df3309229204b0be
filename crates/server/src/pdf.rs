//! PDF text extraction for uploaded invoices.

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("pdf extraction failed: {0}")]
    Extract(String),
    #[error("pdf extraction task failed: {0}")]
    Task(String),
}

/// Extracts the plain text of every page, concatenated in page order.
/// `pdf-extract` is synchronous, so the work runs on a blocking thread.
pub async fn extract_text(path: &Path) -> Result<String, PdfError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text(&path).map_err(|error| PdfError::Extract(error.to_string()))
    })
    .await
    .map_err(|error| PdfError::Task(error.to_string()))?
}
