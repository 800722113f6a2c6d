use std::time::Duration;

use thiserror::Error;

use crate::locator::LocatorError;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("invalid resource locator: {0}")]
    Locator(#[from] LocatorError),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error {0} while fetching the document")]
    HttpStatus(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("resource is not a PDF (content type: {0})")]
    NotPdf(String),

    #[error("PDF exceeds the allowed size limit ({size} > {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("encrypted PDF is not supported: {0}")]
    Encrypted(String),

    #[error("failed to parse PDF content: {0}")]
    Parse(String),

    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    #[error("extraction worker failed: {0}")]
    Worker(String),

    #[error("extraction worker is unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("PDF text extraction timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("message bus closed before the worker replied")]
    BusClosed,
}
