// Document loading for the extraction worker: fetch, guard, decode pages on demand.
// Parsing itself is left to the `pdf-extract` crate.

use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

use async_trait::async_trait;
use pdf_extract::{Document, PlainTextOutput};
use reqwest::Client;
use tracing::{debug, info, warn};

use super::document::{DocumentLoader, PdfDocument};
use super::error::ExtractionError;
use crate::locator::{ResourceLocator, HTTP_CLIENT};

pub const PDF_LIMIT_BYTES: u64 = 500 * 1024 * 1024; // 500 MiB

/// A parsed PDF whose pages are decoded one at a time.
pub struct LoadedPdf {
    doc: Document,
    page_count: usize,
}

impl LoadedPdf {
    /// Parses the document structure only; no page content is decoded here.
    pub fn from_mem(bytes: &[u8]) -> Result<Self, ExtractionError> {
        let mut doc = Document::load_mem(bytes).map_err(classify_pdf_error)?;
        if doc.is_encrypted() && doc.encryption_state.is_none() {
            // Owner-password-only files open with the empty user password.
            doc.decrypt("")
                .map_err(|e| ExtractionError::Encrypted(e.to_string()))?;
        }
        let page_count = doc.get_pages().len();
        Ok(Self { doc, page_count })
    }
}

impl PdfDocument for LoadedPdf {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_text(&self, page: usize) -> Result<String, ExtractionError> {
        let out_of_range = || ExtractionError::PageOutOfRange {
            page,
            total: self.page_count,
        };
        if page == 0 || page > self.page_count {
            return Err(out_of_range());
        }
        let page_num = u32::try_from(page).map_err(|_| out_of_range())?;

        // pdf-extract panics on some malformed content streams
        let decoded = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut text = String::new();
            let written = {
                let mut output = PlainTextOutput::new(&mut text);
                pdf_extract::output_doc_page(&self.doc, &mut output, page_num)
            };
            written.map(|_| text)
        }));

        match decoded {
            Ok(Ok(text)) => {
                debug!(target: "pdf_loader", page, chars = text.len(), "Page decoded");
                Ok(text)
            }
            Ok(Err(e)) => Err(classify_pdf_error(e)),
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ExtractionError::Parse(format!(
                    "page {} could not be decoded: {}",
                    page, reason
                )))
            }
        }
    }
}

fn classify_pdf_error(err: impl Display) -> ExtractionError {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("encrypt") || lower.contains("password") || lower.contains("decrypt") {
        ExtractionError::Encrypted(message)
    } else {
        ExtractionError::Parse(message)
    }
}

/// Returns true if given content-type or head indicates a PDF file.
/// - Content-Type: application/pdf (case-insensitive, substring match)
/// - Magic bytes: %PDF-
pub fn is_pdf(content_type: Option<&str>, head: &[u8]) -> bool {
    let ct = content_type.unwrap_or("").to_ascii_lowercase();
    ct.contains("application/pdf") || head.starts_with(b"%PDF-")
}

/// Default [`DocumentLoader`]: reads the bytes behind a locator and parses
/// the document structure on the blocking pool. Pages are decoded lazily.
pub struct PdfExtractLoader {
    client: Client,
    max_bytes: u64,
}

impl PdfExtractLoader {
    pub fn new() -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            max_bytes: PDF_LIMIT_BYTES,
        }
    }

    #[cfg(test)]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    async fn read_bytes(
        &self,
        locator: &ResourceLocator,
    ) -> Result<(Vec<u8>, Option<String>), ExtractionError> {
        match locator {
            ResourceLocator::Remote(url) => {
                let response = self.client.get(url.as_str()).send().await?;

                let status = response.status();
                if !status.is_success() {
                    warn!(target: "pdf_loader", url = %url, status = status.as_u16(), "HTTP non-success status");
                    return Err(ExtractionError::HttpStatus(status.as_u16()));
                }

                if let Some(len) = response.content_length() {
                    self.check_size(len)?;
                }

                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|ct| ct.to_str().ok())
                    .map(|s| s.to_string());

                let bytes = response.bytes().await?;
                self.check_size(bytes.len() as u64)?;
                Ok((bytes.to_vec(), content_type))
            }
            ResourceLocator::Local(path) => {
                let metadata = tokio::fs::metadata(path).await?;
                self.check_size(metadata.len())?;
                let bytes = tokio::fs::read(path).await?;
                Ok((bytes, None))
            }
        }
    }

    fn check_size(&self, size: u64) -> Result<(), ExtractionError> {
        if size > self.max_bytes {
            return Err(ExtractionError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentLoader for PdfExtractLoader {
    async fn open(&self, locator: &str) -> Result<Box<dyn PdfDocument>, ExtractionError> {
        let locator = ResourceLocator::parse(locator)?;
        info!(target: "pdf_loader", url = %locator, "Starting document fetch");

        let (bytes, content_type) = self.read_bytes(&locator).await?;
        let size = bytes.len();

        let head = &bytes[..size.min(512)];
        if !is_pdf(content_type.as_deref(), head) {
            let ct = content_type.unwrap_or_else(|| "unknown".to_string());
            warn!(target: "pdf_loader", url = %locator, content_type = %ct, "Resource is not a PDF");
            return Err(ExtractionError::NotPdf(ct));
        }

        info!(target: "pdf_loader", url = %locator, size, "Parsing PDF");
        let started = std::time::Instant::now();
        let document = tokio::task::spawn_blocking(move || LoadedPdf::from_mem(&bytes))
            .await
            .map_err(|e| ExtractionError::Parse(format!("PDF parser aborted: {}", e)))??;

        info!(
            target: "pdf_loader",
            url = %locator,
            pages = document.page_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "PDF opened"
        );
        Ok(Box::new(document))
    }
}
