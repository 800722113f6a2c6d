use async_trait::async_trait;

use super::error::ExtractionError;

/// An opened PDF. Page indices are 1-based.
pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> usize;

    fn page_text(&self, page: usize) -> Result<String, ExtractionError>;
}

/// Opens documents by resource locator.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn open(&self, locator: &str) -> Result<Box<dyn PdfDocument>, ExtractionError>;
}

/// Document whose page texts have already been decoded.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct ExtractedPages {
    pages: Vec<String>,
}

#[cfg(test)]
impl ExtractedPages {
    pub fn new(pages: Vec<String>) -> Self {
        Self { pages }
    }
}

#[cfg(test)]
impl PdfDocument for ExtractedPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page: usize) -> Result<String, ExtractionError> {
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .cloned()
            .ok_or(ExtractionError::PageOutOfRange {
                page,
                total: self.pages.len(),
            })
    }
}
