//! Extraction worker: opens a PDF and concatenates the text of its first pages.

pub mod document;
pub mod error;
pub mod pdf;
pub mod worker;

pub use document::{DocumentLoader, PdfDocument};
pub use error::ExtractionError;
pub use pdf::PdfExtractLoader;
pub use worker::{extract_text, ExtractionWorker};
