use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages exchanged between the orchestrator and the extraction worker.
///
/// The wire shape is a flat JSON object discriminated by `type`:
///
/// ```json
/// {"type":"extract","id":"…","url":"https://…/paper.pdf","pageCount":2}
/// {"type":"extracted","id":"…","text":"…"}
/// {"type":"extraction-error","id":"…","error":"…"}
/// ```
///
/// Any other `type` deserializes to [`RelayMessage::Other`] so listeners can
/// skip it instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    #[serde(rename = "extract")]
    Extract(ExtractRequest),
    #[serde(rename = "extracted")]
    Extracted(ExtractedReply),
    #[serde(rename = "extraction-error")]
    ExtractionError(ExtractionErrorReply),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub url: String,
    #[serde(rename = "pageCount", default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
}

impl ExtractRequest {
    /// Page limit requested by the sender. Absent or zero means a single page.
    pub fn page_limit(&self) -> usize {
        match self.page_count {
            Some(n) if n >= 1 => n as usize,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionErrorReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub error: String,
}

impl RelayMessage {
    pub fn extracted(id: Option<Uuid>, text: impl Into<String>) -> Self {
        RelayMessage::Extracted(ExtractedReply {
            id,
            text: text.into(),
        })
    }

    pub fn extraction_error(id: Option<Uuid>, error: impl Into<String>) -> Self {
        RelayMessage::ExtractionError(ExtractionErrorReply {
            id,
            error: error.into(),
        })
    }

    /// Correlation id carried by the message, if any.
    pub fn id(&self) -> Option<Uuid> {
        match self {
            RelayMessage::Extract(req) => req.id,
            RelayMessage::Extracted(reply) => reply.id,
            RelayMessage::ExtractionError(reply) => reply.id,
            RelayMessage::Other => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayMessage::Extract(_) => "extract",
            RelayMessage::Extracted(_) => "extracted",
            RelayMessage::ExtractionError(_) => "extraction-error",
            RelayMessage::Other => "other",
        }
    }
}
