use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const ERROR_BODY_PLACEHOLDER: &str = "The error response did not contain JSON.";
const LOG_PREVIEW_BYTES: usize = 2000;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request error: {0}")]
    Request(#[source] reqwest::Error),

    #[error("API error: HTTP status {status}")]
    Api { status: u16, body: Value },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("response did not contain generated text")]
    NoResult,
}

/// Remote model that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_prompt(prompt: &'a str) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Pulls `candidates[0].content.parts[0].text` out of a response body.
/// Any missing or mistyped level yields `None`.
fn first_candidate_text(body: Value) -> Option<String> {
    let response: GenerateContentResponse = serde_json::from_value(body).ok()?;
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
}

fn parse_error_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "message": ERROR_BODY_PLACEHOLDER }))
}

fn preview(text: &str) -> &str {
    if text.len() <= LOG_PREVIEW_BYTES {
        return text;
    }
    let mut end = LOG_PREVIEW_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
}

impl GeminiClient {
    pub fn with_model(model: &str) -> Result<Self, GenerationError> {
        Self::with_endpoint(format!("{}/{}:generateContent", API_BASE, model))
    }

    /// Uses `endpoint` verbatim; the API key is appended as the `key` query
    /// parameter on every call.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, GenerationError> {
        // No overall timeout: the call is bounded only by the transport.
        let client = Client::builder()
            .user_agent(crate::locator::USER_AGENT)
            .build()
            .map_err(GenerationError::Request)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    #[cfg(test)]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String, GenerationError> {
        let request_body = GenerateContentRequest::from_prompt(prompt);

        debug!(endpoint = %self.endpoint, prompt_chars = prompt.len(), "Sending generateContent request");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                // The request URL carries the API key; keep it out of logs.
                let e = e.without_url();
                error!(error = %e, "Generation API call failed before a response arrived");
                GenerationError::Request(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let body = parse_error_body(&error_text);
            error!(
                status = status.as_u16(),
                reason = status.canonical_reason().unwrap_or("Unknown"),
                body = %body,
                "Generation API returned an error response"
            );
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| GenerationError::Request(e.without_url()))?;
        let body: Value = serde_json::from_str(&response_text)?;

        match first_candidate_text(body) {
            Some(text) => {
                info!(generated = %text, "Model generated a filename");
                Ok(text)
            }
            None => {
                error!(body = %preview(&response_text), "Response was successful but contained no filename");
                Err(GenerationError::NoResult)
            }
        }
    }
}
