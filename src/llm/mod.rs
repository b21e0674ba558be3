pub mod client;
pub mod gemini;
pub mod pricing;
pub mod schema;

#[cfg(test)]
pub(crate) mod fake;

use thiserror::Error;

pub use client::{LlmClient, RetryPolicy};
pub use gemini::GeminiModel;
pub use pricing::PriceTable;
pub use schema::Schema;

/// One piece of user or system content.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    /// Base64-encoded bytes with their media type.
    InlineData { mime_type: String, data: String },
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub parts: Vec<Part>,
    /// When set, the model is asked for JSON matching this schema.
    pub response_schema: Option<Schema>,
    /// Enables the Google Search grounding tool.
    pub google_search: bool,
    /// Human-readable pipeline step, used for logs and span attributes.
    pub step: String,
}

impl GenerateRequest {
    pub fn new(model: &str, step: &str) -> Self {
        Self {
            model: model.to_string(),
            system_instruction: None,
            parts: Vec::new(),
            response_schema: None,
            google_search: false,
            step: step.to_string(),
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(Part::Text(text.into()));
        self
    }

    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn json_schema(mut self, schema: Schema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_google_search(mut self) -> Self {
        self.google_search = true;
        self
    }

    /// Text parts only, joined. Inline documents are left out.
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A web source the model grounded its answer on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Citation {
    pub uri: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    pub text: Option<String>,
    pub candidate_count: usize,
    pub citations: Vec<Citation>,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: String,
    pub cost_usd: f64,
}

impl GenerateResponse {
    /// No text and no candidates at all.
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(str::is_empty) && self.candidate_count == 0
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Gemini API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned an empty or invalid response.")]
    EmptyResponse,

    #[error("failed to decode API response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Status { status, .. } => Some(*status),
            LlmError::Http(e) => e.status().map(|s| s.as_u16()),
            LlmError::EmptyResponse | LlmError::Decode(_) | LlmError::InvalidRequest(_) => None,
        }
    }
}

#[async_trait::async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, LlmError>;
    fn name(&self) -> &str;
}
