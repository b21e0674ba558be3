use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::schema::Schema;
use super::{Citation, GenerateRequest, GenerateResponse, GenerativeModel, LlmError, Part};
use crate::config::Config;
use crate::error::{AppError, AppResult};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const VERTEX_EXPRESS_API_BASE: &str = "https://aiplatform.googleapis.com/v1/publishers/google";

/// `generateContent` over REST, for either the Gemini Developer API or
/// Vertex AI express mode. Both take an API key.
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    provider_name: String,
}

impl GeminiModel {
    pub fn new(api_key: &str, timeout: Duration) -> AppResult<Self> {
        Self::build(api_key, timeout, GEMINI_API_BASE, "gcp.gemini")
    }

    pub fn new_vertex(api_key: &str, timeout: Duration) -> AppResult<Self> {
        Self::build(api_key, timeout, VERTEX_EXPRESS_API_BASE, "gcp.vertex_ai")
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let model = if config.use_vertex_ai {
            Self::new_vertex(&config.api_key, config.http_timeout)?
        } else {
            Self::new(&config.api_key, config.http_timeout)?
        };
        Ok(match &config.api_base {
            Some(base) => model.with_api_base(base),
            None => model,
        })
    }

    fn build(api_key: &str, timeout: Duration, api_base: &str, provider: &str) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            api_base: api_base.to_string(),
            provider_name: provider.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Serialize, Debug)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
enum WirePart<'a> {
    Text(&'a str),
    InlineData(InlineData<'a>),
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Schema,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize, Debug)]
struct GoogleSearch {}

fn build_request_body(req: &GenerateRequest) -> GeminiRequest<'_> {
    let parts = req
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => WirePart::Text(text),
            Part::InlineData { mime_type, data } => WirePart::InlineData(InlineData {
                mime_type,
                data,
            }),
        })
        .collect();

    GeminiRequest {
        contents: vec![Content {
            role: Some("user"),
            parts,
        }],
        system_instruction: req.system_instruction.as_deref().map(|text| Content {
            role: None,
            parts: vec![WirePart::Text(text)],
        }),
        generation_config: req
            .response_schema
            .as_ref()
            .map(|schema| GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
            }),
        tools: if req.google_search {
            vec![Tool {
                google_search: GoogleSearch {},
            }]
        } else {
            Vec::new()
        },
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize, Debug)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Deserialize, Debug)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

fn into_generate_response(resp: GeminiResponse, requested_model: &str) -> GenerateResponse {
    let first = resp.candidates.first();

    let texts: Vec<&str> = first
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default();
    let text = if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    };

    let citations = first
        .and_then(|c| c.grounding_metadata.as_ref())
        .map(|meta| {
            meta.grounding_chunks
                .iter()
                .filter_map(|chunk| chunk.web.as_ref())
                .map(|web| Citation {
                    uri: web.uri.clone(),
                    title: web.title.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    let finish_reason = first
        .and_then(|c| c.finish_reason.clone())
        .unwrap_or_default();

    let (input_tokens, output_tokens) = match &resp.usage_metadata {
        Some(usage) => (usage.prompt_token_count, usage.candidates_token_count),
        None => (0, 0),
    };

    GenerateResponse {
        text,
        candidate_count: resp.candidates.len(),
        citations,
        model: resp
            .model_version
            .unwrap_or_else(|| requested_model.to_string()),
        input_tokens,
        output_tokens,
        finish_reason,
        cost_usd: 0.0,
    }
}

#[async_trait::async_trait]
impl GenerativeModel for GeminiModel {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| LlmError::InvalidRequest(format!("invalid API key header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(self.endpoint(&req.model))
            .headers(headers)
            .json(&build_request_body(req))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiError>(&error_body)
                .map(|err| err.error.message)
                .unwrap_or(error_body);
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let resp: GeminiResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Decode(e.to_string()))?;

        Ok(into_generate_response(resp, &req.model))
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}
