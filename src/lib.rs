pub mod config;
pub mod document;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod telemetry;

use std::sync::Arc;

pub use config::Config;
pub use document::UploadedDocument;
pub use error::{AppError, AppResult};
pub use llm::{GeminiModel, LlmClient, PriceTable, RetryPolicy};
pub use pipeline::{AnalysisResult, ProgressSink, Silent};

/// A configured client plus the model every step runs on.
#[derive(Clone)]
pub struct Analyst {
    llm_client: LlmClient,
    model: String,
}

impl Analyst {
    pub fn new(llm_client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            llm_client,
            model: model.into(),
        }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let gemini = GeminiModel::from_config(config)?;
        let llm_client = LlmClient::new(Arc::new(gemini), RetryPolicy::from_config(config))
            .with_pricing(PriceTable::from_config(config));
        Ok(Self::new(llm_client, config.model.clone()))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn analyze(
        &self,
        document: &UploadedDocument,
        progress: &dyn ProgressSink,
    ) -> AppResult<AnalysisResult> {
        pipeline::analyze_report(&self.llm_client, &self.model, document, progress).await
    }

    pub async fn analyze_upload(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
        progress: &dyn ProgressSink,
    ) -> AppResult<AnalysisResult> {
        pipeline::analyze_upload(&self.llm_client, &self.model, bytes, media_type, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        Config::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
        .unwrap()
    }

    #[test]
    fn test_from_config_uses_configured_model() {
        let analyst = Analyst::from_config(&config(&[
            ("GEMINI_API_KEY", "test-key"),
            ("GEMINI_MODEL", "gemini-2.5-pro"),
        ]))
        .unwrap();
        assert_eq!(analyst.model(), "gemini-2.5-pro");
        assert_eq!(analyst.llm_client.provider_name(), "gcp.gemini");
    }

    #[test]
    fn test_from_config_vertex_provider() {
        let analyst = Analyst::from_config(&config(&[
            ("GOOGLE_API_KEY", "test-key"),
            ("GOOGLE_GENAI_USE_VERTEXAI", "true"),
        ]))
        .unwrap();
        assert_eq!(analyst.model(), config::DEFAULT_MODEL);
        assert_eq!(analyst.llm_client.provider_name(), "gcp.vertex_ai");
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let analyst = Analyst::from_config(&config(&[("GEMINI_API_KEY", "test-key")])).unwrap();
        let err = analyst
            .analyze_upload(Vec::new(), document::PDF_MEDIA_TYPE, &Silent)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No file provided for analysis.");
    }

    #[test]
    fn test_from_config_missing_pricing_file_falls_back() {
        let analyst = Analyst::from_config(&config(&[
            ("GEMINI_API_KEY", "test-key"),
            ("PRICING_JSON_PATH", "/nonexistent/earnings-analyst/pricing.json"),
        ]))
        .unwrap();
        assert_eq!(*analyst.llm_client.pricing, PriceTable::default());
    }
}
