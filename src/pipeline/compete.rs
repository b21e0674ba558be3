use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::llm::{Citation, GenerateRequest, LlmClient};
use crate::telemetry::metrics::ANALYSIS_SOURCES;

use super::StepOutput;
use super::extract::MetricsExtraction;

pub const STEP: &str = "Competitive Analysis";
pub const PROGRESS: &str = "Step 3/6: Gathering competitive intelligence...";

const UNTITLED_SOURCE: &str = "Source";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitiveAnalysis {
    pub summary: String,
    /// Always empty: competitor detail lives in `summary`.
    pub competitors: Vec<Competitor>,
    pub sources: Vec<Source>,
}

pub fn request(model: &str, metrics: &MetricsExtraction) -> GenerateRequest {
    GenerateRequest::new(model, STEP)
        .text(format!(
            "Provide a competitive analysis for {}. Identify 2-3 main competitors and briefly \
            describe their recent performance or market position. Use web search to get current \
            data.",
            metrics.company_name
        ))
        .with_google_search()
}

/// Keeps citations that carry a URI; untitled ones become "Source".
pub fn sources_from(citations: &[Citation]) -> Vec<Source> {
    citations
        .iter()
        .filter_map(|citation| {
            let uri = citation.uri.as_deref().filter(|u| !u.is_empty())?;
            let title = citation
                .title
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(UNTITLED_SOURCE);
            Some(Source {
                title: title.to_string(),
                uri: uri.to_string(),
            })
        })
        .collect()
}

#[tracing::instrument(
    name = "pipeline_stage compete",
    skip(llm_client, metrics),
    fields(
        pipeline.stage = "compete",
        competition.citations,
        competition.sources,
    )
)]
pub async fn compete(
    llm_client: &LlmClient,
    model: &str,
    metrics: &MetricsExtraction,
) -> Result<StepOutput<CompetitiveAnalysis>, AppError> {
    let resp = llm_client.generate(&request(model, metrics)).await?;
    let sources = sources_from(&resp.citations);

    let span = tracing::Span::current();
    span.record("competition.citations", resp.citations.len());
    span.record("competition.sources", sources.len());
    ANALYSIS_SOURCES.record(sources.len() as f64, &[]);

    let analysis = CompetitiveAnalysis {
        summary: resp.text_or_empty().to_string(),
        competitors: Vec::new(),
        sources,
    };

    Ok(StepOutput::new(analysis, &resp))
}
