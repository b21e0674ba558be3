use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::llm::{GenerateRequest, LlmClient, Schema};

use super::StepOutput;
use super::compete::CompetitiveAnalysis;
use super::extract::MetricsExtraction;
use super::parse::parse_json_response;

pub const STEP: &str = "Stock Recommendation";
pub const PROGRESS: &str = "Step 4/6: Generating stock recommendation...";

const SYSTEM_INSTRUCTION: &str = "Your analysis must be balanced. Support all claims with \
    evidence from the provided data. Conclude with a clear BUY, HOLD, or SELL rating. Never \
    guarantee returns.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rating {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rating::Buy => "BUY",
            Rating::Hold => "HOLD",
            Rating::Sell => "SELL",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRecommendation {
    pub recommendation: Rating,
    pub rationale: String,
    pub bullish_points: Vec<String>,
    pub bearish_points: Vec<String>,
}

pub fn schema() -> Schema {
    Schema::object([
        ("recommendation", Schema::string_enum(&["BUY", "HOLD", "SELL"])),
        ("rationale", Schema::string()),
        ("bullishPoints", Schema::string_array()),
        ("bearishPoints", Schema::string_array()),
    ])
}

pub fn request(
    model: &str,
    metrics: &MetricsExtraction,
    competition: &CompetitiveAnalysis,
) -> GenerateRequest {
    GenerateRequest::new(model, STEP)
        .system_instruction(SYSTEM_INSTRUCTION)
        .text(format!(
            "Act as a professional equity research analyst. Given the financial data: {} and \
            competitive landscape: \"{}\", provide a stock recommendation for {}.",
            metrics.financials_json(),
            competition.summary,
            metrics.ticker_symbol
        ))
        .json_schema(schema())
}

#[tracing::instrument(
    name = "pipeline_stage recommend",
    skip(llm_client, metrics, competition),
    fields(pipeline.stage = "recommend", recommendation.rating)
)]
pub async fn recommend(
    llm_client: &LlmClient,
    model: &str,
    metrics: &MetricsExtraction,
    competition: &CompetitiveAnalysis,
) -> Result<StepOutput<StockRecommendation>, AppError> {
    let resp = llm_client
        .generate(&request(model, metrics, competition))
        .await?;
    let recommendation: StockRecommendation = parse_json_response(resp.text_or_empty(), STEP)?;

    tracing::Span::current().record(
        "recommendation.rating",
        tracing::field::display(recommendation.recommendation),
    );

    Ok(StepOutput::new(recommendation, &resp))
}
