use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::llm::{GenerateRequest, LlmClient, Schema};

use super::StepOutput;
use super::compete::CompetitiveAnalysis;
use super::extract::MetricsExtraction;
use super::parse::parse_json_response;

pub const STEP: &str = "Risk Assessment";
pub const PROGRESS: &str = "Step 6/6: Assessing risks and catalysts...";

const SYSTEM_INSTRUCTION: &str = "Provide a balanced assessment. For each risk, suggest a \
    potential mitigation. For each catalyst, describe its potential impact.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub risk: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalyst {
    pub catalyst: String,
    pub impact: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risks: Vec<Risk>,
    pub catalysts: Vec<Catalyst>,
}

pub fn schema() -> Schema {
    Schema::object([
        (
            "risks",
            Schema::array(Schema::object([
                ("risk", Schema::string()),
                ("mitigation", Schema::string()),
            ])),
        ),
        (
            "catalysts",
            Schema::array(Schema::object([
                ("catalyst", Schema::string()),
                ("impact", Schema::string()),
            ])),
        ),
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
            "Identify the primary risks (headwinds) and potential catalysts (tailwinds) for {} \
            over the next 12 months, considering its recent performance and the competitive \
            environment. Data: {}, Competition: \"{}\"",
            metrics.company_name,
            metrics.financials_json(),
            competition.summary
        ))
        .json_schema(schema())
}

#[tracing::instrument(
    name = "pipeline_stage risk",
    skip(llm_client, metrics, competition),
    fields(pipeline.stage = "risk", risk.risks, risk.catalysts)
)]
pub async fn assess(
    llm_client: &LlmClient,
    model: &str,
    metrics: &MetricsExtraction,
    competition: &CompetitiveAnalysis,
) -> Result<StepOutput<RiskAssessment>, AppError> {
    let resp = llm_client
        .generate(&request(model, metrics, competition))
        .await?;
    let risks: RiskAssessment = parse_json_response(resp.text_or_empty(), STEP)?;

    let span = tracing::Span::current();
    span.record("risk.risks", risks.risks.len());
    span.record("risk.catalysts", risks.catalysts.len());

    Ok(StepOutput::new(risks, &resp))
}
