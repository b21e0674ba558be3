use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::llm::{GenerateRequest, LlmClient, Schema};

use super::StepOutput;
use super::extract::MetricsExtraction;
use super::parse::parse_json_response;

pub const STEP: &str = "Earnings Forecast";
pub const PROGRESS: &str = "Step 5/6: Creating earnings forecast...";

const SYSTEM_INSTRUCTION: &str = "Provide a forecast for next quarter's revenue and EPS, and a \
    12-month stock price target. Crucially, you must state the key assumptions underpinning \
    your forecast.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextQuarter {
    pub revenue: String,
    pub eps: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub next_quarter: NextQuarter,
    #[serde(rename = "priceTarget12Month")]
    pub price_target_12_month: String,
    pub assumptions: Vec<String>,
}

pub fn schema() -> Schema {
    Schema::object([
        (
            "nextQuarter",
            Schema::object([("revenue", Schema::string()), ("eps", Schema::string())]),
        ),
        ("priceTarget12Month", Schema::string()),
        ("assumptions", Schema::string_array()),
    ])
}

pub fn request(model: &str, metrics: &MetricsExtraction) -> GenerateRequest {
    GenerateRequest::new(model, STEP)
        .system_instruction(SYSTEM_INSTRUCTION)
        .text(format!(
            "Based on the provided earnings data and trends for {}, create a financial \
            forecast. Data: {}",
            metrics.company_name,
            metrics.financials_json()
        ))
        .json_schema(schema())
}

#[tracing::instrument(
    name = "pipeline_stage forecast",
    skip(llm_client, metrics),
    fields(pipeline.stage = "forecast", forecast.assumptions)
)]
pub async fn forecast(
    llm_client: &LlmClient,
    model: &str,
    metrics: &MetricsExtraction,
) -> Result<StepOutput<Forecast>, AppError> {
    let resp = llm_client.generate(&request(model, metrics)).await?;
    let forecast: Forecast = parse_json_response(resp.text_or_empty(), STEP)?;

    tracing::Span::current().record("forecast.assumptions", forecast.assumptions.len());

    Ok(StepOutput::new(forecast, &resp))
}
