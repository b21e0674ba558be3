use crate::error::AppError;
use crate::llm::{GenerateRequest, LlmClient};

use super::StepOutput;
use super::extract::MetricsExtraction;

pub const STEP: &str = "Executive Summary";
pub const PROGRESS: &str = "Step 2/6: Generating executive summary...";

pub fn request(model: &str, metrics: &MetricsExtraction) -> GenerateRequest {
    GenerateRequest::new(model, STEP).text(format!(
        "Based on the following financial data for {} ({}) for {}, write a concise, \
        professional executive summary of the company's performance. Data: {}",
        metrics.company_name,
        metrics.ticker_symbol,
        metrics.period,
        metrics.financials_json()
    ))
}

/// Free text; whatever the model wrote is the summary.
#[tracing::instrument(
    name = "pipeline_stage summarize",
    skip(llm_client, metrics),
    fields(pipeline.stage = "summarize", summary.chars)
)]
pub async fn summarize(
    llm_client: &LlmClient,
    model: &str,
    metrics: &MetricsExtraction,
) -> Result<StepOutput<String>, AppError> {
    let resp = llm_client.generate(&request(model, metrics)).await?;
    let summary = resp.text_or_empty().to_string();

    tracing::Span::current().record("summary.chars", summary.chars().count());

    Ok(StepOutput::new(summary, &resp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::FinancialMetric;

    #[test]
    fn test_prompt_embeds_company_and_metrics() {
        let metrics = MetricsExtraction {
            company_name: "Acme Corp".to_string(),
            ticker_symbol: "ACME".to_string(),
            period: "Q2 2024".to_string(),
            financials: vec![FinancialMetric {
                name: "Revenue".to_string(),
                value: "$1.2B".to_string(),
                yoy_change: "+8%".to_string(),
                qoq_change: "+2%".to_string(),
            }],
        };
        let prompt = request("gemini-2.5-flash", &metrics).prompt_text();
        assert!(prompt.contains("Acme Corp (ACME) for Q2 2024"));
        assert!(prompt.contains(r#""yoyChange":"+8%""#));
    }

    #[test]
    fn test_request_is_unconstrained_text() {
        let metrics = MetricsExtraction {
            company_name: "Acme".to_string(),
            ticker_symbol: "ACME".to_string(),
            period: "FY24".to_string(),
            financials: vec![],
        };
        let req = request("gemini-2.5-flash", &metrics);
        assert!(req.response_schema.is_none());
        assert!(req.system_instruction.is_none());
    }
}
