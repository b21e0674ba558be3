use serde::{Deserialize, Serialize};

use crate::document::UploadedDocument;
use crate::error::AppError;
use crate::llm::{GenerateRequest, LlmClient, Schema};

use super::StepOutput;
use super::parse::parse_json_response;

pub const STEP: &str = "Financial Metrics";
pub const PROGRESS: &str = "Step 1/6: Extracting financial metrics...";

const INSTRUCTION: &str = "Analyze this earnings report. Extract the company name, ticker symbol, \
    reporting period (e.g., Q2 2024), and key financial metrics. For each metric, provide the \
    value, Year-over-Year (YoY) change, and Quarter-over-Quarter (QoQ) change. If a change is \
    not available, state 'N/A'.";

/// One reported line item. All values are display text, "N/A" allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialMetric {
    pub name: String,
    pub value: String,
    pub yoy_change: String,
    pub qoq_change: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsExtraction {
    pub company_name: String,
    pub ticker_symbol: String,
    pub period: String,
    pub financials: Vec<FinancialMetric>,
}

impl MetricsExtraction {
    /// Metrics as compact JSON, the form later prompts embed.
    pub fn financials_json(&self) -> String {
        serde_json::to_string(&self.financials).unwrap_or_default()
    }
}

pub fn schema() -> Schema {
    Schema::object([
        ("companyName", Schema::string()),
        ("tickerSymbol", Schema::string()),
        ("period", Schema::string()),
        (
            "financials",
            Schema::array(Schema::object([
                ("name", Schema::string()),
                ("value", Schema::string()),
                ("yoyChange", Schema::string()),
                ("qoqChange", Schema::string()),
            ])),
        ),
    ])
}

pub fn request(model: &str, document: &UploadedDocument) -> GenerateRequest {
    GenerateRequest::new(model, STEP)
        .part(document.to_inline_part())
        .text(INSTRUCTION)
        .json_schema(schema())
}

#[tracing::instrument(
    name = "pipeline_stage extract",
    skip(llm_client, document),
    fields(
        pipeline.stage = "extract",
        document.bytes = document.len(),
        metrics.company,
        metrics.count,
    )
)]
pub async fn extract(
    llm_client: &LlmClient,
    model: &str,
    document: &UploadedDocument,
) -> Result<StepOutput<MetricsExtraction>, AppError> {
    let resp = llm_client.generate(&request(model, document)).await?;
    let metrics: MetricsExtraction = parse_json_response(resp.text_or_empty(), STEP)?;

    let span = tracing::Span::current();
    span.record("metrics.company", metrics.company_name.as_str());
    span.record("metrics.count", metrics.financials.len());

    Ok(StepOutput::new(metrics, &resp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Part;

    #[test]
    fn test_parse_extraction() {
        let content = r#"```json
{"companyName": "Acme Corp", "tickerSymbol": "ACME", "period": "Q2 2024",
 "financials": [{"name": "Revenue", "value": "$1.2B", "yoyChange": "+8%", "qoqChange": "N/A"}]}
```"#;
        let metrics: MetricsExtraction = parse_json_response(content, STEP).unwrap();
        assert_eq!(metrics.company_name, "Acme Corp");
        assert_eq!(metrics.financials[0].qoq_change, "N/A");
    }

    #[test]
    fn test_missing_financials_is_format_error() {
        let content = r#"{"companyName": "Acme", "tickerSymbol": "ACME", "period": "Q2"}"#;
        let err = parse_json_response::<MetricsExtraction>(content, STEP).unwrap_err();
        assert!(err.to_string().contains("invalid format for Financial Metrics"));
    }

    #[test]
    fn test_financials_json_uses_wire_names() {
        let metrics = MetricsExtraction {
            company_name: "Acme".to_string(),
            ticker_symbol: "ACME".to_string(),
            period: "Q2 2024".to_string(),
            financials: vec![FinancialMetric {
                name: "EPS".to_string(),
                value: "$1.10".to_string(),
                yoy_change: "+5%".to_string(),
                qoq_change: "-1%".to_string(),
            }],
        };
        assert_eq!(
            metrics.financials_json(),
            r#"[{"name":"EPS","value":"$1.10","yoyChange":"+5%","qoqChange":"-1%"}]"#
        );
    }

    #[test]
    fn test_request_sends_document_first_with_schema() {
        let doc = UploadedDocument::new(b"%PDF-1.4".to_vec(), "application/pdf").unwrap();
        let req = request("gemini-2.5-flash", &doc);
        assert!(matches!(req.parts[0], Part::InlineData { .. }));
        assert!(matches!(&req.parts[1], Part::Text(t) if t.contains("ticker symbol")));
        assert_eq!(
            req.response_schema.unwrap().required,
            vec!["companyName", "tickerSymbol", "period", "financials"]
        );
        assert!(req.system_instruction.is_none());
        assert!(!req.google_search);
    }
}
