use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::UploadedDocument;
use crate::error::AppError;
use crate::llm::LlmClient;
use crate::telemetry::metrics::{ANALYSIS_DURATION, ANALYSIS_FAILURES};

use super::compete::{self, CompetitiveAnalysis};
use super::extract::{self, FinancialMetric};
use super::forecast::{self, Forecast};
use super::progress::ProgressSink;
use super::recommend::{self, StockRecommendation};
use super::risk::{self, RiskAssessment};
use super::summarize;
use super::{StepOutput, Usage};

pub const COMPLETE: &str = "Analysis complete.";

/// Everything the six steps produced. Only built once all of them succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub company_name: String,
    pub ticker_symbol: String,
    pub period: String,
    pub executive_summary: String,
    pub financials: Vec<FinancialMetric>,
    pub competition: CompetitiveAnalysis,
    pub recommendation: StockRecommendation,
    pub forecast: Forecast,
    pub risks: RiskAssessment,
}

fn settle<T>(
    step: &str,
    result: Result<StepOutput<T>, AppError>,
    usage: &mut Usage,
) -> Result<T, AppError> {
    match result {
        Ok(output) => {
            *usage += output.usage;
            Ok(output.value)
        }
        Err(err) => {
            tracing::error!(step, error = %err, "analysis step failed, aborting run");
            ANALYSIS_FAILURES.add(
                1,
                &[
                    KeyValue::new("analysis.step", step.to_string()),
                    KeyValue::new("error.kind", err.kind()),
                ],
            );
            Err(err)
        }
    }
}

/// Validates the upload, then runs the analysis. Rejected uploads never reach the API.
pub async fn analyze_upload(
    llm_client: &LlmClient,
    model: &str,
    bytes: Vec<u8>,
    media_type: &str,
    progress: &dyn ProgressSink,
) -> Result<AnalysisResult, AppError> {
    let document = UploadedDocument::new(bytes, media_type).inspect_err(|err| {
        tracing::warn!(media_type, error = %err, "upload rejected");
    })?;
    analyze_report(llm_client, model, &document, progress).await
}

/// Runs the six steps strictly in order. Each later prompt embeds earlier
/// output, and the first failure ends the run.
#[tracing::instrument(
    name = "pipeline analysis",
    skip(llm_client, document, progress),
    fields(
        analysis.run_id = %Uuid::new_v4(),
        analysis.document = document.name().unwrap_or("upload"),
        analysis.company,
        analysis.total_tokens,
        analysis.cost_usd,
        analysis.duration_ms,
    )
)]
pub async fn analyze_report(
    llm_client: &LlmClient,
    model: &str,
    document: &UploadedDocument,
    progress: &dyn ProgressSink,
) -> Result<AnalysisResult, AppError> {
    let start = std::time::Instant::now();
    let span = tracing::Span::current();
    let mut usage = Usage::default();

    if document.exceeds_recommended_size() {
        tracing::warn!(
            bytes = document.len(),
            "document is larger than the recommended upload size"
        );
    }

    progress.report(extract::PROGRESS);
    let metrics = settle(
        extract::STEP,
        extract::extract(llm_client, model, document).await,
        &mut usage,
    )?;
    span.record("analysis.company", metrics.company_name.as_str());

    progress.report(summarize::PROGRESS);
    let executive_summary = settle(
        summarize::STEP,
        summarize::summarize(llm_client, model, &metrics).await,
        &mut usage,
    )?;

    progress.report(compete::PROGRESS);
    let competition = settle(
        compete::STEP,
        compete::compete(llm_client, model, &metrics).await,
        &mut usage,
    )?;

    progress.report(recommend::PROGRESS);
    let recommendation = settle(
        recommend::STEP,
        recommend::recommend(llm_client, model, &metrics, &competition).await,
        &mut usage,
    )?;

    progress.report(forecast::PROGRESS);
    let forecast = settle(
        forecast::STEP,
        forecast::forecast(llm_client, model, &metrics).await,
        &mut usage,
    )?;

    progress.report(risk::PROGRESS);
    let risks = settle(
        risk::STEP,
        risk::assess(llm_client, model, &metrics, &competition).await,
        &mut usage,
    )?;

    progress.report(COMPLETE);

    let duration = start.elapsed();
    ANALYSIS_DURATION.record(duration.as_secs_f64(), &[]);
    span.record("analysis.total_tokens", usage.total_tokens());
    span.record("analysis.cost_usd", usage.cost_usd);
    span.record("analysis.duration_ms", duration.as_millis() as u64);

    tracing::info!(
        company = %metrics.company_name,
        ticker = %metrics.ticker_symbol,
        rating = %recommendation.recommendation,
        sources = competition.sources.len(),
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        cost_usd = usage.cost_usd,
        "analysis complete"
    );

    Ok(AnalysisResult {
        company_name: metrics.company_name,
        ticker_symbol: metrics.ticker_symbol,
        period: metrics.period,
        executive_summary,
        financials: metrics.financials,
        competition,
        recommendation,
        forecast,
        risks,
    })
}
