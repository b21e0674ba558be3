use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::pricing::{PROVIDER_SERVERS, PriceTable};
use super::{GenerateRequest, GenerateResponse, GenerativeModel, LlmError};
use crate::config::Config;
use crate::error::AppError;
use crate::telemetry::metrics::{
    GEN_AI_COST, GEN_AI_ERROR_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_RETRY_COUNT,
    GEN_AI_TOKEN_USAGE,
};

/// Exponential backoff without jitter: `base_delay`, then double per failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.retry_base_delay,
        }
    }

    /// Delay before retry number `retry` (1-based). Saturates at `Duration::MAX`.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

#[derive(Clone)]
pub struct LlmClient {
    pub model: Arc<dyn GenerativeModel>,
    pub retry: RetryPolicy,
    pub pricing: Arc<PriceTable>,
}

impl LlmClient {
    pub fn new(model: Arc<dyn GenerativeModel>, retry: RetryPolicy) -> Self {
        Self {
            model,
            retry,
            pricing: Arc::new(PriceTable::default()),
        }
    }

    pub fn with_pricing(mut self, pricing: PriceTable) -> Self {
        self.pricing = Arc::new(pricing);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.model.name()
    }

    pub async fn generate_once(&self, req: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let provider_name = self.model.name();
        let span_display_name = format!("gen_ai.generate_content {}", req.model);
        let start = Instant::now();

        let server_addr = PROVIDER_SERVERS
            .get(provider_name)
            .copied()
            .unwrap_or("unknown");

        let output_type = if req.response_schema.is_some() {
            "json"
        } else {
            "text"
        };

        let span = tracing::info_span!(
            "gen_ai.generate_content",
            otel.name = %span_display_name,
            gen_ai.operation.name = "generate_content",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            gen_ai.output.type = output_type,
            server.address = %server_addr,
            server.port = 443_i64,
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.usage.cost_usd = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            analysis.step = %req.step,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        {
            let mut user_event_attrs = vec![KeyValue::new(
                "gen_ai.prompt",
                truncate(&req.prompt_text(), 1000),
            )];
            if let Some(system) = &req.system_instruction {
                user_event_attrs.push(KeyValue::new(
                    "gen_ai.system_instructions",
                    truncate(system, 500),
                ));
            }
            span.add_event("gen_ai.user.message", user_event_attrs);
        }

        let result = self
            .model
            .generate(req)
            .instrument(span.clone())
            .await
            .and_then(|resp| {
                if resp.is_empty() {
                    Err(LlmError::EmptyResponse)
                } else {
                    Ok(resp)
                }
            });

        let duration = start.elapsed().as_secs_f64();
        let op_kv = KeyValue::new("gen_ai.operation.name", "generate_content");
        let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name.to_string());

        match result {
            Ok(mut resp) => {
                resp.cost_usd = self.pricing.calculate_cost(
                    &resp.model,
                    resp.input_tokens,
                    resp.output_tokens,
                );

                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", i64::from(resp.input_tokens));
                span.record("gen_ai.usage.output_tokens", i64::from(resp.output_tokens));
                span.record("gen_ai.usage.cost_usd", resp.cost_usd);
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                span.add_event(
                    "gen_ai.assistant.message",
                    vec![KeyValue::new(
                        "gen_ai.completion",
                        truncate(resp.text_or_empty(), 2000),
                    )],
                );

                let model_kv = KeyValue::new("gen_ai.request.model", req.model.clone());

                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.input_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "input"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.output_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "output"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_OPERATION_DURATION.record(
                    duration,
                    &[op_kv.clone(), provider_kv.clone(), model_kv.clone()],
                );
                GEN_AI_COST.add(resp.cost_usd, &[op_kv, provider_kv, model_kv]);

                Ok(resp)
            }
            Err(err) => {
                let error_type = classify_error(&err);
                span.record("otel.status_code", "ERROR");
                span.record("error.type", error_type);

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        provider_kv,
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                        KeyValue::new("error.type", error_type),
                    ],
                );

                Err(err)
            }
        }
    }

    /// Retries every failure up to `max_attempts`, then maps the last one to
    /// the user-facing error.
    pub async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, AppError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match self.generate_once(req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                tracing::error!(
                    attempt,
                    max_attempts,
                    step = %req.step,
                    model = %req.model,
                    error = %err,
                    "Gemini call failed after retries"
                );
                return Err(classify_exhausted(err, &req.step));
            }

            let delay = self.retry.delay_before_retry(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                step = %req.step,
                model = %req.model,
                error = %err,
                "Gemini call failed, retrying"
            );

            GEN_AI_RETRY_COUNT.add(
                1,
                &[
                    KeyValue::new("gen_ai.provider.name", self.model.name().to_string()),
                    KeyValue::new("gen_ai.request.model", req.model.clone()),
                ],
            );

            tokio::time::sleep(delay).await;
        }
    }
}

fn classify_exhausted(err: LlmError, step: &str) -> AppError {
    let step = step.to_string();
    match err.status() {
        Some(429) => AppError::RateLimited { step },
        Some(500..=599) => AppError::ServiceUnavailable { step },
        _ => AppError::Api {
            step,
            message: err.to_string(),
        },
    }
}

fn classify_error(err: &LlmError) -> &'static str {
    match err {
        LlmError::EmptyResponse => "empty_response",
        LlmError::Decode(_) => "decode_error",
        LlmError::InvalidRequest(_) => "invalid_request",
        LlmError::Http(e) if e.is_timeout() => "timeout",
        LlmError::Http(e) if e.is_connect() => "network_error",
        _ => match err.status() {
            Some(429) => "rate_limit",
            Some(401 | 403) => "auth_error",
            Some(400 | 404 | 422) => "invalid_request",
            Some(500..=599) => "server_error",
            _ => "unknown_error",
        },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, _)| i < max)
            .map(|(_, c)| c)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::llm::fake::ScriptedModel;
    use crate::llm::pricing::PriceEntry;

    fn client(model: Arc<ScriptedModel>) -> LlmClient {
        LlmClient::new(model, RetryPolicy::default())
    }

    fn assert_gap(observed: Duration, expected: Duration) {
        assert!(
            observed >= expected && observed < expected + Duration::from_millis(50),
            "expected a {expected:?} backoff, observed {observed:?}"
        );
    }

    fn request() -> GenerateRequest {
        GenerateRequest::new("gemini-2.5-flash", "Financial Metrics").text("hello")
    }

    #[test]
    fn test_delay_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before_retry(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_before_retry(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_before_retry(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            max_attempts: 80,
            base_delay: Duration::from_millis(u64::MAX),
        };
        assert_eq!(policy.delay_before_retry(1), Duration::from_millis(u64::MAX));
        assert_eq!(policy.delay_before_retry(40), Duration::MAX);
        assert_eq!(policy.delay_before_retry(79), Duration::MAX);
    }

    #[test]
    fn test_classify_error_categories() {
        let status = |status: u16| LlmError::Status {
            status,
            message: String::new(),
        };
        let cases = vec![
            (status(429), "rate_limit"),
            (status(401), "auth_error"),
            (status(403), "auth_error"),
            (status(400), "invalid_request"),
            (status(404), "invalid_request"),
            (status(500), "server_error"),
            (status(503), "server_error"),
            (status(504), "server_error"),
            (status(418), "unknown_error"),
            (LlmError::EmptyResponse, "empty_response"),
            (LlmError::Decode("eof".to_string()), "decode_error"),
            (
                LlmError::InvalidRequest("bad header".to_string()),
                "invalid_request",
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(
                classify_error(&err),
                expected,
                "classify_error({err:?}) should be {expected:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_third_attempt_waits_one_then_two_seconds() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::status(503),
            ScriptedModel::status(503),
            ScriptedModel::text("ok"),
        ]));

        let resp = assert_ok!(client(model.clone()).generate(&request()).await);
        assert_eq!(resp.text.as_deref(), Some("ok"));

        let times = model.call_times();
        assert_eq!(times.len(), 3);
        assert_gap(times[1] - times[0], Duration::from_millis(1000));
        assert_gap(times[2] - times[1], Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fourth_attempt_after_three_failures() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::status(500),
            ScriptedModel::status(500),
            ScriptedModel::status(500),
            ScriptedModel::text("too late"),
        ]));

        let err = assert_err!(client(model.clone()).generate(&request()).await);
        assert!(matches!(err, AppError::ServiceUnavailable { .. }));
        assert_eq!(err.step(), Some("Financial Metrics"));
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_rate_limit_is_classified() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::status(429),
            ScriptedModel::status(429),
            ScriptedModel::status(429),
        ]));

        let err = assert_err!(client(model).generate(&request()).await);
        assert_eq!(
            err.to_string(),
            "Financial Metrics failed: API rate limit exceeded. Please wait and try again later."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_other_error_is_generic() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::status(400),
            ScriptedModel::status(400),
            ScriptedModel::status(400),
        ]));

        let err = assert_err!(client(model).generate(&request()).await);
        assert!(matches!(err, AppError::Api { .. }));
        assert_eq!(err.step(), Some("Financial Metrics"));
        assert!(err.to_string().contains("scripted failure 400"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_response_is_retried() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(GenerateResponse::default()),
            ScriptedModel::text("recovered"),
        ]));

        let resp = assert_ok!(client(model.clone()).generate(&request()).await);
        assert_eq!(resp.text.as_deref(), Some("recovered"));
        assert_eq!(model.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_empty_response_is_generic_error() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(GenerateResponse::default()),
            Ok(GenerateResponse::default()),
            Ok(GenerateResponse::default()),
        ]));

        let err = assert_err!(client(model).generate(&request()).await);
        assert!(err.to_string().contains("empty or invalid response"));
    }

    #[tokio::test]
    async fn test_cost_is_filled_in() {
        let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::text("ok")]));
        let resp = assert_ok!(client(model).generate(&request()).await);
        assert!(resp.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn test_cost_uses_configured_prices() {
        let mut prices = PriceTable::default();
        prices.insert(
            "gemini-2.5-flash",
            PriceEntry {
                input: 10_000.0,
                output: 50_000.0,
            },
        );
        let model = Arc::new(ScriptedModel::new(vec![ScriptedModel::text("ok")]));
        let resp = assert_ok!(
            client(model)
                .with_pricing(prices)
                .generate(&request())
                .await
        );
        // 100 input and 20 output tokens
        assert!((resp.cost_usd - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_truncate_long() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let result = truncate("hé世界!", 3);
        assert!(result.len() <= 3);
        assert!(result.is_char_boundary(result.len()));
    }
}
