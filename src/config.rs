use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub api_key: String,
    pub model: String,
    pub use_vertex_ai: bool,
    pub api_base: Option<String>,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub http_timeout: Duration,
    pub pricing_json_path: Option<PathBuf>,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup, so callers can
    /// feed values from somewhere other than the process environment.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("GOOGLE_API_KEY"))
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("GEMINI_API_KEY or GOOGLE_API_KEY must be set".to_string())
            })?;

        let max_attempts: u32 = parse_or(&lookup, "ANALYST_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(AppError::Config(
                "ANALYST_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            environment: lookup("ANALYST_ENVIRONMENT")
                .unwrap_or_else(|| "development".to_string()),
            api_key,
            model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            use_vertex_ai: parse_or(&lookup, "GOOGLE_GENAI_USE_VERTEXAI", false)?,
            api_base: lookup("GEMINI_API_BASE").filter(|v| !v.is_empty()),
            max_attempts,
            retry_base_delay: Duration::from_millis(parse_or(
                &lookup,
                "ANALYST_RETRY_BASE_DELAY_MS",
                1000,
            )?),
            http_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ANALYST_HTTP_TIMEOUT_SECS",
                120,
            )?),
            pricing_json_path: lookup("PRICING_JSON_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            otel_service_name: lookup("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| "earnings-analyst".to_string()),
            otel_exporter_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                .filter(|v| !v.is_empty()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
