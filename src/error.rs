use thiserror::Error;

/// Failure of one analysis run. The Display text is the message shown to the
/// person who uploaded the report.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Input(String),

    #[error("{step} failed: API rate limit exceeded. Please wait and try again later.")]
    RateLimited { step: String },

    #[error(
        "{step} failed: The analysis service is temporarily unavailable (server error). \
         Please try again later."
    )]
    ServiceUnavailable { step: String },

    #[error("{step} failed: An API error occurred during analysis: {message}")]
    Api { step: String, message: String },

    #[error("The model returned an invalid format for {step}. Please try again.")]
    InvalidFormat { step: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Short machine-readable category, used as a metric attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Input(_) => "input",
            AppError::RateLimited { .. } => "rate_limit",
            AppError::ServiceUnavailable { .. } => "server_error",
            AppError::Api { .. } => "api_error",
            AppError::InvalidFormat { .. } => "invalid_format",
            AppError::Config(_) => "config",
        }
    }

    /// The analysis step that failed, when the failure came from one.
    pub fn step(&self) -> Option<&str> {
        match self {
            AppError::RateLimited { step }
            | AppError::ServiceUnavailable { step }
            | AppError::Api { step, .. }
            | AppError::InvalidFormat { step } => Some(step),
            AppError::Input(_) | AppError::Config(_) => None,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
