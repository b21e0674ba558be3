use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Removes a leading ```` ```json ```` (or bare ```` ``` ````) fence and a
/// trailing ```` ``` ```` fence. Text without fences is only trimmed.
pub fn strip_json_fence(content: &str) -> &str {
    let mut text = content.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Decodes a schema-constrained response. Missing or mistyped fields are a
/// format error for `step`; nothing is defaulted.
pub fn parse_json_response<T: DeserializeOwned>(content: &str, step: &str) -> Result<T, AppError> {
    serde_json::from_str(strip_json_fence(content)).map_err(|error| {
        tracing::error!(
            step,
            %error,
            response = %content.chars().take(500).collect::<String>(),
            "failed to parse model JSON"
        );
        AppError::InvalidFormat {
            step: step.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        a: i32,
    }

    #[test]
    fn test_strip_raw_json() {
        assert_eq!(strip_json_fence("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(strip_json_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_bare_fence() {
        assert_eq!(strip_json_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_fenced() {
        let sample: Sample = parse_json_response("```json\n{\"a\": 7}\n```", "Sample").unwrap();
        assert_eq!(sample, Sample { a: 7 });
    }

    #[test]
    fn test_parse_malformed_names_step() {
        let err = parse_json_response::<Sample>("```json\n{\"a\": \n```", "Financial Metrics")
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("invalid format for Financial Metrics")
        );
    }

    #[test]
    fn test_parse_missing_field_is_not_defaulted() {
        let err = parse_json_response::<Sample>("{}", "Earnings Forecast").unwrap_err();
        assert!(matches!(err, AppError::InvalidFormat { step } if step == "Earnings Forecast"));
    }

    #[test]
    fn test_parse_prose_is_rejected() {
        let content = "Here is the data you asked for";
        assert!(parse_json_response::<Sample>(content, "Risk Assessment").is_err());
    }
}
