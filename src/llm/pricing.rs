use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// USD per million tokens.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PriceEntry {
    pub input: f64,
    pub output: f64,
}

#[derive(Deserialize)]
struct PricingFile {
    models: HashMap<String, PriceEntry>,
}

/// Per-model prices used to estimate the cost of each call.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    models: HashMap<String, PriceEntry>,
}

impl Default for PriceTable {
    fn default() -> Self {
        let models = [
            ("gemini-2.5-pro", 1.25, 10.0),
            ("gemini-2.5-flash", 0.30, 2.50),
            ("gemini-2.5-flash-lite", 0.10, 0.40),
            ("gemini-2.0-flash", 0.10, 0.40),
        ]
        .into_iter()
        .map(|(model, input, output)| (model.to_string(), PriceEntry { input, output }))
        .collect();
        Self { models }
    }
}

impl PriceTable {
    /// Built-in prices, extended by `pricing_json_path` when one is configured.
    /// An unreadable override is logged and ignored.
    pub fn from_config(config: &Config) -> Self {
        let mut table = Self::default();
        if let Some(path) = &config.pricing_json_path
            && let Err(error) = table.load_overrides(path)
        {
            tracing::warn!(
                path = %path.display(),
                %error,
                "pricing override unreadable, using built-in prices"
            );
        }
        table
    }

    /// Merges `{"models": {"<name>": {"input": .., "output": ..}}}` over the
    /// current entries.
    pub fn load_overrides(&mut self, path: &Path) -> AppResult<()> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        let parsed: PricingFile = serde_json::from_str(&data)
            .map_err(|e| AppError::Config(format!("invalid pricing file: {e}")))?;
        self.models.extend(parsed.models);
        Ok(())
    }

    pub fn insert(&mut self, model: impl Into<String>, entry: PriceEntry) {
        self.models.insert(model.into(), entry);
    }

    /// Model versions come back as e.g. `gemini-2.5-flash-preview-05-20`; fall
    /// back to the longest known prefix.
    fn lookup(&self, model: &str) -> Option<&PriceEntry> {
        self.models.get(model).or_else(|| {
            self.models
                .iter()
                .filter(|(name, _)| model.starts_with(name.as_str()))
                .max_by_key(|(name, _)| name.len())
                .map(|(_, entry)| entry)
        })
    }

    pub fn calculate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        match self.lookup(model) {
            Some(entry) => {
                (f64::from(input_tokens) * entry.input / 1_000_000.0)
                    + (f64::from(output_tokens) * entry.output / 1_000_000.0)
            }
            None => 0.0,
        }
    }
}

pub static PROVIDER_SERVERS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    HashMap::from([
        ("gcp.gemini", "generativelanguage.googleapis.com"),
        ("gcp.vertex_ai", "aiplatform.googleapis.com"),
    ])
});
