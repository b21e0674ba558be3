pub mod compete;
pub mod extract;
pub mod forecast;
pub mod orchestrator;
pub mod parse;
pub mod progress;
pub mod recommend;
pub mod risk;
pub mod summarize;

use std::ops::AddAssign;

use serde::Serialize;

use crate::llm::GenerateResponse;

pub use orchestrator::{AnalysisResult, analyze_report, analyze_upload};
pub use progress::{ProgressSink, Silent};

/// Tokens and estimated cost of one or more Gemini calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
}

impl Usage {
    pub fn of(resp: &GenerateResponse) -> Self {
        Self {
            input_tokens: resp.input_tokens,
            output_tokens: resp.output_tokens,
            cost_usd: resp.cost_usd,
        }
    }

    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.cost_usd += rhs.cost_usd;
    }
}

/// A step's parsed value plus what producing it cost.
#[derive(Debug, Clone)]
pub struct StepOutput<T> {
    pub value: T,
    pub usage: Usage,
}

impl<T> StepOutput<T> {
    pub fn new(value: T, resp: &GenerateResponse) -> Self {
        Self {
            value,
            usage: Usage::of(resp),
        }
    }
}
