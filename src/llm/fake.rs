use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::time::Instant;

use super::{GenerateRequest, GenerateResponse, GenerativeModel, LlmError};

/// Replays a fixed script of outcomes and records every request it sees.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<GenerateResponse, LlmError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<GenerateResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn text(text: &str) -> Result<GenerateResponse, LlmError> {
        Ok(GenerateResponse {
            text: Some(text.to_string()),
            candidate_count: 1,
            model: "gemini-2.5-flash".to_string(),
            input_tokens: 100,
            output_tokens: 20,
            finish_reason: "STOP".to_string(),
            ..Default::default()
        })
    }

    pub fn status(status: u16) -> Result<GenerateResponse, LlmError> {
        Err(LlmError::Status {
            status,
            message: format!("scripted failure {status}"),
        })
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        self.requests.lock().unwrap().push(req.clone());
        self.call_times.lock().unwrap().push(Instant::now());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Decode("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "gcp.gemini"
    }
}
