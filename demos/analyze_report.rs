//! Runs the full analysis on a local PDF and prints the result as JSON.
//!
//! ```sh
//! GEMINI_API_KEY=... cargo run --example analyze_report -- path/to/report.pdf
//! ```

use anyhow::Context;
use earnings_analyst::{Analyst, Config, UploadedDocument, telemetry::init_telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let telemetry_guard = init_telemetry(&config)?;

    let path = std::env::args()
        .nth(1)
        .context("usage: analyze_report <earnings-report.pdf>")?;

    tracing::info!(
        model = %config.model,
        vertex_ai = config.use_vertex_ai,
        exporting = telemetry_guard.is_exporting(),
        path = %path,
        "Starting earnings-analyst"
    );

    let analyst = Analyst::from_config(&config)?;
    let outcome = match UploadedDocument::from_path(&path).await {
        Ok(document) => {
            let progress = |message: &str| eprintln!("{message}");
            analyst.analyze(&document, &progress).await
        }
        Err(err) => Err(err),
    };

    let exit_code = match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            0
        }
        Err(err) => {
            eprintln!("{err}");
            1
        }
    };

    telemetry_guard.shutdown();
    std::process::exit(exit_code);
}
