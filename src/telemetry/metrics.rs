use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::LazyLock;

pub static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("earnings-analyst"));

// --- GenAI client metrics ---

pub static GEN_AI_TOKEN_USAGE: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("gen_ai.client.token.usage")
        .with_description("Number of tokens used per Gemini call")
        .with_unit("{token}")
        .build()
});

pub static GEN_AI_OPERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("gen_ai.client.operation.duration")
        .with_description("Duration of Gemini calls in seconds")
        .with_unit("s")
        .build()
});

pub static GEN_AI_COST: LazyLock<Counter<f64>> = LazyLock::new(|| {
    METER
        .f64_counter("gen_ai.client.cost")
        .with_description("Estimated cost of Gemini calls in USD")
        .with_unit("usd")
        .build()
});

pub static GEN_AI_RETRY_COUNT: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("gen_ai.client.retry.count")
        .with_description("Number of Gemini call retries")
        .with_unit("{retry}")
        .build()
});

pub static GEN_AI_ERROR_COUNT: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("gen_ai.client.error.count")
        .with_description("Number of failed Gemini call attempts")
        .with_unit("{error}")
        .build()
});

// --- Analysis metrics ---

pub static ANALYSIS_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("analysis.duration")
        .with_description("Wall time of a complete six-step analysis in seconds")
        .with_unit("s")
        .build()
});

pub static ANALYSIS_FAILURES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("analysis.failures")
        .with_description("Analyses aborted, by failing step and error kind")
        .with_unit("{analysis}")
        .build()
});

pub static ANALYSIS_SOURCES: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("analysis.sources")
        .with_description("Grounding sources kept per competitive analysis")
        .with_unit("{source}")
        .build()
});
