use tabled::Tabled;

#[derive(Tabled)]
pub struct StepRow {
    pub scenario: String,
    pub step: String,
    pub invocations: u64,
    pub failures: u64,
    pub checks_failed: u64,
    #[tabled(display = "float2")]
    pub avg_time_ms: Option<f64>,
    #[tabled(display = "float2")]
    pub p95_time_ms: Option<f64>,
    #[tabled(display = "float2")]
    pub max_time_ms: Option<f64>,
}

#[derive(Tabled)]
pub struct IterationRow {
    pub scenario: String,
    pub completed: u64,
    pub aborted: u64,
    pub skipped: u64,
    #[tabled(display = "float2")]
    pub avg_time_ms: Option<f64>,
}

#[derive(Tabled)]
pub struct ThresholdRow {
    pub threshold: String,
    #[tabled(display = "float4")]
    pub observed: Option<f64>,
    pub result: String,
}

fn float2(n: &Option<f64>) -> String {
    n.map(|n| format!("{n:.2}")).unwrap_or_else(|| "-".to_string())
}

fn float4(n: &Option<f64>) -> String {
    n.map(|n| format!("{n:.4}")).unwrap_or_else(|| "-".to_string())
}
