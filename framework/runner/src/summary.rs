use stampede_instruments::{RunMetrics, ThresholdReport};
use stampede_summary_model::{RunSummary, StageSummary, StepSummary, ThresholdSummary};

use crate::definition::LoadShape;

/// Everything about a run that goes into its [RunSummary].
pub(crate) struct SummaryInput<'a> {
    pub run_id: &'a str,
    pub scenario_name: &'a str,
    pub started_at: i64,
    pub load: &'a LoadShape,
    pub worker_end_count: usize,
    pub metrics: &'a RunMetrics,
    pub thresholds: &'a ThresholdReport,
    pub aborted: bool,
}

pub(crate) fn build_run_summary(input: SummaryInput<'_>) -> RunSummary {
    let (run_duration, stages) = match input.load {
        LoadShape::Scheduled(schedule) => (
            Some(schedule.total_duration().as_secs()),
            schedule
                .stages()
                .map(|stage| StageSummary {
                    duration_s: stage.duration.as_secs_f64(),
                    target: stage.target,
                })
                .collect(),
        ),
        LoadShape::Open(_) => (None, Vec::new()),
    };

    let mut summary = RunSummary::new(
        input.run_id.to_string(),
        input.scenario_name.to_string(),
        input.started_at,
        run_duration,
        stages,
        input.load.worker_count(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    summary.set_worker_end_count(input.worker_end_count);

    summary.set_steps(
        input
            .metrics
            .steps()
            .map(|(scenario, step, stats)| {
                let latency = stats.latency();
                StepSummary {
                    scenario: scenario.to_string(),
                    step: step.to_string(),
                    invocations: stats.invocations,
                    failures: stats.failures,
                    checks_failed: stats.checks_failed,
                    avg_ms: latency.map(|l| l.avg_ms),
                    p95_ms: latency.map(|l| l.p95_ms),
                    max_ms: latency.map(|l| l.max_ms),
                }
            })
            .collect(),
    );

    summary.set_verdict(
        input
            .thresholds
            .results()
            .iter()
            .map(|result| ThresholdSummary {
                expression: result.expression.clone(),
                observed: result.observed,
                passed: result.passed,
            })
            .collect(),
        input.aborted,
    );

    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        summary.add_env("RUST_LOG".to_string(), rust_log);
    }

    summary
}
