mod steps_table;

use crate::metrics::RunMetrics;
use crate::report::summary_report::steps_table::{IterationRow, StepRow, ThresholdRow};
use crate::report::ReportCollector;
use crate::threshold::ThresholdReport;
use tabled::settings::Style;
use tabled::Table;

/// Prints a summary of the run to stdout once it has finished.
pub struct SummaryReportCollector;

impl SummaryReportCollector {
    pub fn new() -> Self {
        Self
    }

    fn print_summary_of_steps(&self, metrics: &RunMetrics) {
        println!("\nSummary of steps");
        let rows = metrics
            .steps()
            .map(|(scenario, step, stats)| {
                let latency = stats.latency();
                StepRow {
                    scenario: scenario.to_string(),
                    step: step.to_string(),
                    invocations: stats.invocations,
                    failures: stats.failures,
                    checks_failed: stats.checks_failed,
                    avg_time_ms: latency.map(|l| l.avg_ms),
                    p95_time_ms: latency.map(|l| l.p95_ms),
                    max_time_ms: latency.map(|l| l.max_ms),
                }
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{table}");
    }

    fn print_summary_of_iterations(&self, metrics: &RunMetrics) {
        println!("\nSummary of iterations");
        let rows = metrics
            .scenarios()
            .map(|(scenario, stats)| IterationRow {
                scenario: scenario.to_string(),
                completed: stats.completed,
                aborted: stats.aborted,
                skipped: stats.skipped,
                avg_time_ms: stats.duration().map(|d| d.avg_ms),
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{table}");
    }

    fn print_thresholds(&self, thresholds: &ThresholdReport) {
        if thresholds.results().is_empty() {
            return;
        }

        println!("\nThresholds");
        let rows = thresholds
            .results()
            .iter()
            .map(|r| ThresholdRow {
                threshold: r.expression.clone(),
                observed: r.observed,
                result: if r.passed { "pass" } else { "FAIL" }.to_string(),
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{table}");
        println!(
            "Verdict: {}",
            if thresholds.passed() { "PASS" } else { "FAIL" }
        );
    }
}

impl Default for SummaryReportCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportCollector for SummaryReportCollector {
    fn finalize(&self, metrics: &RunMetrics, thresholds: &ThresholdReport) {
        self.print_summary_of_steps(metrics);
        self.print_summary_of_iterations(metrics);
        self.print_thresholds(thresholds);
    }
}
