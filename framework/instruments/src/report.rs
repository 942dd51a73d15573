mod summary_report;

use crate::metrics::RunMetrics;
use crate::record::{CheckOutcome, IterationRecord, StepRecord};
use crate::threshold::ThresholdReport;
use parking_lot::Mutex;

pub use summary_report::SummaryReportCollector;

/// Receives every record produced during a run, and the final verdict.
pub trait ReportCollector {
    fn add_step(&mut self, _record: &StepRecord) {}

    fn add_iteration(&mut self, _record: &IterationRecord) {}

    fn finalize(&self, metrics: &RunMetrics, thresholds: &ThresholdReport);
}

/// Configure which collectors a [Reporter] forwards to.
#[derive(Default)]
pub struct ReportConfig {
    enable_summary: bool,
}

impl ReportConfig {
    pub fn enable_summary(mut self) -> Self {
        self.enable_summary = true;
        self
    }

    pub fn init(self) -> Reporter {
        let mut collectors: Vec<Mutex<Box<dyn ReportCollector + Send>>> = Vec::new();
        if self.enable_summary {
            collectors.push(Mutex::new(Box::new(SummaryReportCollector::new())));
        }

        Reporter {
            metrics: Mutex::new(RunMetrics::new()),
            collectors,
        }
    }
}

/// The shared sink for step and iteration results.
///
/// Workers append concurrently. The aggregate [RunMetrics] is always maintained because the
/// threshold evaluation needs it, whichever collectors are enabled.
pub struct Reporter {
    metrics: Mutex<RunMetrics>,
    collectors: Vec<Mutex<Box<dyn ReportCollector + Send>>>,
}

impl Reporter {
    pub fn add_step(&self, record: StepRecord) {
        self.metrics.lock().record_step(&record);
        for collector in &self.collectors {
            collector.lock().add_step(&record);
        }
    }

    /// Record a check that was judged without sending a request.
    pub fn add_check(&self, scenario: &str, step: &str, check: CheckOutcome) {
        self.metrics.lock().record_check(scenario, step, &check);
    }

    pub fn add_iteration(&self, record: IterationRecord) {
        self.metrics.lock().record_iteration(&record);
        for collector in &self.collectors {
            collector.lock().add_iteration(&record);
        }
    }

    /// A point in time copy of the accumulated metrics.
    pub fn snapshot(&self) -> RunMetrics {
        self.metrics.lock().clone()
    }

    pub fn finalize(&self, thresholds: &ThresholdReport) {
        let metrics = self.snapshot();
        for collector in &self.collectors {
            collector.lock().finalize(&metrics, thresholds);
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("collectors", &self.collectors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricFilter;
    use crate::record::IterationOutcome;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn concurrent_appends_are_all_counted() {
        let reporter = Arc::new(ReportConfig::default().init());

        let handles = (0..8)
            .map(|worker| {
                let reporter = reporter.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        reporter.add_step(
                            StepRecord::new("load", "checkin", format!("agent-{worker}"))
                                .finish(Some(200), 200, vec![CheckOutcome::new("status is 200", true)]),
                        );
                    }
                    reporter.add_iteration(IterationRecord::new(
                        "load",
                        format!("agent-{worker}"),
                        IterationOutcome::Completed,
                        Duration::from_millis(5),
                    ));
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = reporter.snapshot();
        assert_eq!(2000, metrics.request_count(&MetricFilter::All));
        assert_eq!((8, 0, 0), metrics.iteration_counts(&MetricFilter::All));
    }
}
