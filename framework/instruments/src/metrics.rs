use crate::record::{CheckOutcome, IterationOutcome, IterationRecord, StepRecord};
use hdrhistogram::Histogram;
use std::collections::BTreeMap;
use std::time::Duration;

fn new_histogram() -> Histogram<u64> {
    // An auto-resizing histogram with 3 significant figures, construction only fails for more than 5.
    Histogram::new(3).expect("3 significant figures is a valid histogram precision")
}

fn as_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Record a latency in microseconds, growing the histogram to fit it.
fn record_latency(histogram: &mut Histogram<u64>, elapsed: Duration) {
    if let Err(e) = histogram.record(as_micros(elapsed)) {
        log::warn!("Failed to record latency {elapsed:?}: {e:?}");
    }
}

fn merge_into(target: &mut Histogram<u64>, source: &Histogram<u64>) {
    if let Err(e) = target.add(source) {
        log::warn!("Failed to merge latency histograms: {e:?}");
    }
}

/// Accumulated results for one step of one scenario.
#[derive(Debug, Clone)]
pub struct StepStats {
    pub invocations: u64,
    pub failures: u64,
    pub checks_passed: u64,
    pub checks_failed: u64,
    latency: Histogram<u64>,
}

impl Default for StepStats {
    fn default() -> Self {
        Self {
            invocations: 0,
            failures: 0,
            checks_passed: 0,
            checks_failed: 0,
            latency: new_histogram(),
        }
    }
}

impl StepStats {
    pub fn latency(&self) -> Option<LatencySummary> {
        LatencySummary::of(&self.latency)
    }

    fn add_check(&mut self, check: &CheckOutcome) {
        if check.passed {
            self.checks_passed += 1;
        } else {
            self.checks_failed += 1;
        }
    }
}

/// Accumulated iteration outcomes for one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioStats {
    pub completed: u64,
    pub aborted: u64,
    pub skipped: u64,
    duration: Histogram<u64>,
}

impl Default for ScenarioStats {
    fn default() -> Self {
        Self {
            completed: 0,
            aborted: 0,
            skipped: 0,
            duration: new_histogram(),
        }
    }
}

impl ScenarioStats {
    pub fn duration(&self) -> Option<LatencySummary> {
        LatencySummary::of(&self.duration)
    }
}

/// Selects which recorded samples a query looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricFilter {
    All,
    /// Samples from steps with this name, in any scenario. Iteration metrics ignore this filter.
    Step(String),
    Scenario(String),
}

impl MetricFilter {
    fn matches_step(&self, scenario: &str, step: &str) -> bool {
        match self {
            MetricFilter::All => true,
            MetricFilter::Step(name) => name == step,
            MetricFilter::Scenario(name) => name == scenario,
        }
    }

    fn matches_scenario(&self, scenario: &str) -> bool {
        match self {
            MetricFilter::Scenario(name) => name == scenario,
            _ => true,
        }
    }
}

/// Millisecond statistics over a latency distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub med_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    pub(crate) fn of(histogram: &Histogram<u64>) -> Option<Self> {
        if histogram.is_empty() {
            return None;
        }

        let ms = |micros: u64| micros as f64 / 1000.0;
        Some(Self {
            count: histogram.len(),
            avg_ms: histogram.mean() / 1000.0,
            min_ms: ms(histogram.min()),
            med_ms: ms(histogram.value_at_quantile(0.5)),
            p90_ms: ms(histogram.value_at_quantile(0.9)),
            p95_ms: ms(histogram.value_at_quantile(0.95)),
            max_ms: ms(histogram.max()),
        })
    }

    /// The latency at an arbitrary percentile, in milliseconds.
    pub(crate) fn percentile_of(histogram: &Histogram<u64>, percentile: f64) -> Option<f64> {
        if histogram.is_empty() {
            return None;
        }

        Some(histogram.value_at_quantile(percentile / 100.0) as f64 / 1000.0)
    }
}

/// The append-only accumulator for a run.
///
/// Every step record and iteration record produced by any worker is folded in here. Records are
/// not retained, only their aggregates.
#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    steps: BTreeMap<(String, String), StepStats>,
    scenarios: BTreeMap<String, ScenarioStats>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step(&mut self, record: &StepRecord) {
        let stats = self
            .steps
            .entry((record.scenario.clone(), record.step.clone()))
            .or_default();

        stats.invocations += 1;
        if record.is_error || !record.checks_passed() {
            stats.failures += 1;
        }
        for check in &record.checks {
            stats.add_check(check);
        }
        if let Some(elapsed) = record.duration() {
            record_latency(&mut stats.latency, elapsed);
        }
    }

    /// Record a check that was evaluated without making a request.
    pub fn record_check(&mut self, scenario: &str, step: &str, check: &CheckOutcome) {
        self.steps
            .entry((scenario.to_string(), step.to_string()))
            .or_default()
            .add_check(check);
    }

    pub fn record_iteration(&mut self, record: &IterationRecord) {
        let stats = self.scenarios.entry(record.scenario.clone()).or_default();
        match record.outcome {
            IterationOutcome::Completed => stats.completed += 1,
            IterationOutcome::Aborted => stats.aborted += 1,
            IterationOutcome::Skipped => {
                stats.skipped += 1;
                return;
            }
        }
        record_latency(&mut stats.duration, record.elapsed);
    }

    pub fn step(&self, scenario: &str, step: &str) -> Option<&StepStats> {
        self.steps.get(&(scenario.to_string(), step.to_string()))
    }

    pub fn steps(&self) -> impl Iterator<Item = (&str, &str, &StepStats)> {
        self.steps
            .iter()
            .map(|((scenario, step), stats)| (scenario.as_str(), step.as_str(), stats))
    }

    pub fn scenario(&self, scenario: &str) -> Option<&ScenarioStats> {
        self.scenarios.get(scenario)
    }

    pub fn scenarios(&self) -> impl Iterator<Item = (&str, &ScenarioStats)> {
        self.scenarios.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    fn matching_steps<'a>(&'a self, filter: &'a MetricFilter) -> impl Iterator<Item = &'a StepStats> + 'a {
        self.steps
            .iter()
            .filter(move |((scenario, step), _)| filter.matches_step(scenario, step))
            .map(|(_, stats)| stats)
    }

    fn matching_scenarios<'a>(
        &'a self,
        filter: &'a MetricFilter,
    ) -> impl Iterator<Item = &'a ScenarioStats> + 'a {
        self.scenarios
            .iter()
            .filter(move |(scenario, _)| filter.matches_scenario(scenario))
            .map(|(_, stats)| stats)
    }

    pub fn request_count(&self, filter: &MetricFilter) -> u64 {
        self.matching_steps(filter).map(|s| s.invocations).sum()
    }

    pub fn failed_request_count(&self, filter: &MetricFilter) -> u64 {
        self.matching_steps(filter).map(|s| s.failures).sum()
    }

    /// Passed and failed check counts.
    pub fn check_counts(&self, filter: &MetricFilter) -> (u64, u64) {
        self.matching_steps(filter)
            .fold((0, 0), |(passed, failed), s| {
                (passed + s.checks_passed, failed + s.checks_failed)
            })
    }

    /// Completed, aborted and skipped iteration counts.
    pub fn iteration_counts(&self, filter: &MetricFilter) -> (u64, u64, u64) {
        self.matching_scenarios(filter)
            .fold((0, 0, 0), |(completed, aborted, skipped), s| {
                (completed + s.completed, aborted + s.aborted, skipped + s.skipped)
            })
    }

    pub(crate) fn request_latency(&self, filter: &MetricFilter) -> Histogram<u64> {
        let mut merged = new_histogram();
        for stats in self.matching_steps(filter) {
            merge_into(&mut merged, &stats.latency);
        }
        merged
    }

    pub(crate) fn iteration_latency(&self, filter: &MetricFilter) -> Histogram<u64> {
        let mut merged = new_histogram();
        for stats in self.matching_scenarios(filter) {
            merge_into(&mut merged, &stats.duration);
        }
        merged
    }

    pub fn request_latency_summary(&self, filter: &MetricFilter) -> Option<LatencySummary> {
        LatencySummary::of(&self.request_latency(filter))
    }
}
