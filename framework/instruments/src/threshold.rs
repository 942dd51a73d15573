//! Run-level pass/fail bounds over accumulated metrics.
//!
//! Thresholds are written as `metric[{tag:value}]:condition[:abort]`, for example
//! `http_req_duration:p(95)<2000`, `http_req_failed:rate<0.01` or
//! `http_req_duration{step:checkin}:max<=5000:abort`.

use crate::metrics::{LatencySummary, MetricFilter, RunMetrics};
use hdrhistogram::Histogram;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ThresholdParseError {
    #[error("Threshold `{0}` must have the form `metric:condition`")]
    MissingCondition(String),
    #[error("Unknown metric `{0}`")]
    UnknownMetric(String),
    #[error("Invalid tag filter `{0}`, expected `{{step:NAME}}` or `{{scenario:NAME}}`")]
    InvalidFilter(String),
    #[error("Invalid condition `{0}`")]
    InvalidCondition(String),
    #[error("Aggregation `{aggregation}` is not supported for metric `{metric}`")]
    UnsupportedAggregation { metric: String, aggregation: String },
    #[error("A step filter is not supported for metric `{0}`")]
    UnsupportedFilter(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricName {
    /// Latency of every request, in milliseconds.
    HttpReqDuration,
    /// Share of requests that got no response, the wrong status class, or failed a check.
    HttpReqFailed,
    HttpReqs,
    /// Share of checks that passed.
    Checks,
    /// Duration of completed and aborted iterations, in milliseconds.
    IterationDuration,
    /// Share of started iterations that were aborted by a failed step.
    IterationsAborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Trend,
    Rate,
    Counter,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::HttpReqDuration => "http_req_duration",
            MetricName::HttpReqFailed => "http_req_failed",
            MetricName::HttpReqs => "http_reqs",
            MetricName::Checks => "checks",
            MetricName::IterationDuration => "iteration_duration",
            MetricName::IterationsAborted => "iterations_aborted",
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            MetricName::HttpReqDuration | MetricName::IterationDuration => MetricKind::Trend,
            MetricName::HttpReqFailed | MetricName::Checks | MetricName::IterationsAborted => {
                MetricKind::Rate
            }
            MetricName::HttpReqs => MetricKind::Counter,
        }
    }

    fn is_iteration_metric(&self) -> bool {
        matches!(
            self,
            MetricName::IterationDuration | MetricName::IterationsAborted
        )
    }
}

impl FromStr for MetricName {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "http_req_duration" => Ok(MetricName::HttpReqDuration),
            "http_req_failed" => Ok(MetricName::HttpReqFailed),
            "http_reqs" => Ok(MetricName::HttpReqs),
            "checks" => Ok(MetricName::Checks),
            "iteration_duration" => Ok(MetricName::IterationDuration),
            "iterations_aborted" => Ok(MetricName::IterationsAborted),
            other => Err(ThresholdParseError::UnknownMetric(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    /// A percentile in `(0, 100]`.
    Percentile(f64),
    Rate,
    Count,
}

impl Aggregation {
    fn supported_by(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => !matches!(self, Aggregation::Rate),
            MetricKind::Rate => matches!(self, Aggregation::Rate | Aggregation::Count),
            MetricKind::Counter => matches!(self, Aggregation::Count),
        }
    }
}

impl FromStr for Aggregation {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "avg" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "med" => Ok(Aggregation::Med),
            "rate" => Ok(Aggregation::Rate),
            "count" => Ok(Aggregation::Count),
            _ => s
                .strip_prefix("p(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|p| p.trim().parse::<f64>().ok())
                .filter(|p| *p > 0.0 && *p <= 100.0)
                .map(Aggregation::Percentile)
                .ok_or_else(|| ThresholdParseError::InvalidCondition(s.to_string())),
        }
    }
}

impl Display for Aggregation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Count => write!(f, "count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }

    /// Split `avg<=20` into its aggregation, comparison and bound.
    fn split(condition: &str) -> Option<(&str, Comparison, &str)> {
        let at = condition.find(|c: char| matches!(c, '<' | '>' | '=' | '!'))?;
        let (aggregation, rest) = condition.split_at(at);
        let (comparison, width) = match rest.get(..2) {
            Some("<=") => (Comparison::Le, 2),
            Some(">=") => (Comparison::Ge, 2),
            Some("==") => (Comparison::Eq, 2),
            Some("!=") => (Comparison::Ne, 2),
            _ if rest.starts_with('<') => (Comparison::Lt, 1),
            _ if rest.starts_with('>') => (Comparison::Gt, 1),
            _ => return None,
        };
        Some((aggregation, comparison, &rest[width..]))
    }
}

/// One aggregate bound over the run's metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: MetricName,
    pub filter: MetricFilter,
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
    /// Stop the run as soon as this threshold is observed to fail.
    pub abort_on_fail: bool,
    expression: String,
}

impl Threshold {
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The current value of the aggregated metric, or `None` if there are no samples yet.
    pub fn observe(&self, metrics: &RunMetrics) -> Option<f64> {
        let filter = &self.filter;
        match self.metric {
            MetricName::HttpReqDuration => {
                aggregate_trend(&metrics.request_latency(filter), self.aggregation)
            }
            MetricName::IterationDuration => {
                aggregate_trend(&metrics.iteration_latency(filter), self.aggregation)
            }
            MetricName::HttpReqFailed => {
                let total = metrics.request_count(filter);
                let failed = metrics.failed_request_count(filter);
                aggregate_rate(failed, total, self.aggregation)
            }
            MetricName::Checks => {
                let (passed, failed) = metrics.check_counts(filter);
                aggregate_rate(passed, passed + failed, self.aggregation)
            }
            MetricName::IterationsAborted => {
                let (completed, aborted, _) = metrics.iteration_counts(filter);
                aggregate_rate(aborted, completed + aborted, self.aggregation)
            }
            MetricName::HttpReqs => Some(metrics.request_count(filter) as f64),
        }
    }

    pub fn evaluate(&self, metrics: &RunMetrics) -> ThresholdResult {
        let observed = self.observe(metrics);
        ThresholdResult {
            expression: self.expression.clone(),
            observed,
            passed: observed
                .map(|value| self.comparison.holds(value, self.bound))
                .unwrap_or(false),
            abort_on_fail: self.abort_on_fail,
        }
    }
}

fn aggregate_trend(histogram: &Histogram<u64>, aggregation: Aggregation) -> Option<f64> {
    let summary = LatencySummary::of(histogram)?;
    match aggregation {
        Aggregation::Avg => Some(summary.avg_ms),
        Aggregation::Min => Some(summary.min_ms),
        Aggregation::Max => Some(summary.max_ms),
        Aggregation::Med => Some(summary.med_ms),
        Aggregation::Percentile(p) => LatencySummary::percentile_of(histogram, p),
        Aggregation::Count => Some(summary.count as f64),
        Aggregation::Rate => None,
    }
}

fn aggregate_rate(hits: u64, total: u64, aggregation: Aggregation) -> Option<f64> {
    match aggregation {
        Aggregation::Count => Some(hits as f64),
        _ if total == 0 => None,
        _ => Some(hits as f64 / total as f64),
    }
}

fn parse_filter(tag: &str) -> Result<MetricFilter, ThresholdParseError> {
    let invalid = || ThresholdParseError::InvalidFilter(tag.to_string());
    let inner = tag
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(invalid)?;
    let (key, value) = inner.split_once(':').ok_or_else(invalid)?;
    let value = value.trim();
    if value.is_empty() {
        return Err(invalid());
    }

    match key.trim() {
        "step" => Ok(MetricFilter::Step(value.to_string())),
        "scenario" => Ok(MetricFilter::Scenario(value.to_string())),
        _ => Err(invalid()),
    }
}

impl FromStr for Threshold {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expression = s.trim();
        let (body, abort_on_fail) = match expression.strip_suffix(":abort") {
            Some(body) => (body, true),
            None => (expression, false),
        };

        // The selector may itself contain a colon inside the tag filter.
        let selector_end = match body.find('}') {
            Some(close) => body[close..].find(':').map(|i| close + i),
            None => body.find(':'),
        }
        .ok_or_else(|| ThresholdParseError::MissingCondition(expression.to_string()))?;
        let (selector, condition) = (&body[..selector_end], &body[selector_end + 1..]);

        let (metric, filter) = match selector.find('{') {
            Some(open) => (
                selector[..open].parse::<MetricName>()?,
                parse_filter(selector[open..].trim())?,
            ),
            None => (selector.parse::<MetricName>()?, MetricFilter::All),
        };

        if metric.is_iteration_metric() && matches!(filter, MetricFilter::Step(_)) {
            return Err(ThresholdParseError::UnsupportedFilter(
                metric.as_str().to_string(),
            ));
        }

        let (aggregation, comparison, bound) = Comparison::split(condition.trim())
            .ok_or_else(|| ThresholdParseError::InvalidCondition(condition.to_string()))?;
        let aggregation = aggregation.parse::<Aggregation>()?;
        let bound = bound
            .trim()
            .parse::<f64>()
            .map_err(|_| ThresholdParseError::InvalidCondition(condition.to_string()))?;

        if !aggregation.supported_by(metric.kind()) {
            return Err(ThresholdParseError::UnsupportedAggregation {
                metric: metric.as_str().to_string(),
                aggregation: aggregation.to_string(),
            });
        }

        Ok(Threshold {
            metric,
            filter,
            aggregation,
            comparison,
            bound,
            abort_on_fail,
            expression: body.to_string(),
        })
    }
}

/// The evaluation of one threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
    pub abort_on_fail: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdSet {
    thresholds: Vec<Threshold>,
}

impl ThresholdSet {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        Self { thresholds }
    }

    pub fn parse_all<S: AsRef<str>>(expressions: &[S]) -> Result<Self, ThresholdParseError> {
        expressions
            .iter()
            .map(|e| e.as_ref().parse::<Threshold>())
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.thresholds.iter()
    }

    pub fn has_abort_on_fail(&self) -> bool {
        self.thresholds.iter().any(|t| t.abort_on_fail)
    }

    pub fn evaluate(&self, metrics: &RunMetrics) -> ThresholdReport {
        ThresholdReport {
            results: self.thresholds.iter().map(|t| t.evaluate(metrics)).collect(),
        }
    }
}

/// The verdict of a run together with the result of every threshold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdReport {
    results: Vec<ThresholdResult>,
}

impl ThresholdReport {
    /// A run with no thresholds passes.
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn results(&self) -> &[ThresholdResult] {
        &self.results
    }

    pub fn breached(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// Whether a breached threshold has asked for the run to be stopped.
    pub fn should_abort(&self) -> bool {
        self.breached().any(|r| r.abort_on_fail)
    }
}
