mod metrics;
mod record;
mod report;
mod threshold;

pub use metrics::{LatencySummary, MetricFilter, RunMetrics, ScenarioStats, StepStats};
pub use record::{CheckOutcome, IterationOutcome, IterationRecord, StepRecord};
pub use report::{ReportCollector, ReportConfig, Reporter, SummaryReportCollector};
pub use threshold::{
    Aggregation, Comparison, MetricName, Threshold, ThresholdParseError, ThresholdReport,
    ThresholdResult, ThresholdSet,
};
