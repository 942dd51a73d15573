use stampede_instruments::{RunMetrics, ThresholdReport};
use std::process::ExitCode;

/// Recommended error type for your scenario `main` function and any shared behaviour code that you
/// write for hooks. This type is compatible with the [crate::definition::HookResult] type so you can
/// use `?` to propagate errors.
pub type StampedeResult<T> = anyhow::Result<T>;

/// The outcome of a run, returned by [crate::run::run].
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The result of every threshold, judged after all agents stopped
    pub thresholds: ThresholdReport,
    /// The aggregated results of the run
    pub metrics: RunMetrics,
    /// The number of agents that were still running when the run ended
    pub worker_end_count: usize,
    /// Whether a threshold marked `:abort` stopped the run early
    pub aborted: bool,
}

impl RunReport {
    /// The run passes when every threshold holds and no threshold stopped it early.
    pub fn passed(&self) -> bool {
        !self.aborted && self.thresholds.passed()
    }

    /// The exit code for a scenario binary, 1 when the run failed.
    pub fn exit_code(&self) -> ExitCode {
        if self.passed() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(1)
        }
    }
}
