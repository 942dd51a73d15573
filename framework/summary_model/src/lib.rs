use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::path::Path;

/// One segment of the concurrency schedule that the run was configured with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageSummary {
    /// Length of the segment, in seconds
    pub duration_s: f64,
    /// The number of workers that may be active during the segment
    pub target: usize,
}

/// Aggregated results for one step of one scenario
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepSummary {
    pub scenario: String,
    pub step: String,
    pub invocations: u64,
    pub failures: u64,
    pub checks_failed: u64,
    pub avg_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

/// The evaluation of one threshold at the end of the run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSummary {
    pub expression: String,
    /// The aggregated value, absent if the metric had no samples
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The duration that the run was configured with, in seconds
    ///
    /// If the run was configured for soak testing, or to run until its iterations were
    /// exhausted, then this will not be set.
    pub run_duration: Option<u64>,
    /// The concurrency schedule
    ///
    /// Empty when the run used a fixed number of workers without a deadline.
    pub stages: Vec<StageSummary>,
    /// The number of workers started, which is the largest target in the schedule
    pub worker_count: usize,
    /// The number of workers that were still running at the end of the run
    ///
    /// Workers that bail early, for example because they could not build an HTTP client, are
    /// not counted.
    pub worker_end_count: usize,
    /// Per-step results
    pub steps: Vec<StepSummary>,
    /// Threshold results, every threshold is listed even when the verdict is a failure
    pub thresholds: Vec<ThresholdSummary>,
    /// The overall verdict
    pub passed: bool,
    /// Whether a threshold stopped the run before its schedule finished
    pub aborted: bool,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of or
    /// that are included by the scenario itself.
    pub env: HashMap<String, String>,
    /// The version of Stampede that was used for this run
    pub stampede_version: String,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        run_duration: Option<u64>,
        stages: Vec<StageSummary>,
        worker_count: usize,
        stampede_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            started_at,
            run_duration,
            stages,
            worker_count,
            worker_end_count: 0,
            steps: Vec::new(),
            thresholds: Vec::new(),
            passed: true,
            aborted: false,
            env: HashMap::with_capacity(0),
            stampede_version,
        }
    }

    /// Set the worker end count
    pub fn set_worker_end_count(&mut self, worker_end_count: usize) {
        self.worker_end_count = worker_end_count;
    }

    /// Set the step results
    pub fn set_steps(&mut self, steps: Vec<StepSummary>) {
        self.steps = steps;
    }

    /// Set the threshold results and the verdict
    pub fn set_verdict(&mut self, thresholds: Vec<ThresholdSummary>, aborted: bool) {
        self.passed = !aborted && thresholds.iter().all(|t| t.passed);
        self.thresholds = thresholds;
        self.aborted = aborted;
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the scenario.
    /// It uses the
    ///     - Scenario name
    ///     - Run duration
    ///     - Stages
    ///     - Worker count
    ///     - Threshold expressions
    ///     - Selected environment variables
    ///     - Stampede version
    ///
    /// Results are not part of the fingerprint, so two runs of the same configuration share it.
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        if let Some(run_duration) = self.run_duration {
            Digest::update(&mut hasher, run_duration.to_le_bytes());
        }
        for stage in &self.stages {
            Digest::update(&mut hasher, stage.duration_s.to_le_bytes());
            Digest::update(&mut hasher, stage.target.to_le_bytes());
        }
        Digest::update(&mut hasher, self.worker_count.to_le_bytes());
        self.thresholds
            .iter()
            .map(|t| t.expression.as_str())
            .sorted()
            .for_each(|expression| Digest::update(&mut hasher, expression.as_bytes()));
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.stampede_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: impl AsRef<Path>) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}
