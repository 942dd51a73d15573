use std::time::{Duration, Instant};

/// The outcome of one named structural check against a step's response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
}

impl CheckOutcome {
    pub fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
        }
    }

    pub fn failed(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }
}

/// A record of one HTTP exchange made by a scenario step.
///
/// Create the record immediately before sending the request so that the latency covers the whole
/// exchange, then call [StepRecord::finish] once the response (or the error) is in hand.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub scenario: String,
    pub step: String,
    pub agent: String,
    started: Instant,
    elapsed: Option<Duration>,
    /// The response status, absent when no response was received.
    pub status: Option<u16>,
    pub checks: Vec<CheckOutcome>,
    /// True when no response was received or the status class did not match the expected one.
    pub is_error: bool,
}

impl StepRecord {
    pub fn new(scenario: impl Into<String>, step: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            step: step.into(),
            agent: agent.into(),
            started: Instant::now(),
            elapsed: None,
            status: None,
            checks: Vec::new(),
            is_error: false,
        }
    }

    pub fn finish(mut self, status: Option<u16>, expected_status: u16, checks: Vec<CheckOutcome>) -> Self {
        self.elapsed = Some(self.started.elapsed());
        self.is_error = match status {
            Some(status) => status / 100 != expected_status / 100,
            None => true,
        };
        self.status = status;
        self.checks = checks;
        self
    }

    /// Override the measured latency.
    ///
    /// Useful for replaying recorded results and for building fixtures.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn checks_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Every step ran and produced a usable response.
    Completed,
    /// A step failed and the remaining steps were not attempted.
    Aborted,
    /// The iteration had nothing to do, for example because its catalog entry lacked data.
    Skipped,
}

/// A record of one pass through a scenario.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub scenario: String,
    pub agent: String,
    pub outcome: IterationOutcome,
    pub elapsed: Duration,
}

impl IterationRecord {
    pub fn new(
        scenario: impl Into<String>,
        agent: impl Into<String>,
        outcome: IterationOutcome,
        elapsed: Duration,
    ) -> Self {
        Self {
            scenario: scenario.into(),
            agent: agent.into(),
            outcome,
            elapsed,
        }
    }
}
