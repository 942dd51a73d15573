/// Return this error from a worker's behaviour function to indicate that the worker is bailing.
///
/// This should be used when a worker encounters an error that is not fatal to the run but means
/// this worker cannot make progress. For example, if the worker cannot build its HTTP client then
/// it may bail and the run should continue with the other workers.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct AgentBailError {
    msg: String,
}

impl AgentBailError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for AgentBailError {
    fn default() -> Self {
        Self::new("Agent is bailing")
    }
}

/// Return this error from a behaviour function when the current iteration has nothing to do.
///
/// The runner counts the iteration as skipped rather than aborted. A typical cause is a catalog
/// entry that lacks the data the scenario needs, such as a credential without a token.
#[derive(derive_more::Error, derive_more::Display, Debug)]
#[display("Iteration skipped: {reason}")]
pub struct IterationSkipped {
    reason: String,
}

impl IterationSkipped {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Returned in place of a step result when the worker was ramped down and its graceful ramp-down
/// period ran out before the iteration finished.
///
/// The runner counts the iteration as aborted.
#[derive(derive_more::Error, derive_more::Display, Debug, Default)]
#[display("Iteration cancelled after the worker was ramped down")]
pub struct RampedDownError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_iteration_displays_reason() {
        let err = IterationSkipped::new("user_7 has no token");
        assert_eq!("Iteration skipped: user_7 has no token", err.to_string());
        assert_eq!("user_7 has no token", err.reason());
    }

    #[test]
    fn default_bail_message() {
        assert_eq!("Agent is bailing", AgentBailError::default().to_string());
    }

    #[test]
    fn ramped_down_message() {
        assert_eq!(
            "Iteration cancelled after the worker was ramped down",
            RampedDownError.to_string()
        );
    }
}
