/// Why a step did not produce a usable response. Any of these ends the iteration.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{step} timed out")]
    Timeout { step: &'static str },
    #[error("{step} failed to reach the backend: {source}")]
    Transport {
        step: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{step} was rejected with status {status}, failed checks {failed_checks:?}, response: {snippet}")]
    Rejected {
        step: &'static str,
        status: u16,
        failed_checks: Vec<String>,
        snippet: String,
    },
    #[error("{step} returned an unusable response: {reason}")]
    Unusable { step: &'static str, reason: String },
}

impl StepError {
    pub fn step(&self) -> &'static str {
        match self {
            StepError::Timeout { step }
            | StepError::Transport { step, .. }
            | StepError::Rejected { step, .. }
            | StepError::Unusable { step, .. } => step,
        }
    }

    /// The response status, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            StepError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn from_send(step: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            StepError::Timeout { step }
        } else {
            StepError::Transport { step, source }
        }
    }
}
