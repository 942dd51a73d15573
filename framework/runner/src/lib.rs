mod cli;
mod config;
mod context;
mod definition;
mod executor;
mod init;
mod iteration;
mod monitor;
mod partition;
mod progress;
mod ramp;
mod run;
mod schedule;
mod shutdown;
mod summary;
mod types;

pub mod prelude {
    pub use crate::cli::{ReporterOpt, StampedeScenarioCli};
    pub use crate::config::{parse_duration, ConfigFile};
    pub use crate::context::UserValuesConstraint;
    pub use crate::context::{AgentContext, RunnerContext};
    pub use crate::definition::{HookResult, LoadShape, ScenarioDefinitionBuilder};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::iteration::{Iteration, IterationPlan, IterationSource, NextIteration};
    pub use crate::partition::{ExhaustivePartition, NoWorkersError};
    pub use crate::ramp::{RampController, DEFAULT_GRACEFUL_RAMP_DOWN};
    pub use crate::run::run;
    pub use crate::schedule::{RunSchedule, ScheduleError, Segment, Stage};
    pub use crate::types::{RunReport, StampedeResult};

    pub use stampede_core::prelude::*;
    pub use stampede_instruments::{CheckOutcome, Reporter, StepRecord};
}
