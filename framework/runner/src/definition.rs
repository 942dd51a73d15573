use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use stampede_instruments::ThresholdSet;

use crate::cli::{ReporterOpt, StampedeScenarioCli};
use crate::config::ConfigFile;
use crate::context::{AgentContext, RunnerContext, UserValuesConstraint};
use crate::init::init;
use crate::iteration::IterationPlan;
use crate::ramp::DEFAULT_GRACEFUL_RAMP_DOWN;
use crate::schedule::{RunSchedule, Stage};

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type AgentHookMut<RV, V> = fn(&mut AgentContext<RV, V>) -> HookResult;
pub type IterationPlanFn<RV> = fn(&RunnerContext<RV>) -> anyhow::Result<IterationPlan>;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: StampedeScenarioCli,
    default_agents: Option<usize>,
    default_duration_s: Option<u64>,
    default_stages: Vec<Stage>,
    default_graceful_ramp_down: Option<Duration>,
    default_shared_iterations: Option<usize>,
    default_thresholds: Vec<String>,
    default_think_times: HashMap<String, Duration>,
    default_data: HashMap<String, PathBuf>,
    default_request_timeout: Option<Duration>,
    /// Decides how iterations are handed out. Runs after the global setup so that it can look at
    /// the data the setup loaded.
    iteration_plan_fn: Option<IterationPlanFn<RV>>,
    /// Global setup hook for this scenario. It will be run once, before any agents are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for an agent, which will be run once for each agent as it starts.
    setup_agent_fn: Option<AgentHookMut<RV, V>>,
    /// The agent behaviour for this scenario. It is called once per iteration.
    agent_behaviour: Option<AgentHookMut<RV, V>>,
    /// Teardown hook for an agent, run once when the agent stops. This is a best effort hook and
    /// errors are logged rather than failing the run.
    teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    /// Global teardown hook, run once after every agent has stopped.
    teardown_fn: Option<GlobalHook<RV>>,
}

/// How many workers run, and for how long.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadShape {
    Scheduled(RunSchedule),
    /// A fixed number of workers with no deadline. The run ends when the iterations run out, every
    /// worker has bailed, or the run is stopped.
    Open(usize),
}

impl LoadShape {
    pub fn worker_count(&self) -> usize {
        match self {
            LoadShape::Scheduled(schedule) => schedule.max_target(),
            LoadShape::Open(worker_count) => *worker_count,
        }
    }
}

pub struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub name: String,
    pub connection_string: String,
    pub load: LoadShape,
    pub graceful_ramp_down: Duration,
    pub iterations: Option<usize>,
    /// Replaces the iteration plan with [IterationPlan::Shared] when set.
    pub shared_iterations: Option<usize>,
    pub thresholds: ThresholdSet,
    pub think_times: HashMap<String, Duration>,
    pub data: HashMap<String, PathBuf>,
    pub request_timeout: Duration,
    pub no_progress: bool,
    pub reporter: ReporterOpt,
    pub run_id: String,
    pub summary_file: Option<PathBuf>,
    pub iteration_plan_fn: Option<IterationPlanFn<RV>>,
    pub setup_fn: Option<GlobalHookMut<RV>>,
    pub setup_agent_fn: Option<AgentHookMut<RV, V>>,
    pub agent_behaviour: Option<AgentHookMut<RV, V>>,
    pub teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    pub teardown_fn: Option<GlobalHook<RV>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and command line arguments.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, init())
    }

    /// Initialise a new scenario definition from the scenario name and an already parsed CLI.
    pub fn new(name: &str, cli: StampedeScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_agents: None,
            default_duration_s: None,
            default_stages: Vec::new(),
            default_graceful_ramp_down: None,
            default_shared_iterations: None,
            default_thresholds: Vec::new(),
            default_think_times: HashMap::new(),
            default_data: HashMap::new(),
            default_request_timeout: None,
            iteration_plan_fn: None,
            setup_fn: None,
            setup_agent_fn: None,
            agent_behaviour: None,
            teardown_agent_fn: None,
            teardown_fn: None,
        }
    }

    /// Set the number of workers to use when neither the command line nor the config file does.
    pub fn with_default_agents(mut self, agents: usize) -> Self {
        self.default_agents = Some(agents);
        self
    }

    /// Set the duration to run for when neither the command line nor the config file does.
    pub fn with_default_duration_s(mut self, duration: u64) -> Self {
        self.default_duration_s = Some(duration);
        self
    }

    /// Set a default concurrency schedule. It is used unless the command line or config file
    /// describes the load, with stages or with agents and a duration.
    pub fn with_default_stages(mut self, stages: Vec<Stage>) -> Self {
        self.default_stages = stages;
        self
    }

    /// Set how long a ramped down worker may spend finishing its iteration, unless configured.
    pub fn with_default_graceful_ramp_down(mut self, graceful_ramp_down: Duration) -> Self {
        self.default_graceful_ramp_down = Some(graceful_ramp_down);
        self
    }

    /// Share a total number of iterations between the workers, unless configured. This takes
    /// precedence over [ScenarioDefinitionBuilder::use_iteration_plan].
    pub fn with_default_shared_iterations(mut self, total: usize) -> Self {
        self.default_shared_iterations = Some(total);
        self
    }

    /// Add a threshold that the run is judged against, unless thresholds are configured.
    pub fn with_default_threshold(mut self, expression: &str) -> Self {
        self.default_thresholds.push(expression.to_string());
        self
    }

    /// Set the default for a named pause. Scenarios look pauses up with
    /// [AgentContext::think].
    pub fn with_default_think_time(mut self, name: &str, duration: Duration) -> Self {
        self.default_think_times.insert(name.to_string(), duration);
        self
    }

    /// Set the default path for a named data file, see [RunnerContext::data_path].
    pub fn with_default_data(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.default_data.insert(name.to_string(), path.into());
        self
    }

    pub fn with_default_request_timeout(mut self, timeout: Duration) -> Self {
        self.default_request_timeout = Some(timeout);
        self
    }

    /// Choose how iterations are handed out to workers. Without this the workers iterate until
    /// the run ends.
    pub fn use_iteration_plan(mut self, plan_fn: IterationPlanFn<RV>) -> Self {
        self.iteration_plan_fn = Some(plan_fn);
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the agent setup hook [ScenarioDefinitionBuilder::setup_agent_fn] for this scenario.
    pub fn use_agent_setup(mut self, setup_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.setup_agent_fn = Some(setup_agent_fn);
        self
    }

    /// Set the agent behaviour hook [ScenarioDefinitionBuilder::agent_behaviour] for this scenario.
    pub fn use_agent_behaviour(mut self, behaviour: AgentHookMut<RV, V>) -> Self {
        self.agent_behaviour = Some(behaviour);
        self
    }

    /// Set the agent teardown hook [ScenarioDefinitionBuilder::teardown_agent_fn] for this scenario.
    pub fn use_agent_teardown(mut self, teardown_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.teardown_agent_fn = Some(teardown_agent_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn] for this scenario.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    /// Resolve the configuration of the run. The command line wins over the config file, which
    /// wins over the defaults set on this builder.
    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<RV, V>> {
        let file = match &self.cli.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };

        let connection_string = self
            .cli
            .connection_string
            .clone()
            .or_else(|| file.connection_string.clone())
            .context("No connection string configured, pass --connection-string")?;

        let load = self.resolve_load(&file)?;
        if load.worker_count() == 0 {
            anyhow::bail!("The run is configured with zero workers");
        }

        let threshold_expressions = if !self.cli.threshold.is_empty() {
            self.cli.threshold.clone()
        } else if !file.thresholds.is_empty() {
            file.thresholds.clone()
        } else {
            self.default_thresholds.clone()
        };
        let thresholds = ThresholdSet::parse_all(&threshold_expressions)?;

        let mut think_times = self.default_think_times;
        think_times.extend(file.think_times()?);
        think_times.extend(self.cli.think_time.iter().cloned());

        let mut data = self.default_data;
        data.extend(file.data.clone());
        data.extend(self.cli.data.iter().cloned());

        let request_timeout = match self.cli.request_timeout {
            Some(timeout) => timeout,
            None => file
                .request_timeout()?
                .or(self.default_request_timeout)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        };

        let graceful_ramp_down = match self.cli.graceful_ramp_down {
            Some(graceful_ramp_down) => graceful_ramp_down,
            None => file
                .graceful_ramp_down()?
                .or(self.default_graceful_ramp_down)
                .unwrap_or(DEFAULT_GRACEFUL_RAMP_DOWN),
        };

        let shared_iterations = self
            .cli
            .shared_iterations
            .or(file.shared_iterations)
            .or(self.default_shared_iterations);
        if shared_iterations == Some(0) {
            anyhow::bail!("The run is configured with zero shared iterations");
        }

        let run_id = self
            .cli
            .run_id
            .clone()
            .or_else(|| file.run_id.clone())
            .unwrap_or_else(|| nanoid::nanoid!());

        Ok(ScenarioDefinition {
            name: self.name,
            connection_string,
            load,
            graceful_ramp_down,
            iterations: self.cli.iterations.or(file.iterations),
            shared_iterations,
            thresholds,
            think_times,
            data,
            request_timeout,
            no_progress: self.cli.no_progress,
            reporter: self.cli.reporter,
            run_id,
            summary_file: self.cli.summary_file.clone().or(file.summary_file.clone()),
            iteration_plan_fn: self.iteration_plan_fn,
            setup_fn: self.setup_fn,
            setup_agent_fn: self.setup_agent_fn,
            agent_behaviour: self.agent_behaviour,
            teardown_agent_fn: self.teardown_agent_fn,
            teardown_fn: self.teardown_fn,
        })
    }

    /// The load comes from the highest precedence layer that describes it. A layer describes the
    /// load if it sets stages, agents or a duration.
    fn resolve_load(&self, file: &ConfigFile) -> anyhow::Result<LoadShape> {
        let file_stages = file
            .stages
            .iter()
            .map(|s| s.parse::<Stage>())
            .collect::<Result<Vec<_>, _>>()?;
        let file_duration = file.duration()?;

        let stages = if !self.cli.stage.is_empty() {
            Some(self.cli.stage.clone())
        } else if self.cli.agents.is_some() || self.cli.duration.is_some() {
            None
        } else if !file_stages.is_empty() {
            Some(file_stages)
        } else if file.agents.is_some() || file_duration.is_some() {
            None
        } else if !self.default_stages.is_empty() {
            Some(self.default_stages.clone())
        } else {
            None
        };

        let agents = self.cli.agents.or(file.agents).or(self.default_agents);
        let soak = self.cli.soak || file.soak.unwrap_or(false);

        if soak {
            let agents = agents.or_else(|| {
                stages
                    .as_ref()
                    .and_then(|stages| stages.iter().map(|s| s.target).max())
            });
            return Ok(LoadShape::Open(agents.unwrap_or(1)));
        }

        if let Some(stages) = stages {
            return Ok(LoadShape::Scheduled(RunSchedule::staged(stages)?));
        }

        let duration = self
            .cli
            .duration
            .or(file_duration)
            .or(self.default_duration_s.map(Duration::from_secs));
        let agents = agents.unwrap_or(1);

        match duration {
            Some(duration) => Ok(LoadShape::Scheduled(RunSchedule::fixed(agents, duration)?)),
            None => Ok(LoadShape::Open(agents)),
        }
    }
}
