use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{fmt::Debug, sync::Arc};

use stampede_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use stampede_instruments::Reporter;

use crate::definition::HookResult;
use crate::executor::Executor;
use crate::iteration::Iteration;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// The settings that hooks can read, resolved from the command line, config file and defaults.
#[derive(Debug, Clone)]
pub(crate) struct RunSettings {
    pub(crate) scenario_name: String,
    pub(crate) connection_string: String,
    pub(crate) think_times: HashMap<String, Duration>,
    pub(crate) data: HashMap<String, PathBuf>,
    pub(crate) request_timeout: Duration,
}

#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    shutdown_handle: ShutdownHandle,
    settings: RunSettings,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        shutdown_handle: ShutdownHandle,
        settings: RunSettings,
    ) -> Self {
        Self {
            executor,
            reporter,
            shutdown_handle,
            settings,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> Arc<Reporter> {
        self.reporter.clone()
    }

    /// A handle to the shutdown signal for this run.
    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown_handle
    }

    /// Stop the run now, cancelling requests that are in flight.
    ///
    /// Agents stop at their next check for shutdown and the run moves on to teardown and reporting.
    pub fn force_stop_scenario(&self) {
        self.shutdown_handle.shutdown();
    }

    pub fn scenario_name(&self) -> &str {
        &self.settings.scenario_name
    }

    /// The base URL of the backend under test.
    pub fn get_connection_string(&self) -> &str {
        &self.settings.connection_string
    }

    /// The configured length of a named pause. Pauses that nobody configured are zero.
    pub fn think_time(&self, name: &str) -> Duration {
        self.settings
            .think_times
            .get(name)
            .copied()
            .unwrap_or_default()
    }

    /// The path of a named data file.
    pub fn data_path(&self, name: &str) -> anyhow::Result<&Path> {
        self.settings
            .data
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                anyhow::anyhow!("No data file configured for `{name}`, pass --data={name}=<path>")
            })
    }

    pub fn request_timeout(&self) -> Duration {
        self.settings.request_timeout
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

pub struct AgentContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    agent_id: String,
    agent_index: usize,
    iteration: Iteration,
    /// When the current iteration is cancelled because this agent was ramped down.
    cancel_at: Option<Instant>,
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_listener: DelegatedShutdownListener,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> AgentContext<RV, V> {
    pub(crate) fn new(
        agent_index: usize,
        runner_context: Arc<RunnerContext<RV>>,
        shutdown_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            agent_id: format!("agent-{agent_index}"),
            agent_index,
            iteration: Iteration::new(agent_index, 0, None),
            cancel_at: None,
            runner_context,
            shutdown_listener,
            value: Default::default(),
        }
    }

    /// A unique identifier for this agent, `agent-<index>`.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The worker number of this agent, counting from zero.
    pub fn agent_index(&self) -> usize {
        self.agent_index
    }

    /// The iteration being run. Only meaningful inside the agent behaviour.
    pub fn iteration(&self) -> &Iteration {
        &self.iteration
    }

    pub(crate) fn set_iteration(&mut self, iteration: Iteration, cancel_at: Option<Instant>) {
        self.iteration = iteration;
        self.cancel_at = cancel_at;
    }

    /// Run async code for the current iteration on the shared runtime, blocking until it completes.
    ///
    /// Like [Executor::execute_in_place], but once this agent has been ramped down and its graceful
    /// ramp-down period is over the future is dropped and a
    /// [stampede_core::prelude::RampedDownError] is returned. Propagate it, the runner counts the
    /// iteration as aborted.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        self.runner_context
            .executor()
            .execute_in_place_until(fut, self.cancel_at)
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    /// Pause for the named think time.
    ///
    /// The pause is cut short if the run is stopped or the agent's iteration is cancelled, and the
    /// error returned should be propagated.
    pub fn think(&self, name: &str) -> HookResult {
        let pause = self.runner_context.think_time(name);
        if pause.is_zero() {
            return Ok(());
        }

        log::trace!("Agent {} thinking for {:?} ({name})", self.agent_id, pause);
        self.execute_in_place(async move {
            tokio::time::sleep(pause).await;
            Ok(())
        })
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}
