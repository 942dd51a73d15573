use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use stampede_core::prelude::{
    AgentBailError, DelegatedShutdownListener, IterationSkipped, RampedDownError,
    ShutdownSignalError,
};
use stampede_instruments::{IterationOutcome, IterationRecord, ReportConfig, Reporter};
use stampede_summary_model::append_run_summary;

use crate::cli::ReporterOpt;
use crate::context::{AgentContext, RunSettings, RunnerContext, UserValuesConstraint};
use crate::definition::{AgentHookMut, LoadShape, ScenarioDefinitionBuilder};
use crate::executor::Executor;
use crate::iteration::{IterationPlan, IterationSource, NextIteration};
use crate::monitor::{start_monitor, ThresholdMonitor, THRESHOLD_CHECK_INTERVAL};
use crate::progress::start_progress;
use crate::ramp::RampController;
use crate::shutdown::start_shutdown_listener;
use crate::summary::{build_run_summary, SummaryInput};
use crate::types::RunReport;

/// How long an inactive agent sleeps before it looks at the schedule again.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunReport> {
    let definition = definition.build()?;

    log::info!("Running scenario: {}", definition.name);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));
    let reporter = Arc::new(match definition.reporter {
        ReporterOpt::InMemory => ReportConfig::default().enable_summary().init(),
        ReporterOpt::Noop => ReportConfig::default().init(),
    });
    let mut runner_context = RunnerContext::new(
        executor,
        reporter.clone(),
        shutdown_handle.clone(),
        RunSettings {
            scenario_name: definition.name.clone(),
            connection_string: definition.connection_string.clone(),
            think_times: definition.think_times.clone(),
            data: definition.data.clone(),
            request_timeout: definition.request_timeout,
        },
    );

    if let Some(setup_fn) = &definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let plan = match (definition.shared_iterations, definition.iteration_plan_fn) {
        (Some(total), _) => IterationPlan::Shared { total },
        (None, Some(plan_fn)) => plan_fn(&runner_context)?,
        (None, None) => IterationPlan::Unbounded,
    };
    let worker_count = definition.load.worker_count();
    let iterations = Arc::new(IterationSource::new(plan, worker_count, definition.iterations)?);
    log::debug!("Starting {worker_count} agents with iteration plan {plan:?}");

    let started_at = chrono::Utc::now().timestamp();
    let start = Instant::now();
    let ramp = Arc::new(
        match &definition.load {
            LoadShape::Scheduled(schedule) => RampController::scheduled(schedule.clone(), start),
            LoadShape::Open(worker_count) => RampController::open(*worker_count, start),
        }
        .with_graceful_ramp_down(definition.graceful_ramp_down),
    );

    if !definition.no_progress {
        start_progress(ramp.clone(), shutdown_handle.new_listener())?;
    }

    let runner_context = Arc::new(runner_context);

    // Ready to start spawning agents so start the resource monitor to report high usage by agents
    // which might lead to a misleading outcome.
    start_monitor(shutdown_handle.new_listener())?;
    let threshold_monitor = ThresholdMonitor::start(
        definition.thresholds.clone(),
        reporter.clone(),
        runner_context.executor().clone(),
        shutdown_handle.clone(),
        THRESHOLD_CHECK_INTERVAL,
    )?;

    let mut handles = Vec::with_capacity(worker_count);
    for agent_index in 0..worker_count {
        let agent = Agent {
            context: AgentContext::new(
                agent_index,
                runner_context.clone(),
                shutdown_handle.new_listener(),
            ),
            cycle_shutdown_listener: shutdown_handle.new_listener(),
            ramp: ramp.clone(),
            iterations: iterations.clone(),
            reporter: reporter.clone(),
            setup_fn: definition.setup_agent_fn,
            behaviour_fn: definition.agent_behaviour,
            teardown_fn: definition.teardown_agent_fn,
        };

        handles.push(
            std::thread::Builder::new()
                .name(format!("agent-{agent_index}"))
                .spawn(move || agent.run())
                .context("Failed to spawn thread for agent")?,
        );
    }

    let mut worker_end_count = 0;
    for handle in handles {
        let still_running = handle
            .join()
            .map_err(|e| anyhow::anyhow!("Error joining thread for agent: {:?}", e))?;
        if still_running {
            worker_end_count += 1;
        }
    }

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting and runner
        // shutdown to happen cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    let aborted = threshold_monitor.aborted();

    // Stop the background threads.
    shutdown_handle.shutdown();
    threshold_monitor.join();

    let metrics = reporter.snapshot();
    let thresholds = definition.thresholds.evaluate(&metrics);
    reporter.finalize(&thresholds);

    if let Some(summary_file) = &definition.summary_file {
        let summary = build_run_summary(SummaryInput {
            run_id: &definition.run_id,
            scenario_name: &definition.name,
            started_at,
            load: &definition.load,
            worker_end_count,
            metrics: &metrics,
            thresholds: &thresholds,
            aborted,
        });
        if let Err(e) = append_run_summary(&summary, summary_file) {
            log::error!("Failed to write the run summary to {}: {:?}", summary_file.display(), e);
        }
    }

    let report = RunReport {
        thresholds,
        metrics,
        worker_end_count,
        aborted,
    };
    log::info!(
        "Scenario {} finished: {}",
        definition.name,
        if report.passed() { "PASS" } else { "FAIL" }
    );

    Ok(report)
}

/// Everything one agent thread needs.
struct Agent<RV: UserValuesConstraint, V: UserValuesConstraint> {
    context: AgentContext<RV, V>,
    /// For us to check if the agent should shut down between iterations
    cycle_shutdown_listener: DelegatedShutdownListener,
    ramp: Arc<RampController>,
    iterations: Arc<IterationSource>,
    reporter: Arc<Reporter>,
    setup_fn: Option<AgentHookMut<RV, V>>,
    behaviour_fn: Option<AgentHookMut<RV, V>>,
    teardown_fn: Option<AgentHookMut<RV, V>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Agent<RV, V> {
    /// Run the agent until its iterations run out, the run ends, or it bails.
    ///
    /// Returns whether the agent was still running when it stopped, rather than bailing.
    fn run(mut self) -> bool {
        let agent_id = self.context.agent_id().to_string();

        if let Some(setup_fn) = self.setup_fn {
            if let Err(e) = setup_fn(&mut self.context) {
                log::error!("Agent setup failed for agent {}: {:?}", agent_id, e);
                return false;
            }
        }

        let still_running = match self.behaviour_fn {
            Some(behaviour) => self.iterate(&agent_id, behaviour),
            None => true,
        };

        if let Some(teardown_fn) = self.teardown_fn {
            if let Err(e) = teardown_fn(&mut self.context) {
                log::error!("Agent teardown failed for agent {}: {:?}", agent_id, e);
            }
        }

        still_running
    }

    fn iterate(&mut self, agent_id: &str, behaviour: AgentHookMut<RV, V>) -> bool {
        let scenario_name = self.context.runner_context().scenario_name().to_string();
        let agent_index = self.context.agent_index();
        let mut sequence = 0;

        loop {
            if self.cycle_shutdown_listener.should_shutdown() {
                log::debug!("Stopping agent {}", agent_id);
                return true;
            }

            if self.ramp.deadline_passed() {
                log::debug!("Run schedule finished, stopping agent {}", agent_id);
                return true;
            }

            if !self.ramp.is_active(agent_index) {
                let wait = self
                    .ramp
                    .time_to_next_change()
                    .map_or(IDLE_POLL_INTERVAL, |next| next.min(IDLE_POLL_INTERVAL));
                std::thread::sleep(wait);
                continue;
            }

            let iteration = match self.iterations.next(agent_index, sequence) {
                NextIteration::Run(iteration) => iteration,
                NextIteration::NoOp => {
                    log::trace!("Agent {} has no entry for iteration {}", agent_id, sequence);
                    sequence += 1;
                    continue;
                }
                NextIteration::Exhausted => {
                    log::debug!("Agent {} has no more iterations", agent_id);
                    return true;
                }
            };
            sequence += 1;
            self.context
                .set_iteration(iteration, self.ramp.cancel_at(agent_index));

            let started = Instant::now();
            let outcome = match behaviour(&mut self.context) {
                Ok(()) => IterationOutcome::Completed,
                Err(e) if e.is::<ShutdownSignalError>() => {
                    // Expected while the run is being stopped, the check at the top of the loop
                    // will catch this and break out.
                    continue;
                }
                Err(e) if e.is::<AgentBailError>() => {
                    log::warn!("Agent {} bailed: {}", agent_id, e);
                    return false;
                }
                Err(e) if e.is::<RampedDownError>() => {
                    log::warn!(
                        "[{}] Agent {} was ramped down, cancelled its iteration",
                        scenario_name,
                        agent_id
                    );
                    IterationOutcome::Aborted
                }
                Err(e) if e.is::<IterationSkipped>() => {
                    log::info!("Agent {}: {}", agent_id, e);
                    IterationOutcome::Skipped
                }
                Err(e) => {
                    log::error!(
                        "[{}] Agent behaviour failed for agent {}: {:?}",
                        scenario_name,
                        agent_id,
                        e
                    );
                    IterationOutcome::Aborted
                }
            };

            self.reporter.add_iteration(IterationRecord::new(
                scenario_name.as_str(),
                agent_id,
                outcome,
                started.elapsed(),
            ));
        }
    }
}
