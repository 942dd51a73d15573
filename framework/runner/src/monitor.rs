use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use stampede_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use stampede_instruments::{Reporter, ThresholdReport, ThresholdSet};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::executor::Executor;

/// How often thresholds are checked while the run is in progress.
pub(crate) const THRESHOLD_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Monitor the resource usage of the Stampede process and report high usage.
///
/// Note that this won't stop the test proceeding, it will just log a warning to let the user know
/// that the latencies being measured might be inflated by the load generator itself.
///
/// The CPU usage for the process is collected every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL] and checked.
/// If it is above 10% with respect to the number of cores then a warning is logged.
pub(crate) fn start_monitor(mut shutdown_listener: DelegatedShutdownListener) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let this_process_pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();

            sys.refresh_cpu_all();
            let cpu_count = sys.cpus().len().max(1);

            loop {
                if shutdown_listener.should_shutdown() {
                    break;
                }

                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[this_process_pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );

                let Some(process) = sys.process(this_process_pid) else {
                    log::warn!("Failed to get process info, stopping the resource monitor");
                    break;
                };

                let usage = (process.cpu_usage() / (cpu_count * 100) as f32) * 100.0;
                if usage > 10.0 {
                    log::warn!(
                        "High CPU usage detected. Stampede is using {:.2}% of the CPU, with {} available cores",
                        usage,
                        cpu_count
                    );
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }
        })?;

    Ok(())
}

/// Evaluates the thresholds while the run is going.
///
/// Each breach is logged once. A breach of a threshold marked `:abort` stops the run. Metrics
/// without any samples yet are ignored here, they are only judged at the end of the run.
#[derive(Debug)]
pub(crate) struct ThresholdMonitor {
    aborted: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ThresholdMonitor {
    pub(crate) fn start(
        thresholds: ThresholdSet,
        reporter: Arc<Reporter>,
        executor: Arc<Executor>,
        shutdown_handle: ShutdownHandle,
        interval: Duration,
    ) -> anyhow::Result<Self> {
        let aborted = Arc::new(AtomicBool::new(false));
        if thresholds.is_empty() {
            return Ok(Self {
                aborted,
                handle: None,
            });
        }

        let thread_aborted = aborted.clone();
        let handle = std::thread::Builder::new()
            .name("thresholds".to_string())
            .spawn(move || {
                let mut warned = HashSet::new();

                // Sleeping on the executor wakes as soon as the run is stopped.
                while executor
                    .execute_in_place(async {
                        tokio::time::sleep(interval).await;
                        Ok(())
                    })
                    .is_ok()
                {
                    let report = thresholds.evaluate(&reporter.snapshot());
                    if check_breaches(&report, &mut warned) {
                        log::error!("A threshold marked to abort was breached, stopping the run");
                        thread_aborted.store(true, Ordering::SeqCst);
                        shutdown_handle.shutdown();
                        break;
                    }
                }
            })?;

        Ok(Self {
            aborted,
            handle: Some(handle),
        })
    }

    /// Whether a threshold stopped the run.
    pub(crate) fn aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Wait for the monitor to stop, which it does once the run is stopped.
    pub(crate) fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("The threshold monitor panicked");
            }
        }
    }
}

/// Log new breaches and return whether the run should be aborted.
fn check_breaches(report: &ThresholdReport, warned: &mut HashSet<String>) -> bool {
    let mut abort = false;
    for result in report.breached() {
        let Some(observed) = result.observed else {
            continue;
        };

        if warned.insert(result.expression.clone()) {
            log::warn!(
                "Threshold breached during the run: {} (observed {:.4})",
                result.expression,
                observed
            );
        }
        abort |= result.abort_on_fail;
    }

    abort
}
