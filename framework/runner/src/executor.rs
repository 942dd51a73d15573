use std::future::Future;
use std::time::Instant;

use stampede_core::prelude::{RampedDownError, ShutdownHandle, ShutdownSignalError};

/// Runs the async work of the scenario hooks on a runtime shared by every agent.
///
/// Agents live on their own OS threads and block on their own futures, so the steps of one agent
/// run strictly in order while many agents make progress at once.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, shutdown_handle: ShutdownHandle) -> Self {
        Self {
            runtime,
            shutdown_handle,
        }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// The future is dropped if the run is stopped, and a [ShutdownSignalError] is returned in its
    /// place. Requests that are in flight at that point are cancelled without being recorded.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        self.execute_in_place_until(fut, None)
    }

    /// Run async code in place like [Executor::execute_in_place], giving up at `cancel_at`.
    ///
    /// Once `cancel_at` is reached the future is dropped and a [RampedDownError] is returned. If
    /// that moment has already passed the future is not started.
    pub fn execute_in_place_until<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
        cancel_at: Option<Instant>,
    ) -> anyhow::Result<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        if shutdown_listener.should_shutdown() {
            return Err(ShutdownSignalError::default().into());
        }
        if cancel_at.is_some_and(|at| at <= Instant::now()) {
            return Err(RampedDownError.into());
        }

        self.runtime.block_on(async move {
            let cancelled = async {
                match cancel_at {
                    Some(at) => tokio::time::sleep_until(at.into()).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                result = fut => result,
                _ = shutdown_listener.wait_for_shutdown() => {
                    Err(ShutdownSignalError::default().into())
                },
                _ = cancelled => Err(RampedDownError.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn executor() -> (Executor, ShutdownHandle) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let handle = ShutdownHandle::new();
        (Executor::new(runtime, handle.clone()), handle)
    }

    #[test]
    fn returns_the_result_of_the_future() {
        let (executor, _handle) = executor();

        let value = executor.execute_in_place(async { Ok(7) }).unwrap();

        assert_eq!(7, value);
    }

    #[test]
    fn shutdown_cancels_the_future() {
        let (executor, handle) = executor();

        let trigger = handle.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            trigger.shutdown();
        });

        let result = executor.execute_in_place(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        assert!(result.unwrap_err().is::<ShutdownSignalError>());
    }

    #[test]
    fn nothing_runs_after_shutdown() {
        let (executor, handle) = executor();
        handle.shutdown();

        let result = executor.execute_in_place(async { Ok(()) });

        assert!(result.unwrap_err().is::<ShutdownSignalError>());
    }

    #[test]
    fn passing_the_cancel_time_drops_the_future() {
        let (executor, _handle) = executor();
        let start = Instant::now();

        let result = executor.execute_in_place_until(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            Some(start + Duration::from_millis(50)),
        );

        assert!(result.unwrap_err().is::<RampedDownError>());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn nothing_starts_after_the_cancel_time() {
        let (executor, _handle) = executor();
        let started = std::sync::atomic::AtomicBool::new(false);

        let result = executor.execute_in_place_until(
            async {
                started.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            },
            Some(Instant::now() - Duration::from_millis(1)),
        );

        assert!(result.unwrap_err().is::<RampedDownError>());
        assert!(!started.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn work_that_beats_the_cancel_time_completes() {
        let (executor, _handle) = executor();

        let value = executor
            .execute_in_place_until(async { Ok(3) }, Some(Instant::now() + Duration::from_secs(60)))
            .unwrap();

        assert_eq!(3, value);
    }
}
