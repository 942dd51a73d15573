use stampede_core::prelude::ShutdownHandle;
use tokio::signal;

/// Listen for Ctrl-C and turn it into a forced shutdown of the run.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::new();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("Received shutdown signal, shutting down...");
                listener_handle.shutdown();
            }
            Err(e) => {
                log::error!("Failed to listen for Ctrl-C, the run can only end by itself: {e:?}");
            }
        }
    });

    handle
}
