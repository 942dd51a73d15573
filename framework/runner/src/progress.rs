use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use stampede_core::prelude::DelegatedShutdownListener;

use crate::ramp::RampController;

fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Displays a progress bar while the run is going, with the time left and the current worker target.
///
/// The bar clears itself when the schedule ends or the run is stopped.
pub(crate) fn start_progress(
    ramp: Arc<RampController>,
    mut shutdown_listener: DelegatedShutdownListener,
) -> anyhow::Result<()> {
    let Some(planned_runtime) = ramp.planned_duration() else {
        return Ok(());
    };

    let style = ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}",
    )?
    .with_key("planned_runtime", {
        let planned = format_hms(planned_runtime);
        move |_state: &ProgressState, w: &mut dyn Write| {
            let _ = w.write_str(&planned);
        }
    })
    .progress_chars("#>-");

    std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_secs());
            pb.set_style(style);

            loop {
                if shutdown_listener.should_shutdown() || ramp.deadline_passed() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                pb.set_position(start_time.elapsed().as_secs().min(planned_runtime.as_secs()));
                pb.set_message(format!("{} workers", ramp.target_now()));
                std::thread::sleep(Duration::from_millis(500));
            }
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_planned_runtime() {
        assert_eq!("00:00:30", format_hms(Duration::from_secs(30)));
        assert_eq!("01:20:05", format_hms(Duration::from_secs(4805)));
    }
}
