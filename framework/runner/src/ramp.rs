use crate::schedule::RunSchedule;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Shape {
    Scheduled(RunSchedule),
    /// A fixed number of workers and no deadline.
    Open(usize),
}

/// How long a ramped down worker may keep working on its current iteration, unless configured.
pub const DEFAULT_GRACEFUL_RAMP_DOWN: Duration = Duration::from_secs(30);

/// Decides how many workers may be running at any moment of the run.
///
/// Workers are numbered from zero, and worker `n` is active while the current target is greater
/// than `n`. A worker that becomes inactive may finish its current iteration within the graceful
/// ramp-down period, after that the iteration is cancelled.
#[derive(Debug, Clone)]
pub struct RampController {
    start: Instant,
    shape: Shape,
    graceful_ramp_down: Duration,
}

impl RampController {
    pub fn scheduled(schedule: RunSchedule, start: Instant) -> Self {
        Self {
            start,
            shape: Shape::Scheduled(schedule),
            graceful_ramp_down: DEFAULT_GRACEFUL_RAMP_DOWN,
        }
    }

    pub fn open(worker_count: usize, start: Instant) -> Self {
        Self {
            start,
            shape: Shape::Open(worker_count),
            graceful_ramp_down: DEFAULT_GRACEFUL_RAMP_DOWN,
        }
    }

    pub fn with_graceful_ramp_down(mut self, graceful_ramp_down: Duration) -> Self {
        self.graceful_ramp_down = graceful_ramp_down;
        self
    }

    pub fn schedule(&self) -> Option<&RunSchedule> {
        match &self.shape {
            Shape::Scheduled(schedule) => Some(schedule),
            Shape::Open(_) => None,
        }
    }

    /// The number of workers to start, enough to meet the highest target.
    pub fn worker_count(&self) -> usize {
        match &self.shape {
            Shape::Scheduled(schedule) => schedule.max_target(),
            Shape::Open(worker_count) => *worker_count,
        }
    }

    pub fn planned_duration(&self) -> Option<Duration> {
        self.schedule().map(RunSchedule::total_duration)
    }

    pub fn target_now(&self) -> usize {
        self.target_at(Instant::now())
    }

    pub fn is_active(&self, worker: usize) -> bool {
        worker < self.target_now()
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline_passed_at(Instant::now())
    }

    pub fn time_to_next_change(&self) -> Option<Duration> {
        self.time_to_next_change_at(Instant::now())
    }

    /// When an iteration that `worker` starts now must be cancelled.
    ///
    /// That is the end of the graceful ramp-down period after the worker's next deactivation. A
    /// deactivation that is over before its grace period runs out does not count, and neither
    /// does the end of the schedule.
    pub fn cancel_at(&self, worker: usize) -> Option<Instant> {
        self.cancel_at_from(worker, Instant::now())
    }

    fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    fn target_at(&self, now: Instant) -> usize {
        match &self.shape {
            Shape::Scheduled(schedule) => schedule.target_at(self.elapsed_at(now)),
            Shape::Open(worker_count) => *worker_count,
        }
    }

    fn deadline_passed_at(&self, now: Instant) -> bool {
        match &self.shape {
            Shape::Scheduled(schedule) => schedule.is_complete(self.elapsed_at(now)),
            Shape::Open(_) => false,
        }
    }

    fn time_to_next_change_at(&self, now: Instant) -> Option<Duration> {
        match &self.shape {
            Shape::Scheduled(schedule) => schedule.time_to_next_boundary(self.elapsed_at(now)),
            Shape::Open(_) => None,
        }
    }

    fn cancel_at_from(&self, worker: usize, now: Instant) -> Option<Instant> {
        let Shape::Scheduled(schedule) = &self.shape else {
            return None;
        };

        let elapsed = self.elapsed_at(now);
        let mut inactive_since = None;
        for segment in schedule.segments().iter().filter(|s| s.end > elapsed) {
            if segment.target > worker {
                inactive_since = None;
                continue;
            }

            let cancel = *inactive_since.get_or_insert(segment.start) + self.graceful_ramp_down;
            if cancel < segment.end {
                return Some(self.start + cancel);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Stage;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn active_workers_follow_the_schedule() {
        let start = Instant::now();
        let ramp = RampController::scheduled(
            RunSchedule::staged(vec![
                Stage::new(secs(10), 2),
                Stage::new(secs(10), 5),
                Stage::new(secs(10), 1),
            ])
            .unwrap(),
            start,
        );

        assert_eq!(5, ramp.worker_count());
        assert_eq!(2, ramp.target_at(start + secs(1)));
        assert_eq!(5, ramp.target_at(start + secs(10)));
        assert_eq!(1, ramp.target_at(start + secs(25)));
        assert_eq!(0, ramp.target_at(start + secs(30)));

        assert_eq!(Some(secs(4)), ramp.time_to_next_change_at(start + secs(16)));
        assert!(!ramp.deadline_passed_at(start + secs(29)));
        assert!(ramp.deadline_passed_at(start + secs(30)));
    }

    #[test]
    fn ramped_down_workers_are_cancelled_after_the_grace_period() {
        let start = Instant::now();
        let ramp = RampController::scheduled(
            RunSchedule::staged(vec![
                Stage::new(secs(10), 3),
                Stage::new(secs(10), 1),
                Stage::new(secs(10), 2),
            ])
            .unwrap(),
            start,
        )
        .with_graceful_ramp_down(secs(4));

        // Workers 1 and 2 lose their slot at 10s.
        assert_eq!(Some(start + secs(14)), ramp.cancel_at_from(1, start + secs(3)));
        assert_eq!(Some(start + secs(14)), ramp.cancel_at_from(2, start + secs(3)));
        // Worker 0 stays active until the deadline, which never cancels.
        assert_eq!(None, ramp.cancel_at_from(0, start + secs(3)));
        // Worker 1 is active again from 20s to the end.
        assert_eq!(None, ramp.cancel_at_from(1, start + secs(21)));
        assert_eq!(Some(start + secs(24)), ramp.cancel_at_from(2, start + secs(21)));
    }

    #[test]
    fn short_deactivations_do_not_cancel() {
        let start = Instant::now();
        let schedule = RunSchedule::staged(vec![
            Stage::new(secs(10), 2),
            Stage::new(secs(2), 1),
            Stage::new(secs(10), 2),
            Stage::new(secs(10), 1),
        ])
        .unwrap();

        let ramp = RampController::scheduled(schedule.clone(), start)
            .with_graceful_ramp_down(secs(5));
        assert_eq!(Some(start + secs(27)), ramp.cancel_at_from(1, start));

        let ramp = RampController::scheduled(schedule, start).with_graceful_ramp_down(secs(1));
        assert_eq!(Some(start + secs(11)), ramp.cancel_at_from(1, start));
    }

    #[test]
    fn open_runs_have_no_deadline() {
        let start = Instant::now();
        let ramp = RampController::open(3, start);

        assert_eq!(3, ramp.worker_count());
        assert_eq!(3, ramp.target_at(start + secs(100_000)));
        assert!(!ramp.deadline_passed_at(start + secs(100_000)));
        assert_eq!(None, ramp.time_to_next_change_at(start));
        assert_eq!(None, ramp.planned_duration());
        assert_eq!(None, ramp.cancel_at_from(2, start));
    }
}
