use crate::config::parse_duration;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ScheduleError {
    #[error("A run schedule needs at least one stage")]
    Empty,
    #[error("Stage {0} has a zero duration")]
    ZeroDuration(usize),
    #[error("Invalid stage `{0}`, expected `duration:target`, for example `30s:3`")]
    InvalidStage(String),
    #[error("A geometric schedule needs a factor of at least 1, got {0}")]
    InvalidFactor(f64),
}

/// One segment of a run schedule: hold `target` workers for `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

impl FromStr for Stage {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidStage(s.to_string());
        let (duration, target) = s.trim().split_once(':').ok_or_else(invalid)?;
        let duration = parse_duration(duration).map_err(|_| invalid())?;
        let target = target.trim().parse::<usize>().map_err(|_| invalid())?;

        Ok(Stage::new(duration, target))
    }
}

/// A segment of the schedule placed on the run's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: Duration,
    pub end: Duration,
    pub target: usize,
}

impl Segment {
    fn contains(&self, elapsed: Duration) -> bool {
        self.start <= elapsed && elapsed < self.end
    }
}

/// An ordered list of stages that partition the run's total duration.
///
/// The target of a stage applies for the whole of that stage, so the number of active workers
/// changes in steps at stage boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSchedule {
    segments: Vec<Segment>,
}

impl RunSchedule {
    /// Hold a fixed number of workers for a fixed duration.
    pub fn fixed(target: usize, duration: Duration) -> Result<Self, ScheduleError> {
        Self::staged(vec![Stage::new(duration, target)])
    }

    pub fn staged(stages: Vec<Stage>) -> Result<Self, ScheduleError> {
        if stages.is_empty() {
            return Err(ScheduleError::Empty);
        }

        let mut segments = Vec::with_capacity(stages.len());
        let mut start = Duration::ZERO;
        for (index, stage) in stages.into_iter().enumerate() {
            if stage.duration.is_zero() {
                return Err(ScheduleError::ZeroDuration(index));
            }

            let end = start + stage.duration;
            segments.push(Segment {
                start,
                end,
                target: stage.target,
            });
            start = end;
        }

        Ok(Self { segments })
    }

    /// Ramp up by multiplying the target by `factor` at every stage, `3, 9, 27, ...` for a start
    /// of 3 and a factor of 3.
    pub fn geometric(
        start: usize,
        factor: f64,
        stage_count: usize,
        stage_duration: Duration,
    ) -> Result<Self, ScheduleError> {
        if !(factor >= 1.0) {
            return Err(ScheduleError::InvalidFactor(factor));
        }

        let mut target = start as f64;
        let stages = (0..stage_count)
            .map(|_| {
                let stage = Stage::new(stage_duration, target.round() as usize);
                target *= factor;
                stage
            })
            .collect();

        Self::staged(stages)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.segments
            .iter()
            .map(|s| Stage::new(s.end - s.start, s.target))
    }

    pub fn total_duration(&self) -> Duration {
        self.segments.last().map(|s| s.end).unwrap_or_default()
    }

    /// The largest target in the schedule, which is the number of workers the run needs.
    pub fn max_target(&self) -> usize {
        self.segments.iter().map(|s| s.target).max().unwrap_or(0)
    }

    pub fn segment_at(&self, elapsed: Duration) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(elapsed))
    }

    /// The concurrency target at `elapsed`, zero once the schedule has finished.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        self.segment_at(elapsed).map(|s| s.target).unwrap_or(0)
    }

    pub fn is_complete(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Time from `elapsed` until the target next changes, if it does.
    pub fn time_to_next_boundary(&self, elapsed: Duration) -> Option<Duration> {
        self.segment_at(elapsed).map(|s| s.end - elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn segments_partition_the_total_duration() {
        for stages in [
            vec![Stage::new(secs(30), 3)],
            vec![Stage::new(secs(10), 1), Stage::new(secs(5), 4), Stage::new(secs(1), 2)],
            vec![Stage::new(Duration::from_millis(1500), 2); 7],
        ] {
            let expected_total: Duration = stages.iter().map(|s| s.duration).sum();
            let schedule = RunSchedule::staged(stages).unwrap();

            assert_eq!(expected_total, schedule.total_duration());
            assert_eq!(Duration::ZERO, schedule.segments()[0].start);
            for pair in schedule.segments().windows(2) {
                // Contiguous, so no gap and no overlap.
                assert_eq!(pair[0].end, pair[1].start);
                assert!(pair[0].start < pair[0].end);
            }
        }
    }

    #[test]
    fn target_follows_the_current_stage() {
        let schedule = RunSchedule::staged(vec![Stage::new(secs(30), 3), Stage::new(secs(30), 9)]).unwrap();

        assert_eq!(3, schedule.target_at(Duration::ZERO));
        assert_eq!(3, schedule.target_at(Duration::from_millis(29_999)));
        assert_eq!(9, schedule.target_at(secs(30)));
        assert_eq!(0, schedule.target_at(secs(60)));
        assert!(!schedule.is_complete(Duration::from_millis(59_999)));
        assert!(schedule.is_complete(secs(60)));
        assert_eq!(Some(secs(5)), schedule.time_to_next_boundary(secs(25)));
        assert_eq!(None, schedule.time_to_next_boundary(secs(61)));
    }

    #[test]
    fn geometric_ramp() {
        let schedule = RunSchedule::geometric(3, 3.0, 6, secs(30)).unwrap();
        let targets = schedule.stages().map(|s| s.target).collect::<Vec<_>>();

        assert_eq!(vec![3, 9, 27, 81, 243, 729], targets);
        assert_eq!(secs(180), schedule.total_duration());
        assert_eq!(729, schedule.max_target());
    }

    #[test]
    fn reject_invalid_schedules() {
        assert_eq!(Err(ScheduleError::Empty), RunSchedule::staged(vec![]));
        assert_eq!(
            Err(ScheduleError::ZeroDuration(1)),
            RunSchedule::staged(vec![Stage::new(secs(1), 1), Stage::new(Duration::ZERO, 2)])
        );
        assert_eq!(
            Err(ScheduleError::InvalidFactor(0.5)),
            RunSchedule::geometric(1, 0.5, 2, secs(1))
        );
    }

    #[test]
    fn parse_stage() {
        assert_eq!(Ok(Stage::new(secs(30), 3)), "30s:3".parse::<Stage>());
        assert_eq!(Ok(Stage::new(secs(120), 81)), "2m:81".parse::<Stage>());
        assert!("30s".parse::<Stage>().is_err());
        assert!("30s:many".parse::<Stage>().is_err());
    }
}
