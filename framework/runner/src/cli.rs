use crate::config::{parse_duration, parse_named_duration, parse_named_path};
use crate::schedule::{ScheduleError, Stage};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct StampedeScenarioCli {
    /// The base URL of the backend to test, for example `http://localhost:8000`
    #[clap(short, long)]
    pub connection_string: Option<String>,

    /// A TOML file to read run configuration from.
    ///
    /// Flags given on the command line override values from the file.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// The number of workers to run, for a run without stages
    #[clap(long)]
    pub agents: Option<usize>,

    /// How long to run the scenario for, for example `90s` or `20m`. A bare number is seconds.
    #[clap(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// A stage of the concurrency schedule in the format `duration:target`, for example
    /// `--stage=30s:3`.
    ///
    /// Repeat the flag to build a schedule, stages run in the order given. Stages replace
    /// `--agents` and `--duration`.
    #[clap(long, value_parser = parse_stage)]
    pub stage: Vec<Stage>,

    /// How long a worker that the schedule ramps down may spend finishing its current iteration,
    /// for example `10s`. The iteration is cancelled and counted as aborted after that.
    #[clap(long, value_parser = parse_duration)]
    pub graceful_ramp_down: Option<Duration>,

    /// The maximum number of iterations each worker runs
    #[clap(long)]
    pub iterations: Option<usize>,

    /// A total number of iterations shared by all workers. Workers stop once it is used up.
    ///
    /// This replaces the scenario's own way of handing out iterations.
    #[clap(long)]
    pub shared_iterations: Option<usize>,

    /// Run this test as a soak test, ignoring any configured duration and continuing to run until stopped
    #[clap(long, default_value = "false")]
    pub soak: bool,

    /// A pass/fail threshold such as `http_req_duration:p(95)<2000`.
    ///
    /// Add a tag filter to judge a single step or scenario, for example
    /// `http_req_duration{step:checkin}:max<5000`, and an `:abort` suffix to stop the run as soon
    /// as the threshold is breached.
    ///
    /// Repeat the flag to set more than one threshold. Thresholds given here replace the
    /// scenario's defaults.
    #[clap(long)]
    pub threshold: Vec<String>,

    /// Override a named pause of the scenario, for example `--think-time=between_checkins=500ms`
    #[clap(long, value_parser = parse_named_duration)]
    pub think_time: Vec<(String, Duration)>,

    /// Point a named data file at a path, for example `--data=credentials=users.json`
    #[clap(long, value_parser = parse_named_path)]
    pub data: Vec<(String, PathBuf)>,

    /// How long to wait for each HTTP request before giving up on it
    #[clap(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Where to report the results of the run
    #[clap(long, value_enum, default_value_t = ReporterOpt::InMemory)]
    pub reporter: ReporterOpt,

    /// Set the run id, a random id is generated if none is given
    #[clap(long)]
    pub run_id: Option<String>,

    /// Append a JSON summary of the run to this file
    #[clap(long)]
    pub summary_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReporterOpt {
    /// Aggregate in memory and print summary tables at the end of the run
    #[default]
    InMemory,
    /// Aggregate in memory for threshold evaluation, but print nothing
    Noop,
}

fn parse_stage(s: &str) -> Result<Stage, ScheduleError> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        StampedeScenarioCli::command().debug_assert();
    }

    #[test]
    fn parse_repeated_flags() {
        let cli = StampedeScenarioCli::try_parse_from([
            "scenario",
            "--connection-string=http://localhost:8000",
            "--stage=30s:3",
            "--stage=1m:9",
            "--graceful-ramp-down=5s",
            "--shared-iterations=400",
            "--threshold=http_req_failed:rate<0.01",
            "--think-time=between_checkins=500ms",
            "--data=credentials=users.json",
            "--reporter=noop",
        ])
        .unwrap();

        assert_eq!(
            vec![
                Stage::new(Duration::from_secs(30), 3),
                Stage::new(Duration::from_secs(60), 9)
            ],
            cli.stage
        );
        assert_eq!(Some(Duration::from_secs(5)), cli.graceful_ramp_down);
        assert_eq!(Some(400), cli.shared_iterations);
        assert_eq!(1, cli.threshold.len());
        assert_eq!(
            vec![("between_checkins".to_string(), Duration::from_millis(500))],
            cli.think_time
        );
        assert_eq!(
            vec![("credentials".to_string(), PathBuf::from("users.json"))],
            cli.data
        );
        assert_eq!(ReporterOpt::Noop, cli.reporter);
    }

    #[test]
    fn reject_bad_stage() {
        assert!(StampedeScenarioCli::try_parse_from(["scenario", "--stage=3"]).is_err());
    }
}
