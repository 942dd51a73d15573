use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Parse a human readable duration such as `500ms`, `30s`, `2m` or `1h`.
///
/// A bare number is taken to be seconds.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (value, unit) = s.split_at(split);

    let value = value
        .parse::<f64>()
        .with_context(|| format!("Invalid duration `{s}`"))?;
    if !value.is_finite() || value < 0.0 {
        anyhow::bail!("Invalid duration `{s}`");
    }

    let seconds = match unit.trim() {
        "ms" => value / 1000.0,
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => anyhow::bail!("Unknown duration unit `{other}` in `{s}`, use ms, s, m or h"),
    };

    Ok(Duration::from_secs_f64(seconds))
}

/// Parse a `name=value` pair where the value is a duration.
pub(crate) fn parse_named_duration(s: &str) -> anyhow::Result<(String, Duration)> {
    let (name, value) = split_named(s)?;
    Ok((name, parse_duration(value)?))
}

pub(crate) fn parse_named_path(s: &str) -> anyhow::Result<(String, PathBuf)> {
    let (name, value) = split_named(s)?;
    Ok((name, PathBuf::from(value)))
}

fn split_named(s: &str) -> anyhow::Result<(String, &str)> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Expected `name=value`, got `{s}`"))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Missing name in `{s}`");
    }

    Ok((name.to_string(), value.trim()))
}

/// Run configuration read from a TOML file with `--config`.
///
/// Every field is optional. Values given on the command line take precedence over the file, and
/// the file takes precedence over the defaults that the scenario sets.
///
/// ```toml
/// connection_string = "http://localhost:8000"
/// stages = ["30s:3", "30s:9"]
/// thresholds = ["http_req_duration:p(95)<2000"]
///
/// [think_time]
/// between_checkins = "1s"
///
/// [data]
/// credentials = "data/users.json"
/// ```
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub connection_string: Option<String>,
    pub agents: Option<usize>,
    pub duration: Option<String>,
    #[serde(default)]
    pub stages: Vec<String>,
    pub graceful_ramp_down: Option<String>,
    pub iterations: Option<usize>,
    pub shared_iterations: Option<usize>,
    pub soak: Option<bool>,
    #[serde(default)]
    pub thresholds: Vec<String>,
    #[serde(default)]
    pub think_time: HashMap<String, String>,
    #[serde(default)]
    pub data: HashMap<String, PathBuf>,
    pub request_timeout: Option<String>,
    pub run_id: Option<String>,
    pub summary_file: Option<PathBuf>,
}

impl ConfigFile {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        content
            .parse()
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub(crate) fn duration(&self) -> anyhow::Result<Option<Duration>> {
        self.duration.as_deref().map(parse_duration).transpose()
    }

    pub(crate) fn graceful_ramp_down(&self) -> anyhow::Result<Option<Duration>> {
        self.graceful_ramp_down
            .as_deref()
            .map(parse_duration)
            .transpose()
    }

    pub(crate) fn request_timeout(&self) -> anyhow::Result<Option<Duration>> {
        self.request_timeout.as_deref().map(parse_duration).transpose()
    }

    pub(crate) fn think_times(&self) -> anyhow::Result<HashMap<String, Duration>> {
        self.think_time
            .iter()
            .map(|(name, value)| {
                parse_duration(value)
                    .map(|d| (name.clone(), d))
                    .with_context(|| format!("Invalid think time `{name}`"))
            })
            .collect()
    }
}

impl std::str::FromStr for ConfigFile {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}
