//! Declarative run options, deserialized from YAML.
//!
//! The file mirrors the engine's configuration surface: the `vus` +
//! `duration` shorthand or a `stages` ramp, custom metric declarations,
//! and a map of threshold selectors to expressions.
//!
//! ```yaml
//! stages:
//!   - { duration: 3s, target: 2 }
//!   - { duration: 5s, target: 5 }
//!   - { duration: 2s, target: 0 }
//! think_time: 500ms
//! metrics:
//!   rtt: trend
//!   errors: counter
//! thresholds:
//!   rtt: ["p(99) < 300", "avg < 200", "med < 150"]
//!   errors: ["count < 100"]
//!   "group_duration{group:singles}":
//!     - threshold: "avg < 400"
//!       abort_on_fail: true
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Deserializer};

use rampr_core::{MetricDecl, MetricKind, Options, Stage, ThresholdRule, compile_thresholds};

fn duration_from_str<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

fn opt_duration_from_str<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom))
        .transpose()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageFile {
    #[serde(deserialize_with = "duration_from_str")]
    duration: Duration,
    target: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MetricKindFile {
    Counter,
    Gauge,
    Rate,
    Trend,
}

impl From<MetricKindFile> for MetricKind {
    fn from(kind: MetricKindFile) -> Self {
        match kind {
            MetricKindFile::Counter => MetricKind::Counter,
            MetricKindFile::Gauge => MetricKind::Gauge,
            MetricKindFile::Rate => MetricKind::Rate,
            MetricKindFile::Trend => MetricKind::Trend,
        }
    }
}

/// One threshold entry: either a bare expression string or an object
/// carrying the abort modifier.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ThresholdEntry {
    Expr(String),
    Rule {
        threshold: String,
        #[serde(default)]
        abort_on_fail: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsFile {
    #[serde(default)]
    vus: Option<u64>,

    #[serde(default, deserialize_with = "opt_duration_from_str")]
    duration: Option<Duration>,

    #[serde(default)]
    start_vus: Option<u64>,

    #[serde(default)]
    stages: Vec<StageFile>,

    #[serde(default, deserialize_with = "opt_duration_from_str")]
    think_time: Option<Duration>,

    #[serde(default, deserialize_with = "opt_duration_from_str")]
    grace_period: Option<Duration>,

    #[serde(default)]
    metrics: BTreeMap<String, MetricKindFile>,

    #[serde(default)]
    thresholds: BTreeMap<String, Vec<ThresholdEntry>>,
}

impl OptionsFile {
    fn into_options(self) -> Options {
        let defaults = Options::default();

        let mut thresholds = Vec::new();
        for (metric, entries) in self.thresholds {
            for entry in entries {
                let (expression, abort_on_fail) = match entry {
                    ThresholdEntry::Expr(e) => (e, false),
                    ThresholdEntry::Rule {
                        threshold,
                        abort_on_fail,
                    } => (threshold, abort_on_fail),
                };
                thresholds.push(ThresholdRule {
                    metric: metric.clone(),
                    expression,
                    abort_on_fail,
                });
            }
        }

        Options {
            vus: self.vus,
            duration: self.duration,
            start_vus: self.start_vus,
            stages: self
                .stages
                .into_iter()
                .map(|s| Stage {
                    duration: s.duration,
                    target: s.target,
                })
                .collect(),
            think_time: self.think_time,
            grace_period: self.grace_period.unwrap_or(defaults.grace_period),
            check_interval: defaults.check_interval,
            thresholds,
            metrics: self
                .metrics
                .into_iter()
                .map(|(name, kind)| MetricDecl {
                    name,
                    kind: kind.into(),
                })
                .collect(),
        }
    }
}

/// Parse and validate a YAML options document.
///
/// Validation goes beyond the schema: the stage configuration must build a
/// schedule and every threshold expression must compile, so a bad options
/// file fails before any run starts.
pub fn parse_options(yaml: &str) -> anyhow::Result<Options> {
    let file: OptionsFile = serde_yaml::from_str(yaml).context("invalid options document")?;
    let options = file.into_options();

    options.schedule().context("invalid run shape")?;
    compile_thresholds(&options.thresholds).context("invalid thresholds")?;

    Ok(options)
}
