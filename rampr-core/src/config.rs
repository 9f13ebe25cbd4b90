use std::time::Duration;

use rampr_metrics::MetricKind;

use crate::error::{Error, Result};
use crate::schedule::RampingVuSchedule;
use crate::thresholds::ThresholdRule;

/// One ramp segment: interpolate towards `target` VUs over `duration`.
#[derive(Debug, Clone)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// Up-front declaration of a custom metric, binding its name to a kind
/// before the run starts.
#[derive(Debug, Clone)]
pub struct MetricDecl {
    pub name: String,
    pub kind: MetricKind,
}

/// Operator-facing run configuration.
///
/// Either `stages` describes a ramping schedule, or the `vus` + `duration`
/// shorthand describes a constant-concurrency run.
#[derive(Debug, Clone)]
pub struct Options {
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub start_vus: Option<u64>,
    pub stages: Vec<Stage>,

    /// Fixed pause after each iteration.
    pub think_time: Option<Duration>,

    /// Bound on the ramp-down drain after the schedule ends; a worker that
    /// exceeds it is forcibly abandoned.
    pub grace_period: Duration,

    /// Interval between intermediate threshold checks.
    pub check_interval: Duration,

    pub thresholds: Vec<ThresholdRule>,
    pub metrics: Vec<MetricDecl>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            vus: None,
            duration: None,
            start_vus: None,
            stages: Vec::new(),
            think_time: None,
            grace_period: Duration::from_secs(10),
            check_interval: Duration::from_secs(1),
            thresholds: Vec::new(),
            metrics: Vec::new(),
        }
    }
}

impl Options {
    /// Validate the stage configuration and build the concrete schedule.
    pub fn schedule(&self) -> Result<RampingVuSchedule> {
        if !self.stages.is_empty() {
            let total = self
                .stages
                .iter()
                .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration));
            if total.is_zero() {
                return Err(Error::InvalidStages);
            }

            let start = self.start_vus.unwrap_or(0);
            let max_stage = self.stages.iter().map(|s| s.target).max().unwrap_or(0);
            if max_stage.max(start) == 0 {
                return Err(Error::InvalidVus);
            }

            return Ok(RampingVuSchedule::new(start, self.stages.clone()));
        }

        // No-ramp shorthand: hold `vus` flat for `duration`.
        let vus = self.vus.ok_or(Error::InvalidVus)?;
        if vus == 0 {
            return Err(Error::InvalidVus);
        }
        let duration = self.duration.ok_or(Error::InvalidDuration)?;
        if duration.is_zero() {
            return Err(Error::InvalidDuration);
        }

        Ok(RampingVuSchedule::new(
            vus,
            vec![Stage {
                duration,
                target: vus,
            }],
        ))
    }
}
