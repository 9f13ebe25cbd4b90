use std::time::Duration;

use rampr_metrics::SeriesSummary;

use crate::thresholds::ThresholdOutcome;

/// Lifecycle phase of a run. Transitions are logged through the sink as
/// they happen; the terminal outcome is the [`Verdict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum RunPhase {
    Idle,
    SettingUp,
    Running,
    TearingDown,
    Evaluating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Verdict {
    /// Ran to completion, every threshold held.
    Passed,
    /// Ran to completion, at least one threshold failed or was
    /// unresolvable.
    Failed,
    /// Terminated early: setup failure or an abort-on-fail threshold.
    Aborted,
}

/// Final account of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub verdict: Verdict,

    /// Set when setup crashed; no VU ever ran.
    pub setup_error: Option<String>,

    /// Set when teardown failed; does not affect the verdict.
    pub teardown_error: Option<String>,

    /// The threshold (selector + expression) that aborted the run.
    pub aborted_by: Option<String>,

    pub thresholds: Vec<ThresholdOutcome>,
    pub metrics: Vec<SeriesSummary>,

    pub iterations_total: u64,
    pub iteration_errors_total: u64,

    /// Workers that exceeded the drain grace period and were forcibly
    /// abandoned. Logged, not a failure.
    pub abandoned_vus: u64,

    /// Wall time of the Running phase.
    pub elapsed: Duration,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}
