use rampr_core::{RunReport, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Run completed but one or more thresholds failed or were
    /// unresolvable.
    ThresholdsFailed = 11,

    /// Run terminated early by an abort-on-fail threshold.
    Aborted = 12,

    /// Setup crashed before any virtual user started.
    SetupFailed = 20,

    /// Invalid options (bad YAML, invalid durations, malformed threshold
    /// expressions, kind conflicts).
    InvalidOptions = 30,

    /// Internal/runtime error (panics, join failures).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_report(report: &RunReport) -> Self {
        match report.verdict {
            Verdict::Passed => Self::Success,
            Verdict::Failed => Self::ThresholdsFailed,
            Verdict::Aborted if report.setup_error.is_some() => Self::SetupFailed,
            Verdict::Aborted => Self::Aborted,
        }
    }
}
