pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`stages` must be a non-empty list of {{ duration, target }} with a non-zero total duration")]
    InvalidStages,

    #[error("invalid threshold `{raw}`: {reason}")]
    InvalidThreshold { raw: String, reason: String },

    #[error(transparent)]
    Metric(#[from] rampr_metrics::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Failure of the one-shot setup callback. Fatal: the run aborts before any
/// virtual user starts.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SetupError {
    message: String,
}

impl SetupError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure of a single iteration. Caught at the virtual-user boundary,
/// counted and logged; never crashes the run.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct IterationError {
    message: String,
}

impl IterationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<rampr_metrics::Error> for IterationError {
    fn from(err: rampr_metrics::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<crate::http::RequestError> for IterationError {
    fn from(err: crate::http::RequestError) -> Self {
        Self::new(err.to_string())
    }
}

/// Failure of the one-shot teardown callback. Recorded in the report but
/// does not change the verdict path.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TeardownError {
    message: String,
}

impl TeardownError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
