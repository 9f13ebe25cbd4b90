mod config;
mod error;
mod group;
mod http;
mod metrics_ctx;
mod runner;
mod schedule;
mod thresholds;

pub use config::{MetricDecl, Options, Stage};
pub use error::{Error, IterationError, Result, SetupError, TeardownError};
pub use group::group;
pub use http::{
    BatchFuture, Method, NullRequester, Request, RequestError, RequestFuture, Requester, Response,
    Timings,
};
pub use metrics_ctx::{
    CHECKS, GROUP_DURATION, ITERATION_DURATION, ITERATION_ERRORS, ITERATIONS, MetricsCtx, VUS,
};
pub use runner::{
    HookCtx, Hooks, IterationCtx, IterationFuture, LogFn, RunPhase, RunReport, Verdict,
    iteration_fn, run_test,
};
pub use schedule::RampingVuSchedule;
pub use thresholds::{
    CompiledThreshold, MetricSelector, ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdOutcome,
    ThresholdRule, ThresholdStatus, compile_thresholds, evaluate_final, first_abort_violation,
};

pub use rampr_metrics::{
    MetricHandle, MetricKind, SeriesSnapshot, SeriesSummary, Store, TagSet, TrendSnapshot,
};
