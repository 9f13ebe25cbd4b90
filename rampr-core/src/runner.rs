mod report;
mod run;
mod vu;

use std::sync::Arc;

pub use report::{RunPhase, RunReport, Verdict};
pub use run::{HookCtx, Hooks, run_test};
pub use vu::{IterationCtx, IterationFuture, iteration_fn};

/// Fire-and-forget logging sink.
pub type LogFn = Arc<dyn Fn(&str) + Send + Sync>;

pub(crate) fn noop_log() -> LogFn {
    Arc::new(|_| {})
}
