use std::sync::Arc;

use anyhow::Context as _;

use rampr_core::{
    Hooks, IterationCtx, IterationFuture, LogFn, Options, Requester, RunReport, run_test,
};

use crate::exit_codes::ExitCode;
use crate::options::parse_options;
use crate::output;

/// Result of one driven run: the engine report plus the derived process
/// exit code and the rendered human summary.
pub struct RunOutcome {
    pub report: RunReport,
    pub exit_code: ExitCode,
    pub summary: String,
}

/// Run a test described by a YAML options document.
///
/// The embedding application supplies the lifecycle callbacks, the
/// iteration function and (optionally) a request backend and a logging
/// sink; the schedule, thresholds and metric declarations come from the
/// options document.
pub async fn run_yaml<S, L, F>(
    yaml: &str,
    hooks: Hooks<S>,
    iteration: F,
    client: Option<Arc<dyn Requester>>,
    log: Option<LogFn>,
) -> anyhow::Result<RunOutcome>
where
    S: Send + Sync + 'static,
    L: Default + Send + 'static,
    F: for<'a> Fn(&'a mut IterationCtx<S, L>) -> IterationFuture<'a>
        + Clone
        + Send
        + Sync
        + 'static,
{
    let options = parse_options(yaml)?;
    run_options(options, hooks, iteration, client, log).await
}

/// Same as [`run_yaml`] for an already-built [`Options`] value.
pub async fn run_options<S, L, F>(
    options: Options,
    hooks: Hooks<S>,
    iteration: F,
    client: Option<Arc<dyn Requester>>,
    log: Option<LogFn>,
) -> anyhow::Result<RunOutcome>
where
    S: Send + Sync + 'static,
    L: Default + Send + 'static,
    F: for<'a> Fn(&'a mut IterationCtx<S, L>) -> IterationFuture<'a>
        + Clone
        + Send
        + Sync
        + 'static,
{
    let report = run_test(options, hooks, iteration, client, log)
        .await
        .context("run failed")?;

    let exit_code = ExitCode::from_report(&report);
    let summary = output::render_human(&report);

    Ok(RunOutcome {
        report,
        exit_code,
        summary,
    })
}
