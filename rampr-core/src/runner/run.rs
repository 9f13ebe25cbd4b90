use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rampr_metrics::{SeriesSnapshot, Store};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::Options;
use crate::error::{Result, SetupError, TeardownError};
use crate::http::{NullRequester, Requester};
use crate::metrics_ctx::{ITERATION_ERRORS, ITERATIONS, MetricsCtx};
use crate::thresholds::{compile_thresholds, evaluate_final, first_abort_violation};

use super::report::{RunPhase, RunReport, Verdict};
use super::vu::{IterationCtx, IterationFuture, WorkerSeat, drive_vu};
use super::{LogFn, noop_log};

/// Context handed to the setup and teardown callbacks. Both may issue
/// requests and record metrics (setup-time checks land in the same store).
pub struct HookCtx {
    pub client: Arc<dyn Requester>,
    pub metrics: MetricsCtx,
    log: LogFn,
}

impl HookCtx {
    pub fn check(&self, name: &str, ok: bool) -> bool {
        self.metrics.check(name, ok)
    }

    pub fn log(&self, msg: &str) {
        (self.log)(msg);
    }
}

type SetupFn<S> =
    Box<dyn FnOnce(HookCtx) -> Pin<Box<dyn Future<Output = std::result::Result<S, SetupError>> + Send>> + Send>;
type TeardownFn<S> = Box<
    dyn FnOnce(Arc<S>, HookCtx) -> Pin<Box<dyn Future<Output = std::result::Result<(), TeardownError>> + Send>>
        + Send,
>;

/// One-shot lifecycle callbacks around the iteration loop.
///
/// Setup runs once per test (not per VU); its output is frozen and shared
/// read-only with every worker and with teardown.
pub struct Hooks<S> {
    setup: SetupFn<S>,
    teardown: Option<TeardownFn<S>>,
}

impl<S: Send + Sync + 'static> Hooks<S> {
    pub fn new<F, Fut>(setup: F) -> Self
    where
        F: FnOnce(HookCtx) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<S, SetupError>> + Send + 'static,
    {
        Self {
            setup: Box::new(move |ctx| Box::pin(setup(ctx))),
            teardown: None,
        }
    }

    /// Hooks that share a pre-built value without running any setup logic.
    pub fn with_data(data: S) -> Self {
        Self::new(move |_ctx| async move { Ok(data) })
    }

    #[must_use]
    pub fn on_teardown<F, Fut>(mut self, teardown: F) -> Self
    where
        F: FnOnce(Arc<S>, HookCtx) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), TeardownError>> + Send + 'static,
    {
        self.teardown = Some(Box::new(move |data, ctx| Box::pin(teardown(data, ctx))));
        self
    }
}

impl Hooks<()> {
    /// No setup data at all.
    pub fn none() -> Self {
        Self::new(|_ctx| async { Ok(()) })
    }
}

fn counter_total(store: &Store, name: &str) -> u64 {
    match store.snapshot(name) {
        Some(SeriesSnapshot::Counter { total, .. }) => total as u64,
        _ => 0,
    }
}

/// Execute one full test run.
///
/// Lifecycle: setup once, drive the stage schedule with a worker seat per
/// potential VU, check abort-on-fail thresholds on a fixed interval, drain
/// workers bounded by the grace period, teardown once, then evaluate every
/// threshold against the final snapshot for the verdict.
pub async fn run_test<S, L, F>(
    options: Options,
    hooks: Hooks<S>,
    iteration: F,
    client: Option<Arc<dyn Requester>>,
    log: Option<LogFn>,
) -> Result<RunReport>
where
    S: Send + Sync + 'static,
    L: Default + Send + 'static,
    F: for<'a> Fn(&'a mut IterationCtx<S, L>) -> IterationFuture<'a>
        + Clone
        + Send
        + Sync
        + 'static,
{
    let schedule = Arc::new(options.schedule()?);
    let rules = compile_thresholds(&options.thresholds)?;

    let store = Arc::new(Store::default());
    for decl in &options.metrics {
        store.declare(&decl.name, decl.kind)?;
    }
    let metrics = MetricsCtx::new(store.clone())?;

    let client: Arc<dyn Requester> = client.unwrap_or_else(|| Arc::new(NullRequester));
    let log = log.unwrap_or_else(noop_log);
    let phase = |p: RunPhase| (log)(&format!("phase: {p}"));

    phase(RunPhase::SettingUp);
    let hook_ctx = HookCtx {
        client: client.clone(),
        metrics: metrics.clone(),
        log: log.clone(),
    };
    let data = match (hooks.setup)(hook_ctx).await {
        Ok(v) => Arc::new(v),
        Err(err) => {
            (log)(&format!("setup failed: {err}"));
            return Ok(RunReport {
                verdict: Verdict::Aborted,
                setup_error: Some(err.to_string()),
                teardown_error: None,
                aborted_by: None,
                thresholds: Vec::new(),
                metrics: store.summarize(),
                iterations_total: 0,
                iteration_errors_total: 0,
                abandoned_vus: 0,
                elapsed: Duration::ZERO,
            });
        }
    };

    phase(RunPhase::Running);
    let started = Instant::now();
    let (abort_tx, abort_rx) = watch::channel(false);

    let max_vus = schedule.max_target();
    let mut workers = Vec::with_capacity(max_vus as usize);
    for vu_index in 1..=max_vus {
        let seat = WorkerSeat {
            vu_index,
            data: data.clone(),
            schedule: schedule.clone(),
            think_time: options.think_time,
            client: client.clone(),
            metrics: metrics.clone(),
            log: log.clone(),
            started,
            abort: abort_rx.clone(),
        };
        let iteration = iteration.clone();
        workers.push(tokio::spawn(drive_vu::<S, L, F>(seat, iteration)));
    }
    drop(abort_rx);

    // Supervisor loop: track the commanded VU target and run intermediate
    // abort-on-fail checks until the schedule ends or a rule fires.
    let deadline = started + schedule.total_duration();
    let mut ticker = tokio::time::interval(options.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut aborted_by = None;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            _ = ticker.tick() => {
                let target = schedule.target_at(started.elapsed());
                metrics.vus().add(target as f64);

                if let Some(violation) = first_abort_violation(&store, &rules) {
                    (log)(&format!(
                        "threshold failed (abort): {}: {} (observed {})",
                        violation.metric,
                        violation.expression,
                        violation.observed.unwrap_or(f64::NAN),
                    ));
                    let _ = abort_tx.send(true);
                    aborted_by = Some(format!(
                        "{}: {}",
                        violation.metric, violation.expression
                    ));
                    break;
                }
            }
        }
    }

    // Drain: workers finish their current iteration (and pending think
    // time) on their own; the grace period bounds how long we wait.
    let grace_deadline = Instant::now() + options.grace_period;
    let mut abandoned_vus = 0u64;
    for (idx, mut handle) in workers.into_iter().enumerate() {
        match tokio::time::timeout_at(grace_deadline, &mut handle).await {
            Ok(joined) => joined?,
            Err(_) => {
                handle.abort();
                abandoned_vus += 1;
                (log)(&format!(
                    "vu {}: exceeded drain grace period, abandoned",
                    idx + 1
                ));
            }
        }
    }
    metrics.vus().add(0.0);
    let elapsed = started.elapsed();

    phase(RunPhase::TearingDown);
    let mut teardown_error = None;
    if let Some(teardown) = hooks.teardown {
        let hook_ctx = HookCtx {
            client: client.clone(),
            metrics: metrics.clone(),
            log: log.clone(),
        };
        if let Err(err) = teardown(data.clone(), hook_ctx).await {
            (log)(&format!("teardown failed: {err}"));
            teardown_error = Some(err.to_string());
        }
    }

    phase(RunPhase::Evaluating);
    let thresholds = evaluate_final(&store, &rules);
    let verdict = if aborted_by.is_some() {
        Verdict::Aborted
    } else if thresholds.iter().all(|t| t.passed()) {
        Verdict::Passed
    } else {
        Verdict::Failed
    };
    (log)(&format!("verdict: {verdict}"));

    Ok(RunReport {
        verdict,
        setup_error: None,
        teardown_error,
        aborted_by,
        thresholds,
        metrics: store.summarize(),
        iterations_total: counter_total(&store, ITERATIONS),
        iteration_errors_total: counter_total(&store, ITERATION_ERRORS),
        abandoned_vus,
        elapsed,
    })
}
