use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::IterationError;
use crate::group;
use crate::http::Requester;
use crate::metrics_ctx::MetricsCtx;
use crate::schedule::RampingVuSchedule;

use super::LogFn;

pub type IterationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), IterationError>> + Send + 'a>>;

/// Per-iteration view of one virtual user.
///
/// `data` is the frozen setup output, shared read-only by every worker.
/// `local` is this worker's private state: it persists across iterations
/// of the same logical VU and is reset when a worker is replaced after an
/// iteration error.
pub struct IterationCtx<S, L> {
    data: Arc<S>,
    pub local: L,
    vu_id: u64,
    iteration: u64,
    client: Arc<dyn Requester>,
    metrics: MetricsCtx,
    log: LogFn,
}

impl<S, L> IterationCtx<S, L> {
    fn new(
        data: Arc<S>,
        local: L,
        vu_id: u64,
        client: Arc<dyn Requester>,
        metrics: MetricsCtx,
        log: LogFn,
    ) -> Self {
        Self {
            data,
            local,
            vu_id,
            iteration: 0,
            client,
            metrics,
            log,
        }
    }

    pub fn data(&self) -> &S {
        &self.data
    }

    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    /// Iterations completed by this logical VU before the current one.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn client(&self) -> &Arc<dyn Requester> {
        &self.client
    }

    pub fn metrics(&self) -> &MetricsCtx {
        &self.metrics
    }

    pub fn check(&self, name: &str, ok: bool) -> bool {
        self.metrics.check(name, ok)
    }

    /// Measure a named block of work; see [`crate::group`].
    pub async fn group<F, Fut, T>(&self, name: &str, block: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        group::group(&self.metrics, name, block).await
    }

    pub fn log(&self, msg: &str) {
        (self.log)(msg);
    }
}

/// Identity helper that pins a closure to the iteration-function signature,
/// so type inference accepts `|ctx| Box::pin(async move { ... })` closures.
pub fn iteration_fn<S, L, F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut IterationCtx<S, L>) -> IterationFuture<'a>,
{
    f
}

pub(crate) struct WorkerSeat<S> {
    /// 1-based index into the schedule: the seat runs while
    /// `vu_index <= target(t)`.
    pub vu_index: u64,
    pub data: Arc<S>,
    pub schedule: Arc<RampingVuSchedule>,
    pub think_time: Option<Duration>,
    pub client: Arc<dyn Requester>,
    pub metrics: MetricsCtx,
    pub log: LogFn,
    pub started: Instant,
    pub abort: watch::Receiver<bool>,
}

/// Drive one worker seat for the lifetime of the run.
///
/// The seat parks (short sleeps) while its index is above the current
/// target and runs iterations while at or below it, so live concurrency
/// converges to the schedule without ever interrupting an iteration
/// mid-flight. An iteration error replaces the logical VU: the seat keeps
/// going with fresh per-VU state.
pub(crate) async fn drive_vu<S, L, F>(seat: WorkerSeat<S>, iteration: F)
where
    S: Send + Sync + 'static,
    L: Default + Send + 'static,
    F: for<'a> Fn(&'a mut IterationCtx<S, L>) -> IterationFuture<'a> + Send + Sync + 'static,
{
    let fresh_ctx = || {
        IterationCtx::new(
            seat.data.clone(),
            L::default(),
            seat.vu_index,
            seat.client.clone(),
            seat.metrics.clone(),
            seat.log.clone(),
        )
    };
    let mut ctx = fresh_ctx();

    loop {
        if *seat.abort.borrow() {
            break;
        }

        let elapsed = seat.started.elapsed();
        if seat.schedule.is_done(elapsed) {
            break;
        }

        let target = seat.schedule.target_at(elapsed);
        if seat.vu_index > target {
            let wait = seat.schedule.next_recheck_in(elapsed, seat.vu_index);
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
            continue;
        }

        let iter_started = Instant::now();
        let outcome = iteration(&mut ctx).await;
        let elapsed_ms = iter_started.elapsed().as_secs_f64() * 1000.0;

        seat.metrics.iterations().add(1.0);
        seat.metrics.iteration_duration().add(elapsed_ms);
        ctx.iteration = ctx.iteration.saturating_add(1);

        if let Err(err) = outcome {
            seat.metrics.iteration_errors().add(1.0);
            (seat.log)(&format!("vu {}: iteration error: {err}", seat.vu_index));
            // Replacement VU takes over the seat with reset local state.
            ctx = fresh_ctx();
        }

        // The pending think-time belongs to the iteration: a worker marked
        // for shutdown still completes it before exiting.
        if let Some(pause) = seat.think_time {
            tokio::time::sleep(pause).await;
        }
    }
}
