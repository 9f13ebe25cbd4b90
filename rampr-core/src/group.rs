use std::future::Future;

use rampr_metrics::TagSet;
use tokio::time::Instant;

use crate::metrics_ctx::MetricsCtx;

/// Run `block` and report its wall-clock duration (milliseconds) as a
/// Trend observation under the built-in `group_duration` metric, tagged
/// `{ group: <name> }`.
///
/// Groups nest freely; each level reports independently. The tracker keeps
/// no state beyond the timer and does not validate the block's own metric
/// calls.
pub async fn group<F, Fut, T>(metrics: &MetricsCtx, name: &str, block: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let started = Instant::now();
    let out = block().await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    metrics
        .group_duration()
        .add_with_tags(elapsed_ms, &TagSet::from_pairs(&[("group", name)]));

    out
}
