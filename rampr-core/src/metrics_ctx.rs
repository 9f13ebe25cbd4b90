use std::sync::Arc;

use rampr_metrics::{MetricHandle, MetricKind, Store, TagSet};

/// Built-in metric names maintained by the engine.
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const ITERATION_ERRORS: &str = "iteration_errors";
pub const VUS: &str = "vus";
pub const CHECKS: &str = "checks";
pub const GROUP_DURATION: &str = "group_duration";

/// Shared recording surface handed to every component that emits metrics.
///
/// Holds the store plus pre-bound handles for the built-in series, so the
/// hot path never re-resolves names.
#[derive(Debug, Clone)]
pub struct MetricsCtx {
    store: Arc<Store>,
    iterations: MetricHandle,
    iteration_duration: MetricHandle,
    iteration_errors: MetricHandle,
    vus: MetricHandle,
    checks: MetricHandle,
    group_duration: MetricHandle,
}

impl MetricsCtx {
    /// Bind the built-in metric names. Fails if an operator declaration
    /// already bound one of them to a different kind.
    pub fn new(store: Arc<Store>) -> Result<Self, rampr_metrics::Error> {
        Ok(Self {
            iterations: store.handle(ITERATIONS, MetricKind::Counter)?,
            iteration_duration: store.handle(ITERATION_DURATION, MetricKind::Trend)?,
            iteration_errors: store.handle(ITERATION_ERRORS, MetricKind::Counter)?,
            vus: store.handle(VUS, MetricKind::Gauge)?,
            checks: store.handle(CHECKS, MetricKind::Rate)?,
            group_duration: store.handle(GROUP_DURATION, MetricKind::Trend)?,
            store,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Writer handle for a custom metric, validating the name's kind binding.
    pub fn counter(&self, name: &str) -> Result<MetricHandle, rampr_metrics::Error> {
        self.store.handle(name, MetricKind::Counter)
    }

    pub fn gauge(&self, name: &str) -> Result<MetricHandle, rampr_metrics::Error> {
        self.store.handle(name, MetricKind::Gauge)
    }

    pub fn rate(&self, name: &str) -> Result<MetricHandle, rampr_metrics::Error> {
        self.store.handle(name, MetricKind::Rate)
    }

    pub fn trend(&self, name: &str) -> Result<MetricHandle, rampr_metrics::Error> {
        self.store.handle(name, MetricKind::Trend)
    }

    /// Record a named assertion into the built-in `checks` rate; returns the
    /// outcome so call sites can branch on it.
    pub fn check(&self, name: &str, ok: bool) -> bool {
        self.checks
            .add_bool_with_tags(ok, &TagSet::from_pairs(&[("check", name)]));
        ok
    }

    pub(crate) fn iterations(&self) -> &MetricHandle {
        &self.iterations
    }

    pub(crate) fn iteration_duration(&self) -> &MetricHandle {
        &self.iteration_duration
    }

    pub(crate) fn iteration_errors(&self) -> &MetricHandle {
        &self.iteration_errors
    }

    pub(crate) fn vus(&self) -> &MetricHandle {
        &self.vus
    }

    pub(crate) fn group_duration(&self) -> &MetricHandle {
        &self.group_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampr_metrics::SeriesSnapshot;

    #[test]
    fn builtins_are_declared_up_front() {
        let store = Arc::new(Store::default());
        let _ctx = MetricsCtx::new(store.clone()).unwrap_or_else(|e| panic!("{e}"));

        // A later conflicting declaration fails.
        assert!(store.declare(ITERATIONS, MetricKind::Gauge).is_err());
        assert!(store.declare(CHECKS, MetricKind::Rate).is_ok());
    }

    #[test]
    fn conflicting_operator_declaration_fails_builtin_binding() {
        let store = Arc::new(Store::default());
        store
            .declare(VUS, MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(MetricsCtx::new(store).is_err());
    }

    #[test]
    fn check_records_tagged_and_base_series() {
        let store = Arc::new(Store::default());
        let ctx = MetricsCtx::new(store.clone()).unwrap_or_else(|e| panic!("{e}"));

        assert!(ctx.check("status is 200", true));
        assert!(!ctx.check("status is 200", false));
        assert!(ctx.check("has body", true));

        let base = store
            .snapshot(CHECKS)
            .unwrap_or_else(|| panic!("missing checks series"));
        assert_eq!(base.samples(), 3);

        let tagged = store
            .snapshot_with_tags(CHECKS, &TagSet::from_pairs(&[("check", "status is 200")]))
            .unwrap_or_else(|| panic!("missing tagged series"));
        assert_eq!(tagged.rate(), Some(0.5));
    }

    #[test]
    fn custom_handles_enforce_kind_binding() {
        let store = Arc::new(Store::default());
        let ctx = MetricsCtx::new(store).unwrap_or_else(|e| panic!("{e}"));

        let c = ctx.counter("errors").unwrap_or_else(|e| panic!("{e}"));
        c.add(1.0);
        assert!(ctx.gauge("errors").is_err());

        let SeriesSnapshot::Counter { total, .. } = c.snapshot() else {
            panic!("expected counter");
        };
        assert_eq!(total, 1.0);
    }
}
