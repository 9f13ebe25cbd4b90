use std::collections::BTreeMap;
use std::fmt::Write as _;

use rampr_core::{CHECKS, RunReport, SeriesSnapshot, SeriesSummary, ThresholdStatus, Verdict};

/// Render the final human-readable report: verdict, per-threshold
/// outcomes, check pass/fail counts and every metric's final aggregate.
pub fn render(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(&mut out, "  verdict: {}", report.verdict).ok();
    match report.verdict {
        Verdict::Aborted => {
            if let Some(err) = &report.setup_error {
                writeln!(&mut out, "  setup failed: {err}").ok();
            }
            if let Some(cause) = &report.aborted_by {
                writeln!(&mut out, "  aborted by: {cause}").ok();
            }
        }
        Verdict::Passed | Verdict::Failed => {}
    }
    writeln!(&mut out, "  elapsed: {:.2}s", report.elapsed.as_secs_f64()).ok();
    writeln!(
        &mut out,
        "  iterations: {} (errors {})",
        report.iterations_total, report.iteration_errors_total
    )
    .ok();
    if report.abandoned_vus > 0 {
        writeln!(&mut out, "  abandoned vus: {}", report.abandoned_vus).ok();
    }
    if let Some(err) = &report.teardown_error {
        writeln!(&mut out, "  teardown failed: {err}").ok();
    }

    render_thresholds(report, &mut out);
    render_checks(&report.metrics, &mut out);
    render_metrics(&report.metrics, &mut out);

    out
}

fn render_thresholds(report: &RunReport, out: &mut String) {
    if report.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &report.thresholds {
        let marker = match t.status {
            ThresholdStatus::Passed => "[OK]",
            ThresholdStatus::Failed => "[FAIL]",
            ThresholdStatus::Unresolvable => "[UNRESOLVED]",
        };
        match t.observed {
            Some(v) => {
                writeln!(
                    out,
                    "  {}: {} observed={} {marker}",
                    t.metric,
                    t.expression,
                    fmt_num(v)
                )
                .ok();
            }
            None => {
                writeln!(
                    out,
                    "  {}: {} observed=- {marker}",
                    t.metric, t.expression
                )
                .ok();
            }
        }
    }
}

fn render_checks(series: &[SeriesSummary], out: &mut String) {
    let mut rows: BTreeMap<String, (u64, u64)> = BTreeMap::new();

    for s in series.iter().filter(|s| s.name == CHECKS) {
        let Some(name) = s.tags.iter().find(|(k, _)| k == "check").map(|(_, v)| v) else {
            continue;
        };
        let SeriesSnapshot::Rate { total, trues } = &s.values else {
            continue;
        };
        let entry = rows.entry(name.clone()).or_default();
        entry.0 += *trues;
        entry.1 += total.saturating_sub(*trues);
    }

    if rows.is_empty() {
        return;
    }

    out.push_str("\nchecks\n");
    for (name, (pass, fail)) in rows {
        let status = if fail > 0 { "[FAIL]" } else { "[OK]" };
        writeln!(out, "  {name}: pass={pass} fail={fail} {status}").ok();
    }
}

fn render_metrics(series: &[SeriesSummary], out: &mut String) {
    let rows: Vec<&SeriesSummary> = series.iter().filter(|s| s.name != CHECKS).collect();
    if rows.is_empty() {
        return;
    }

    out.push_str("\nmetrics\n");
    for s in rows {
        let tags = fmt_tags(&s.tags);
        match &s.values {
            SeriesSnapshot::Counter { total, .. } => {
                writeln!(out, "  {}{} = {}", s.name, tags, fmt_num(*total)).ok();
            }
            SeriesSnapshot::Gauge { value } => match value {
                Some(v) => {
                    writeln!(out, "  {}{} = {}", s.name, tags, fmt_num(*v)).ok();
                }
                None => {
                    writeln!(out, "  {}{} = -", s.name, tags).ok();
                }
            },
            SeriesSnapshot::Rate { total, trues } => match s.values.rate() {
                Some(rate) => {
                    writeln!(
                        out,
                        "  {}{} = trues={trues} total={total} rate={rate:.3}",
                        s.name, tags
                    )
                    .ok();
                }
                None => {
                    writeln!(out, "  {}{} = trues={trues} total={total}", s.name, tags).ok();
                }
            },
            SeriesSnapshot::Trend(t) => {
                writeln!(
                    out,
                    "  {}{} = avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={} (n={})",
                    s.name,
                    tags,
                    fmt_opt(t.avg()),
                    fmt_opt(t.min),
                    fmt_opt(t.median()),
                    fmt_opt(t.max),
                    fmt_opt(t.percentile(90.0)),
                    fmt_opt(t.percentile(95.0)),
                    fmt_opt(t.percentile(99.0)),
                    t.count
                )
                .ok();
            }
        }
    }
}

fn fmt_tags(tags: &[(String, String)]) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let inner: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", inner.join(","))
}

fn fmt_num(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v:.3}")
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(fmt_num).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampr_core::{MetricKind, Store, TagSet, ThresholdOutcome};
    use std::sync::Arc;
    use std::time::Duration;

    fn sample_report() -> RunReport {
        let store = Arc::new(Store::default());

        let rtt = store
            .handle("rtt", MetricKind::Trend)
            .unwrap_or_else(|e| panic!("{e}"));
        rtt.add(100.0);
        rtt.add(200.0);

        let errors = store
            .handle("errors", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        errors.add(3.0);

        let checks = store
            .handle(CHECKS, MetricKind::Rate)
            .unwrap_or_else(|e| panic!("{e}"));
        checks.add_bool_with_tags(true, &TagSet::from_pairs(&[("check", "status is 200")]));
        checks.add_bool_with_tags(false, &TagSet::from_pairs(&[("check", "status is 200")]));

        RunReport {
            verdict: Verdict::Failed,
            setup_error: None,
            teardown_error: None,
            aborted_by: None,
            thresholds: vec![
                ThresholdOutcome {
                    metric: "rtt".to_string(),
                    expression: "avg<200".to_string(),
                    abort_on_fail: false,
                    status: ThresholdStatus::Passed,
                    observed: Some(150.0),
                },
                ThresholdOutcome {
                    metric: "errors".to_string(),
                    expression: "count<1".to_string(),
                    abort_on_fail: false,
                    status: ThresholdStatus::Failed,
                    observed: Some(3.0),
                },
                ThresholdOutcome {
                    metric: "missing".to_string(),
                    expression: "avg<1".to_string(),
                    abort_on_fail: false,
                    status: ThresholdStatus::Unresolvable,
                    observed: None,
                },
            ],
            metrics: store.summarize(),
            iterations_total: 42,
            iteration_errors_total: 1,
            abandoned_vus: 0,
            elapsed: Duration::from_secs(10),
        }
    }

    #[test]
    fn render_covers_all_sections() {
        let text = render(&sample_report());

        assert!(text.contains("verdict: failed"));
        assert!(text.contains("iterations: 42 (errors 1)"));

        assert!(text.contains("rtt: avg<200 observed=150 [OK]"));
        assert!(text.contains("errors: count<1 observed=3 [FAIL]"));
        assert!(text.contains("missing: avg<1 observed=- [UNRESOLVED]"));

        assert!(text.contains("status is 200: pass=1 fail=1 [FAIL]"));

        assert!(text.contains("errors = 3"));
        assert!(text.contains("avg=150"));
        assert!(text.contains("(n=2)"));
    }

    #[test]
    fn aborted_report_names_the_cause() {
        let mut report = sample_report();
        report.verdict = Verdict::Aborted;
        report.aborted_by = Some("errors: count<1".to_string());

        let text = render(&report);
        assert!(text.contains("verdict: aborted"));
        assert!(text.contains("aborted by: errors: count<1"));
    }
}
