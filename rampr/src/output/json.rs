use std::collections::BTreeMap;

use serde::Serialize;

use rampr_core::{RunReport, SeriesSnapshot, SeriesSummary, ThresholdOutcome};

#[derive(Debug, Serialize)]
struct JsonReport {
    verdict: String,
    elapsed_ms: f64,
    iterations_total: u64,
    iteration_errors_total: u64,
    abandoned_vus: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    setup_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    teardown_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aborted_by: Option<String>,
    thresholds: Vec<JsonThreshold>,
    metrics: Vec<JsonMetric>,
}

#[derive(Debug, Serialize)]
struct JsonThreshold {
    metric: String,
    expression: String,
    abort_on_fail: bool,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    observed: Option<f64>,
}

impl From<&ThresholdOutcome> for JsonThreshold {
    fn from(t: &ThresholdOutcome) -> Self {
        Self {
            metric: t.metric.clone(),
            expression: t.expression.clone(),
            abort_on_fail: t.abort_on_fail,
            status: t.status.to_string(),
            observed: t.observed,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonMetric {
    name: String,
    kind: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, String>,
    #[serde(flatten)]
    values: JsonValues,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum JsonValues {
    Counter {
        total: f64,
        samples: u64,
    },
    Gauge {
        value: Option<f64>,
    },
    Rate {
        trues: u64,
        total: u64,
        rate: Option<f64>,
    },
    Trend {
        count: u64,
        min: Option<f64>,
        max: Option<f64>,
        avg: Option<f64>,
        med: Option<f64>,
        p90: Option<f64>,
        p95: Option<f64>,
        p99: Option<f64>,
    },
}

impl From<&SeriesSummary> for JsonMetric {
    fn from(s: &SeriesSummary) -> Self {
        let values = match &s.values {
            SeriesSnapshot::Counter { total, samples } => JsonValues::Counter {
                total: *total,
                samples: *samples,
            },
            SeriesSnapshot::Gauge { value } => JsonValues::Gauge { value: *value },
            SeriesSnapshot::Rate { total, trues } => JsonValues::Rate {
                trues: *trues,
                total: *total,
                rate: s.values.rate(),
            },
            SeriesSnapshot::Trend(t) => JsonValues::Trend {
                count: t.count,
                min: t.min,
                max: t.max,
                avg: t.avg(),
                med: t.median(),
                p90: t.percentile(90.0),
                p95: t.percentile(95.0),
                p99: t.percentile(99.0),
            },
        };

        Self {
            name: s.name.clone(),
            kind: s.kind.to_string(),
            tags: s.tags.iter().cloned().collect(),
            values,
        }
    }
}

/// Machine-readable form of the final report.
pub fn render(report: &RunReport) -> anyhow::Result<String> {
    let json = JsonReport {
        verdict: report.verdict.to_string(),
        elapsed_ms: report.elapsed.as_secs_f64() * 1000.0,
        iterations_total: report.iterations_total,
        iteration_errors_total: report.iteration_errors_total,
        abandoned_vus: report.abandoned_vus,
        setup_error: report.setup_error.clone(),
        teardown_error: report.teardown_error.clone(),
        aborted_by: report.aborted_by.clone(),
        thresholds: report.thresholds.iter().map(JsonThreshold::from).collect(),
        metrics: report.metrics.iter().map(JsonMetric::from).collect(),
    };

    Ok(serde_json::to_string_pretty(&json)?)
}
