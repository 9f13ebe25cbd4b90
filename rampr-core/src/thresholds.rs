use rampr_metrics::{SeriesSnapshot, Store, TagSet};

use crate::error::{Error, Result};

/// Declarative pass/fail rule as written by the operator:
/// a metric selector, one expression, and the abort modifier.
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    /// `name` or `name{key:value, ...}`.
    pub metric: String,
    /// e.g. `p(95) < 200`, `rate>0.95`, `count<100`.
    pub expression: String,
    pub abort_on_fail: bool,
}

/// Parsed metric selector: a name plus a normalized tag set. A selector
/// with tags addresses the series recorded under exactly that tag set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelector {
    pub name: String,
    pub tags: TagSet,
}

impl std::fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.tags.is_empty() {
            return write!(f, "{}", self.name);
        }
        write!(f, "{}{{", self.name)?;
        for (i, (k, v)) in self.tags.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{k}:{v}")?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Rate,
    Avg,
    Med,
    Min,
    Max,
    /// Last value of a Gauge.
    Value,
    Count,
    /// Percentile, e.g. `p(99.9)`.
    P(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// A rule compiled against its selector and expression, ready to evaluate.
#[derive(Debug, Clone)]
pub struct CompiledThreshold {
    pub selector: MetricSelector,
    pub expr: ThresholdExpr,
    pub expression: String,
    pub abort_on_fail: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ThresholdStatus {
    Passed,
    Failed,
    /// The rule references a metric with no observations, or a kind the
    /// aggregation does not apply to. A hard evaluation error, never a
    /// silent pass.
    Unresolvable,
}

/// Result of evaluating one rule against a snapshot.
#[derive(Debug, Clone)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub abort_on_fail: bool,
    pub status: ThresholdStatus,
    pub observed: Option<f64>,
}

impl ThresholdOutcome {
    pub fn passed(&self) -> bool {
        self.status == ThresholdStatus::Passed
    }
}

pub fn parse_selector(raw: &str) -> Result<MetricSelector> {
    let invalid = |reason: &str| Error::InvalidThreshold {
        raw: raw.to_string(),
        reason: reason.to_string(),
    };

    let s = raw.trim();
    let Some(brace) = s.find('{') else {
        if s.is_empty() {
            return Err(invalid("empty metric name"));
        }
        return Ok(MetricSelector {
            name: s.to_string(),
            tags: TagSet::default(),
        });
    };

    let name = s[..brace].trim();
    if name.is_empty() {
        return Err(invalid("empty metric name"));
    }

    let rest = &s[brace + 1..];
    let Some(inner) = rest.strip_suffix('}') else {
        return Err(invalid("unterminated tag selector"));
    };

    let mut pairs: Vec<(String, String)> = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((k, v)) = part.split_once(':') else {
            return Err(invalid("tag selector entries must be `key:value`"));
        };
        let (k, v) = (k.trim(), v.trim());
        if k.is_empty() || v.is_empty() {
            return Err(invalid("tag selector entries must be `key:value`"));
        }
        pairs.push((k.to_string(), v.to_string()));
    }

    Ok(MetricSelector {
        name: name.to_string(),
        tags: TagSet::from_pairs(&pairs),
    })
}

pub fn parse_expr(raw: &str) -> Result<ThresholdExpr> {
    let invalid = |reason: String| Error::InvalidThreshold {
        raw: raw.to_string(),
        reason,
    };

    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err(invalid("empty expression".to_string()));
    }

    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| invalid("missing comparison operator".to_string()))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(invalid("expected `<aggregation> <op> <number>`".to_string()));
    }

    let agg = if left.eq_ignore_ascii_case("rate") {
        ThresholdAgg::Rate
    } else if left.eq_ignore_ascii_case("avg") {
        ThresholdAgg::Avg
    } else if left.eq_ignore_ascii_case("med") {
        ThresholdAgg::Med
    } else if left.eq_ignore_ascii_case("min") {
        ThresholdAgg::Min
    } else if left.eq_ignore_ascii_case("max") {
        ThresholdAgg::Max
    } else if left.eq_ignore_ascii_case("value") {
        ThresholdAgg::Value
    } else if left.eq_ignore_ascii_case("count") {
        ThresholdAgg::Count
    } else if let Some(inner) = left.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) {
        let p: f64 = inner
            .parse()
            .map_err(|_| invalid(format!("invalid percentile `{inner}`")))?;
        if !(p > 0.0 && p <= 100.0) {
            return Err(invalid(format!("percentile `{inner}` out of range (0, 100]")));
        }
        ThresholdAgg::P(p)
    } else {
        return Err(invalid(format!("unknown aggregation `{left}`")));
    };

    let value: f64 = right
        .parse()
        .map_err(|_| invalid(format!("invalid numeric value `{right}`")))?;

    Ok(ThresholdExpr { agg, op, value })
}

/// Compile all rules up front so a malformed rule fails before the run
/// starts.
pub fn compile_thresholds(rules: &[ThresholdRule]) -> Result<Vec<CompiledThreshold>> {
    let mut out = Vec::with_capacity(rules.len());
    for rule in rules {
        out.push(CompiledThreshold {
            selector: parse_selector(&rule.metric)?,
            expr: parse_expr(&rule.expression)?,
            expression: rule.expression.clone(),
            abort_on_fail: rule.abort_on_fail,
        });
    }
    Ok(out)
}

fn compare(left: f64, op: ThresholdOp, right: f64) -> bool {
    match op {
        ThresholdOp::Lt => left < right,
        ThresholdOp::Lte => left <= right,
        ThresholdOp::Gt => left > right,
        ThresholdOp::Gte => left >= right,
    }
}

fn observed_value(snapshot: &SeriesSnapshot, agg: ThresholdAgg) -> Option<f64> {
    match (snapshot, agg) {
        (SeriesSnapshot::Counter { total, .. }, ThresholdAgg::Count) => Some(*total),

        (SeriesSnapshot::Gauge { value }, ThresholdAgg::Value) => *value,

        (SeriesSnapshot::Rate { .. }, ThresholdAgg::Rate) => snapshot.rate(),
        (SeriesSnapshot::Rate { total, .. }, ThresholdAgg::Count) => Some(*total as f64),

        (SeriesSnapshot::Trend(t), ThresholdAgg::Avg) => t.avg(),
        (SeriesSnapshot::Trend(t), ThresholdAgg::Med) => t.median(),
        (SeriesSnapshot::Trend(t), ThresholdAgg::Min) => t.min,
        (SeriesSnapshot::Trend(t), ThresholdAgg::Max) => t.max,
        (SeriesSnapshot::Trend(t), ThresholdAgg::Count) => Some(t.count as f64),
        (SeriesSnapshot::Trend(t), ThresholdAgg::P(p)) => t.percentile(p),

        // Aggregation does not apply to this metric kind.
        (_, _) => None,
    }
}

fn snapshot_for(store: &Store, selector: &MetricSelector) -> Option<SeriesSnapshot> {
    if selector.tags.is_empty() {
        store.snapshot(&selector.name)
    } else {
        store.snapshot_with_tags(&selector.name, &selector.tags)
    }
}

/// Final evaluation: every rule gets an outcome; a metric with zero
/// observations makes its rule `Unresolvable`.
pub fn evaluate_final(store: &Store, rules: &[CompiledThreshold]) -> Vec<ThresholdOutcome> {
    rules
        .iter()
        .map(|rule| {
            let snapshot = snapshot_for(store, &rule.selector);
            let observed = snapshot.as_ref().and_then(|s| observed_value(s, rule.expr.agg));

            let status = match (&snapshot, observed) {
                (None, _) => ThresholdStatus::Unresolvable,
                (Some(s), _) if s.samples() == 0 => ThresholdStatus::Unresolvable,
                (_, None) => ThresholdStatus::Unresolvable,
                (_, Some(v)) => {
                    if compare(v, rule.expr.op, rule.expr.value) {
                        ThresholdStatus::Passed
                    } else {
                        ThresholdStatus::Failed
                    }
                }
            };

            ThresholdOutcome {
                metric: rule.selector.to_string(),
                expression: rule.expression.clone(),
                abort_on_fail: rule.abort_on_fail,
                status,
                observed,
            }
        })
        .collect()
}

/// Intermediate check: only abort-on-fail rules are consulted, and only
/// once their metric has observations. Returns the first violation.
pub fn first_abort_violation(
    store: &Store,
    rules: &[CompiledThreshold],
) -> Option<ThresholdOutcome> {
    for rule in rules.iter().filter(|r| r.abort_on_fail) {
        let Some(snapshot) = snapshot_for(store, &rule.selector) else {
            continue;
        };
        if snapshot.samples() == 0 {
            continue;
        }
        let Some(observed) = observed_value(&snapshot, rule.expr.agg) else {
            continue;
        };

        if !compare(observed, rule.expr.op, rule.expr.value) {
            return Some(ThresholdOutcome {
                metric: rule.selector.to_string(),
                expression: rule.expression.clone(),
                abort_on_fail: true,
                status: ThresholdStatus::Failed,
                observed: Some(observed),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampr_metrics::MetricKind;
    use std::sync::Arc;

    fn rule(metric: &str, expression: &str, abort_on_fail: bool) -> ThresholdRule {
        ThresholdRule {
            metric: metric.to_string(),
            expression: expression.to_string(),
            abort_on_fail,
        }
    }

    #[test]
    fn parse_selector_without_tags() {
        let sel = parse_selector("http_req_duration").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(sel.name, "http_req_duration");
        assert!(sel.tags.is_empty());
    }

    #[test]
    fn parse_selector_with_tags_tolerates_whitespace() {
        let sel = parse_selector("group_duration{ group: batch }").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(sel.name, "group_duration");
        assert_eq!(sel.tags.get("group"), Some("batch"));
        assert_eq!(sel.to_string(), "group_duration{group:batch}");
    }

    #[test]
    fn parse_selector_rejects_malformed_tags() {
        assert!(parse_selector("m{group}").is_err());
        assert!(parse_selector("m{group:batch").is_err());
        assert!(parse_selector("{group:batch}").is_err());
    }

    #[test]
    fn parse_expr_accepts_full_vocabulary() {
        let e = parse_expr("  p(99.9)  <  2000 ").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(e.agg, ThresholdAgg::P(99.9));
        assert_eq!(e.op, ThresholdOp::Lt);
        assert_eq!(e.value, 2000.0);

        assert!(parse_expr("rate>0.95").is_ok());
        assert!(parse_expr("avg<=200").is_ok());
        assert!(parse_expr("med<150").is_ok());
        assert!(parse_expr("min>=100").is_ok());
        assert!(parse_expr("value<4000").is_ok());
        assert!(parse_expr("count<100").is_ok());
    }

    #[test]
    fn parse_expr_rejects_bad_input() {
        assert!(parse_expr("").is_err());
        assert!(parse_expr("avg 200").is_err());
        assert!(parse_expr("p(0)<1").is_err());
        assert!(parse_expr("p(101)<1").is_err());
        assert!(parse_expr("weird<1").is_err());
        assert!(parse_expr("avg<abc").is_err());
    }

    #[test]
    fn counter_count_threshold_boundary() {
        let rules = compile_thresholds(&[rule("errors", "count<100", false)])
            .unwrap_or_else(|e| panic!("{e}"));

        let store = Arc::new(Store::default());
        let errors = store
            .handle("errors", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));

        for _ in 0..99 {
            errors.add(1.0);
        }
        let outcomes = evaluate_final(&store, &rules);
        assert_eq!(outcomes[0].status, ThresholdStatus::Passed);
        assert_eq!(outcomes[0].observed, Some(99.0));

        errors.add(1.0);
        let outcomes = evaluate_final(&store, &rules);
        assert_eq!(outcomes[0].status, ThresholdStatus::Failed);
        assert_eq!(outcomes[0].observed, Some(100.0));
    }

    #[test]
    fn zero_observations_are_unresolvable_not_passing() {
        let rules = compile_thresholds(&[
            rule("never_recorded", "avg<10", false),
            rule("empty_rate", "rate>0.5", false),
        ])
        .unwrap_or_else(|e| panic!("{e}"));

        let store = Arc::new(Store::default());
        // `empty_rate` exists but has no observations.
        store
            .declare("empty_rate", MetricKind::Rate)
            .unwrap_or_else(|e| panic!("{e}"));
        let _ = store.handle("empty_rate", MetricKind::Rate);

        let outcomes = evaluate_final(&store, &rules);
        assert!(outcomes.iter().all(|o| o.status == ThresholdStatus::Unresolvable));
        assert!(outcomes.iter().all(|o| !o.passed()));
    }

    #[test]
    fn tagged_selector_addresses_tagged_series() {
        let rules = compile_thresholds(&[rule("group_duration{group:batch}", "avg<150", false)])
            .unwrap_or_else(|e| panic!("{e}"));

        let store = Arc::new(Store::default());
        let h = store
            .handle("group_duration", MetricKind::Trend)
            .unwrap_or_else(|e| panic!("{e}"));

        // Base-only observation: the tagged series does not exist yet.
        h.add(1000.0);
        let outcomes = evaluate_final(&store, &rules);
        assert_eq!(outcomes[0].status, ThresholdStatus::Unresolvable);

        h.add_with_tags(100.0, &TagSet::from_pairs(&[("group", "batch")]));
        let outcomes = evaluate_final(&store, &rules);
        assert_eq!(outcomes[0].status, ThresholdStatus::Passed);
        assert_eq!(outcomes[0].observed, Some(100.0));
    }

    #[test]
    fn abort_check_skips_unobserved_metrics() {
        let rules = compile_thresholds(&[
            rule("rtt", "avg<100", true),
            rule("other", "count<5", false),
        ])
        .unwrap_or_else(|e| panic!("{e}"));

        let store = Arc::new(Store::default());
        assert!(first_abort_violation(&store, &rules).is_none());

        let rtt = store
            .handle("rtt", MetricKind::Trend)
            .unwrap_or_else(|e| panic!("{e}"));
        rtt.add(50.0);
        assert!(first_abort_violation(&store, &rules).is_none());

        rtt.add(500.0);
        let violation = first_abort_violation(&store, &rules)
            .unwrap_or_else(|| panic!("expected violation"));
        assert_eq!(violation.metric, "rtt");
        assert!(violation.abort_on_fail);
    }

    #[test]
    fn non_abort_rules_never_trigger_early_halt() {
        let rules = compile_thresholds(&[rule("errors", "count<1", false)])
            .unwrap_or_else(|e| panic!("{e}"));

        let store = Arc::new(Store::default());
        let errors = store
            .handle("errors", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        errors.add(10.0);

        assert!(first_abort_violation(&store, &rules).is_none());
        let outcomes = evaluate_final(&store, &rules);
        assert_eq!(outcomes[0].status, ThresholdStatus::Failed);
    }
}
