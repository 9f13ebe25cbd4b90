use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

/// Trend observations are scaled to 1/1000 units before entering the
/// histogram, so millisecond inputs keep microsecond resolution.
const TREND_SCALE: f64 = 1000.0;

fn new_trend_histogram() -> Histogram<u64> {
    // Upper bound: 1 hour in scaled units, 3 significant figures.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create trend histogram: {err}"),
    }
}

#[derive(Debug)]
struct CounterAgg {
    // f64 bits, updated with a CAS loop so concurrent adds never lose updates.
    bits: AtomicU64,
    samples: AtomicU64,
}

impl CounterAgg {
    fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
            samples: AtomicU64::new(0),
        }
    }

    fn add(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.samples.fetch_add(1, Ordering::Relaxed);

        let mut cur = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(cur) + value).to_bits();
            match self
                .bits
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(v) => cur = v,
            }
        }
    }

    fn total(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
struct GaugeAgg {
    // Last writer wins; ties are broken by arrival order at this lock,
    // never by wall clock.
    value: Mutex<Option<f64>>,
}

impl GaugeAgg {
    fn set(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        *self.value.lock() = Some(value);
    }

    fn get(&self) -> Option<f64> {
        *self.value.lock()
    }
}

#[derive(Debug, Default)]
struct RateAgg {
    total: AtomicU64,
    trues: AtomicU64,
}

impl RateAgg {
    fn add(&self, value: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if value {
            self.trues.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug)]
struct TrendAgg {
    count: AtomicU64,
    sum_scaled: AtomicU64,
    min_scaled: AtomicU64,
    max_scaled: AtomicU64,
    hist: Mutex<Histogram<u64>>,
}

impl TrendAgg {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_scaled: AtomicU64::new(0),
            min_scaled: AtomicU64::new(u64::MAX),
            max_scaled: AtomicU64::new(0),
            hist: Mutex::new(new_trend_histogram()),
        }
    }

    fn record(&self, value: f64) {
        if !value.is_finite() || value < 0.0 {
            return;
        }
        let scaled = (value * TREND_SCALE).round() as u64;

        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_scaled.fetch_add(scaled, Ordering::Relaxed);

        let mut cur = self.min_scaled.load(Ordering::Relaxed);
        while scaled < cur {
            match self.min_scaled.compare_exchange_weak(
                cur,
                scaled,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(v) => cur = v,
            }
        }

        let mut cur = self.max_scaled.load(Ordering::Relaxed);
        while scaled > cur {
            match self.max_scaled.compare_exchange_weak(
                cur,
                scaled,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(v) => cur = v,
            }
        }

        let mut h = self.hist.lock();
        let _ = h.record(scaled);
    }

    fn snapshot(&self) -> TrendSnapshot {
        // Copy the histogram under the lock; everything after works on the copy.
        let hist = self.hist.lock().clone();

        let count = self.count.load(Ordering::Relaxed);
        let sum = self.sum_scaled.load(Ordering::Relaxed) as f64 / TREND_SCALE;
        let (min, max) = if count == 0 {
            (None, None)
        } else {
            (
                Some(self.min_scaled.load(Ordering::Relaxed) as f64 / TREND_SCALE),
                Some(self.max_scaled.load(Ordering::Relaxed) as f64 / TREND_SCALE),
            )
        };

        TrendSnapshot {
            count,
            sum,
            min,
            max,
            hist,
        }
    }
}

/// Frozen view of a Trend series. Percentile queries are answered from the
/// copied histogram, so two snapshots taken without intervening records
/// return identical values.
#[derive(Debug, Clone)]
pub struct TrendSnapshot {
    pub count: u64,
    pub sum: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    hist: Histogram<u64>,
}

impl TrendSnapshot {
    pub fn avg(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn median(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    /// Value at percentile `p` for `p` in `[0, 100]`; `None` when the series
    /// is empty or `p` is out of range.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.count == 0 || !(0.0..=100.0).contains(&p) {
            return None;
        }
        Some(self.hist.value_at_quantile(p / 100.0) as f64 / TREND_SCALE)
    }
}

/// Read-consistent aggregate of one series, computed under its kind's
/// semantics.
#[derive(Debug, Clone)]
pub enum SeriesSnapshot {
    Counter { total: f64, samples: u64 },
    Gauge { value: Option<f64> },
    Rate { total: u64, trues: u64 },
    Trend(TrendSnapshot),
}

impl SeriesSnapshot {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter { .. } => MetricKind::Counter,
            Self::Gauge { .. } => MetricKind::Gauge,
            Self::Rate { .. } => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }

    /// Number of observations behind this aggregate.
    pub fn samples(&self) -> u64 {
        match self {
            Self::Counter { samples, .. } => *samples,
            Self::Gauge { value } => u64::from(value.is_some()),
            Self::Rate { total, .. } => *total,
            Self::Trend(t) => t.count,
        }
    }

    /// Fraction of truthy observations; `None` with zero observations,
    /// never a division by zero.
    pub fn rate(&self) -> Option<f64> {
        match self {
            Self::Rate { total, trues } => {
                (*total > 0).then(|| *trues as f64 / *total as f64)
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Agg {
    Counter(CounterAgg),
    Gauge(GaugeAgg),
    Rate(RateAgg),
    Trend(TrendAgg),
}

/// One metric series: a name plus a normalized tag set, aggregating under
/// the kind the name is bound to.
#[derive(Debug)]
pub struct Series {
    name: Arc<str>,
    tags: TagSet,
    agg: Agg,
}

impl Series {
    pub(crate) fn new(kind: MetricKind, name: Arc<str>, tags: TagSet) -> Self {
        let agg = match kind {
            MetricKind::Counter => Agg::Counter(CounterAgg::new()),
            MetricKind::Gauge => Agg::Gauge(GaugeAgg::default()),
            MetricKind::Rate => Agg::Rate(RateAgg::default()),
            MetricKind::Trend => Agg::Trend(TrendAgg::new()),
        };
        Self { name, tags, agg }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn kind(&self) -> MetricKind {
        match self.agg {
            Agg::Counter(_) => MetricKind::Counter,
            Agg::Gauge(_) => MetricKind::Gauge,
            Agg::Rate(_) => MetricKind::Rate,
            Agg::Trend(_) => MetricKind::Trend,
        }
    }

    /// Record a numeric observation under the series' kind semantics.
    /// A Rate series treats any non-zero value as truthy.
    pub fn add(&self, value: f64) {
        match &self.agg {
            Agg::Counter(c) => c.add(value),
            Agg::Gauge(g) => g.set(value),
            Agg::Rate(r) => r.add(value != 0.0),
            Agg::Trend(t) => t.record(value),
        }
    }

    /// Record a boolean observation: Rate counts it directly, numeric kinds
    /// coerce to 1/0.
    pub fn add_bool(&self, value: bool) {
        match &self.agg {
            Agg::Rate(r) => r.add(value),
            _ => self.add(if value { 1.0 } else { 0.0 }),
        }
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        match &self.agg {
            Agg::Counter(c) => SeriesSnapshot::Counter {
                total: c.total(),
                samples: c.samples.load(Ordering::Relaxed),
            },
            Agg::Gauge(g) => SeriesSnapshot::Gauge { value: g.get() },
            Agg::Rate(r) => SeriesSnapshot::Rate {
                total: r.total.load(Ordering::Relaxed),
                trues: r.trues.load(Ordering::Relaxed),
            },
            Agg::Trend(t) => SeriesSnapshot::Trend(t.snapshot()),
        }
    }
}
