use ahash::RandomState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

use crate::metric::{MetricKind, Series, SeriesSnapshot};
use crate::tags::TagSet;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("metric `{name}` is declared as {declared}, cannot use it as {requested}")]
    KindConflict {
        name: String,
        declared: MetricKind,
        requested: MetricKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    name: Arc<str>,
    tags: TagSet,
}

/// Final aggregate of one series, paired with its identity for reporting.
#[derive(Debug, Clone)]
pub struct SeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub values: SeriesSnapshot,
}

/// Thread-safe metric registry and aggregator.
///
/// A metric name is bound to exactly one kind for the lifetime of the store;
/// observations flow into the series for their exact tag set and, when
/// tagged, into the untagged base series of the same name as well.
#[derive(Debug, Default)]
pub struct Store {
    kinds: DashMap<Arc<str>, MetricKind, RandomState>,
    series: DashMap<SeriesKey, Arc<Series>, RandomState>,
}

impl Store {
    /// Bind `name` to `kind`. Declaring an already-bound name with the same
    /// kind is a no-op; a different kind is a configuration error.
    pub fn declare(&self, name: &str, kind: MetricKind) -> Result<(), Error> {
        self.bind_kind(name, kind).map(|_| ())
    }

    fn bind_kind(&self, name: &str, kind: MetricKind) -> Result<Arc<str>, Error> {
        if let Some(existing) = self.kinds.get(name) {
            let declared = *existing.value();
            let key = existing.key().clone();
            drop(existing);
            if declared != kind {
                return Err(Error::KindConflict {
                    name: name.to_string(),
                    declared,
                    requested: kind,
                });
            }
            return Ok(key);
        }

        match self.kinds.entry(Arc::from(name)) {
            Entry::Occupied(e) => {
                let declared = *e.get();
                if declared != kind {
                    return Err(Error::KindConflict {
                        name: name.to_string(),
                        declared,
                        requested: kind,
                    });
                }
                Ok(e.key().clone())
            }
            Entry::Vacant(v) => {
                let key = v.key().clone();
                v.insert(kind);
                Ok(key)
            }
        }
    }

    /// Get or create the series for `name` + `tags`, validating the kind
    /// binding for the name.
    pub fn series(&self, name: &str, kind: MetricKind, tags: TagSet) -> Result<Arc<Series>, Error> {
        let name = self.bind_kind(name, kind)?;
        Ok(self.series_bound(name, kind, tags))
    }

    // Series lookup once the name->kind binding is already established.
    fn series_bound(&self, name: Arc<str>, kind: MetricKind, tags: TagSet) -> Arc<Series> {
        let key = SeriesKey {
            name: name.clone(),
            tags,
        };
        if let Some(existing) = self.series.get(&key) {
            return existing.value().clone();
        }

        let tags = key.tags.clone();
        self.series
            .entry(key)
            .or_insert_with(|| Arc::new(Series::new(kind, name, tags)))
            .value()
            .clone()
    }

    /// Writer handle for the untagged base series of `name`.
    pub fn handle(self: &Arc<Self>, name: &str, kind: MetricKind) -> Result<MetricHandle, Error> {
        let base = self.series(name, kind, TagSet::default())?;
        Ok(MetricHandle {
            store: self.clone(),
            base,
        })
    }

    /// Record one observation: into the base series always, and into the
    /// tagged series when `tags` is non-empty.
    pub fn record(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        tags: &TagSet,
    ) -> Result<(), Error> {
        let bound = self.bind_kind(name, kind)?;
        self.series_bound(bound.clone(), kind, TagSet::default())
            .add(value);
        if !tags.is_empty() {
            self.series_bound(bound, kind, tags.clone()).add(value);
        }
        Ok(())
    }

    /// Boolean variant of [`Store::record`].
    pub fn record_bool(
        &self,
        name: &str,
        kind: MetricKind,
        value: bool,
        tags: &TagSet,
    ) -> Result<(), Error> {
        let bound = self.bind_kind(name, kind)?;
        self.series_bound(bound.clone(), kind, TagSet::default())
            .add_bool(value);
        if !tags.is_empty() {
            self.series_bound(bound, kind, tags.clone()).add_bool(value);
        }
        Ok(())
    }

    /// Aggregate of the untagged base series for `name`.
    pub fn snapshot(&self, name: &str) -> Option<SeriesSnapshot> {
        self.snapshot_with_tags(name, &TagSet::default())
    }

    /// Aggregate of the series for `name` + exactly `tags`.
    pub fn snapshot_with_tags(&self, name: &str, tags: &TagSet) -> Option<SeriesSnapshot> {
        let name = self.kinds.get(name)?.key().clone();
        let key = SeriesKey {
            name,
            tags: tags.clone(),
        };
        self.series.get(&key).map(|s| s.snapshot())
    }

    /// All series aggregates, sorted by name then tags for stable reports.
    pub fn summarize(&self) -> Vec<SeriesSummary> {
        let mut out: Vec<SeriesSummary> = self
            .series
            .iter()
            .map(|entry| {
                let s = entry.value();
                SeriesSummary {
                    name: s.name().to_string(),
                    kind: s.kind(),
                    tags: s.tags().to_vec(),
                    values: s.snapshot(),
                }
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }
}

/// Public handle for writing one metric. Tagged writes feed both the tagged
/// series and the base series.
#[derive(Debug, Clone)]
pub struct MetricHandle {
    store: Arc<Store>,
    base: Arc<Series>,
}

impl MetricHandle {
    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn kind(&self) -> MetricKind {
        self.base.kind()
    }

    #[inline]
    pub fn add(&self, value: f64) {
        self.base.add(value);
    }

    pub fn add_with_tags(&self, value: f64, tags: &TagSet) {
        self.base.add(value);
        if tags.is_empty() {
            return;
        }
        // The name is already bound to this handle's kind, so the lookup
        // cannot conflict.
        self.store
            .series_bound(Arc::from(self.base.name()), self.base.kind(), tags.clone())
            .add(value);
    }

    #[inline]
    pub fn add_bool(&self, value: bool) {
        self.base.add_bool(value);
    }

    pub fn add_bool_with_tags(&self, value: bool, tags: &TagSet) {
        self.base.add_bool(value);
        if tags.is_empty() {
            return;
        }
        self.store
            .series_bound(Arc::from(self.base.name()), self.base.kind(), tags.clone())
            .add_bool(value);
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        self.base.snapshot()
    }
}
