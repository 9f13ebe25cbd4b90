use smallvec::SmallVec;
use std::sync::Arc;

/// Normalized tag set attached to a metric series.
///
/// Tags are a `key -> value` mapping: pairs are sorted by key and a
/// duplicate key keeps the last value, so two sets built from the same
/// logical mapping always compare (and hash) equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // SmallVec to avoid allocation for small tag sets (usually < 4)
    tags: SmallVec<[(Arc<str>, Arc<str>); 4]>,
}

impl TagSet {
    pub fn from_pairs<K, V>(pairs: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if pairs.is_empty() {
            return Self::default();
        }

        let mut tags: SmallVec<[(Arc<str>, Arc<str>); 4]> = pairs
            .iter()
            .map(|(k, v)| (Arc::<str>::from(k.as_ref()), Arc::<str>::from(v.as_ref())))
            .collect();
        tags.sort_by(|a, b| a.0.cmp(&b.0));

        // Mapping semantics: last write to a key wins.
        let mut deduped: SmallVec<[(Arc<str>, Arc<str>); 4]> = SmallVec::new();
        for (k, v) in tags {
            match deduped.last_mut() {
                Some(last) if last.0 == k => last.1 = v,
                _ => deduped.push((k, v)),
            }
        }

        Self { tags: deduped }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.tags.iter().map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .binary_search_by(|(k, _)| k.as_ref().cmp(key))
            .ok()
            .map(|idx| self.tags[idx].1.as_ref())
    }

    pub fn to_vec(&self) -> Vec<(String, String)> {
        self.tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
