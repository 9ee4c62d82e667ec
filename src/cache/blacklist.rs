use crate::types::query::QueryFingerprint;
use std::collections::HashSet;

/// Fingerprints of queries known to return no data.
///
/// Stored durably as one fingerprint per line; blank lines are ignored when loading.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    entries: HashSet<QueryFingerprint>,
}

impl Blacklist {
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let entries = lines
            .into_iter()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(QueryFingerprint::from_raw)
            .collect();
        Self { entries }
    }

    pub fn contains(&self, fingerprint: &QueryFingerprint) -> bool {
        self.entries.contains(fingerprint)
    }

    /// Returns `true` when the fingerprint was not listed before.
    pub fn insert(&mut self, fingerprint: QueryFingerprint) -> bool {
        self.entries.insert(fingerprint)
    }

    pub fn remove(&mut self, fingerprint: &QueryFingerprint) -> bool {
        self.entries.remove(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
