use crate::db::FileRecord;
use std::collections::HashMap;

/// Result of feeding one hashed record to a [`DuplicateIndex`].
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// First record seen with this hash in the pass; it is kept.
    Canonical,
    /// Same hash as an earlier record.
    Duplicate { canonical: Box<FileRecord> },
}

impl Observation {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Observation::Duplicate { .. })
    }
}

/// Scan-scoped map from content hash to the canonical record.
///
/// Records must arrive in the pass's fixed order; the first one seen for a
/// hash wins every later comparison. Never persisted.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    canonical: HashMap<String, FileRecord>,
}

impl DuplicateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records without a hash are ignored and reported as canonical.
    pub fn observe(&mut self, record: &FileRecord) -> Observation {
        let Some(hash) = record.content_hash.as_ref() else {
            return Observation::Canonical;
        };

        match self.canonical.get(hash) {
            Some(existing) => Observation::Duplicate {
                canonical: Box::new(existing.clone()),
            },
            None => {
                self.canonical.insert(hash.clone(), record.clone());
                Observation::Canonical
            }
        }
    }

    pub fn unique_hashes(&self) -> usize {
        self.canonical.len()
    }
}
