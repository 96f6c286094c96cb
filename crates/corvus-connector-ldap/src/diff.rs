//! Streaming change detection
//!
//! Computes a stable content hash over the caller-designated significant
//! attributes of each entry and classifies it against the prior-hash
//! index loaded at run start. Only new and changed entries produce
//! persistence instructions; unchanged entries are counted and dropped.

use sha2::{Digest, Sha256};
use tracing::debug;

use corvus_connector::entry::DirectoryEntry;
use corvus_connector::traits::{ChangeRecord, ContentHash, HashIndex};
use corvus_connector::types::ChangeKind;

use crate::stats::HarvestRunStats;

/// Compute the content hash of an entry over its significant attributes.
///
/// The encoding is canonical: attribute names are processed in sorted
/// order, values within a multi-valued attribute are sorted, and names
/// and values are delimited with control bytes that cannot appear in
/// directory strings. Attribute ordering on the wire therefore never
/// affects the digest, and attributes outside the significant set never
/// contribute to it. Absent attributes contribute nothing, so adding an
/// absent field to the significant set does not change existing hashes.
pub fn content_hash(entry: &DirectoryEntry, significant: &[String]) -> ContentHash {
    let mut names: Vec<&str> = significant.iter().map(String::as_str).collect();
    names.sort_unstable();
    names.dedup();

    let mut hasher = Sha256::new();
    for name in names {
        if let Some(value) = entry.get(name) {
            let mut values: Vec<&str> = value.iter().collect();
            values.sort_unstable();

            hasher.update(name.as_bytes());
            hasher.update([0x00]);
            for v in values {
                hasher.update(v.as_bytes());
                hasher.update([0x1f]);
            }
            hasher.update([0x1e]);
        }
    }

    ContentHash::new(hex::encode(hasher.finalize()))
}

/// Classifies entries chunk-by-chunk against a fixed prior-hash index.
///
/// The index is loaded once before streaming begins and is read-only for
/// the duration of the run; it is the only structure here that scales
/// with total record count.
pub struct ChangeDetector {
    index: HashIndex,
    significant: Vec<String>,
}

impl ChangeDetector {
    /// Create a detector over a prior-hash index.
    pub fn new(index: HashIndex, significant: Vec<String>) -> Self {
        Self { index, significant }
    }

    /// Number of identifiers in the prior-hash index.
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Classify a single entry.
    pub fn classify(&self, entry: &DirectoryEntry) -> (ChangeKind, ContentHash, Option<ContentHash>) {
        let hash = content_hash(entry, &self.significant);
        match self.index.get(entry.id()) {
            None => (ChangeKind::New, hash, None),
            Some(prior) if *prior == hash => (ChangeKind::Unchanged, hash, None),
            Some(prior) => (ChangeKind::Changed, hash, Some(prior.clone())),
        }
    }

    /// Diff one chunk of entries, consuming it.
    ///
    /// Each entry is processed independently: a malformed entry is
    /// counted as an error and processing continues with the next one.
    /// Returns the persistence instructions for the chunk; records are
    /// emitted for new and changed entries only.
    pub fn diff_chunk(
        &self,
        entries: Vec<DirectoryEntry>,
        stats: &mut HarvestRunStats,
    ) -> Vec<ChangeRecord> {
        let mut records = Vec::new();

        for entry in entries {
            stats.record_seen();

            if entry.id().is_empty() {
                let label = entry.get_str("dn").unwrap_or("<unknown>").to_string();
                stats.record_error(&label, "entry is missing the id attribute", "identity");
                continue;
            }

            let (kind, hash, prior) = self.classify(&entry);
            stats.record_classified(kind);
            match kind {
                ChangeKind::New => {
                    records.push(ChangeRecord::created(entry.id().to_string(), hash, entry));
                }
                ChangeKind::Changed => {
                    // classify always supplies the prior hash for Changed
                    let prior = match prior {
                        Some(prior) => prior,
                        None => continue,
                    };
                    records.push(ChangeRecord::changed(
                        entry.id().to_string(),
                        hash,
                        prior,
                        entry,
                    ));
                }
                ChangeKind::Unchanged => {}
            }
        }

        debug!(
            records = records.len(),
            index = self.index.len(),
            "chunk diffed"
        );

        records
    }
}
