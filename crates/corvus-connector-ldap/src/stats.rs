//! Harvest run statistics
//!
//! Per-run accumulator for classification counts, per-entry failures and
//! strategy downgrades. Serialized to JSON for storage by the
//! run-tracking collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use corvus_connector::types::{ChangeKind, PagingStrategy, RunStatus, TerminalReason};

use crate::paging::StrategyDowngrade;

/// Cap on retained per-entry error details; the error counter keeps
/// counting past it.
const MAX_ERROR_DETAILS: usize = 100;

/// Error details for a single entry that failed during a harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryErrorDetail {
    /// Identifier or DN of the failed entry.
    pub entity: String,
    /// Error message.
    pub error: String,
    /// Phase where the failure occurred (e.g. "identity", "hashing").
    pub phase: String,
}

/// Statistics for one harvest run.
///
/// Created at harvest start, finalized exactly once at completion or
/// abort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestRunStats {
    /// Entries delivered by the chunk stream.
    pub entries_seen: usize,
    /// Entries classified as new.
    pub created: usize,
    /// Entries classified as changed.
    pub changed: usize,
    /// Entries classified as unchanged.
    pub unchanged: usize,
    /// Entries that failed individually.
    pub errors: usize,
    /// Entries skipped because they were re-delivered after a strategy
    /// downgrade restarted enumeration.
    pub skipped_duplicates: usize,
    /// Chunks delivered.
    pub chunks_fetched: u32,
    /// Largest chunk held at any point.
    pub peak_chunk_entries: usize,
    /// Whether the prior-hash index was bypassed.
    pub full_resync: bool,
    /// Strategy in use when the run ended.
    pub strategy: Option<PagingStrategy>,
    /// Strategy downgrades that occurred, in order.
    pub downgrades: Vec<StrategyDowngrade>,
    /// Per-entry error details, capped at a fixed count.
    pub error_details: Vec<EntryErrorDetail>,
    /// Run start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Run end time.
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal status.
    pub status: Option<RunStatus>,
    /// Terminal reason code.
    pub reason: Option<TerminalReason>,
}

impl HarvestRunStats {
    /// Create a stats accumulator stamped with the current time.
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Count an entry delivered by the stream.
    pub fn record_seen(&mut self) {
        self.entries_seen += 1;
    }

    /// Count a classified entry.
    pub fn record_classified(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::New => self.created += 1,
            ChangeKind::Changed => self.changed += 1,
            ChangeKind::Unchanged => self.unchanged += 1,
        }
    }

    /// Count a failed entry with its details.
    pub fn record_error(&mut self, entity: &str, error: &str, phase: &str) {
        self.errors += 1;
        warn!(entity = %entity, phase = %phase, error = %error, "harvest entry failed");
        if self.error_details.len() < MAX_ERROR_DETAILS {
            self.error_details.push(EntryErrorDetail {
                entity: entity.to_string(),
                error: error.to_string(),
                phase: phase.to_string(),
            });
        }
    }

    /// Count an entry skipped as a post-downgrade re-delivery.
    pub fn record_duplicate(&mut self) {
        self.skipped_duplicates += 1;
    }

    /// Count a delivered chunk and track the peak chunk size.
    pub fn record_chunk(&mut self, entries: usize) {
        self.chunks_fetched += 1;
        self.peak_chunk_entries = self.peak_chunk_entries.max(entries);
    }

    /// Whether any entries were processed successfully.
    pub fn has_successes(&self) -> bool {
        self.created + self.changed + self.unchanged > 0
    }

    /// Finalize with the terminal status and reason. Idempotent fields
    /// are set exactly once by the runner.
    pub fn finalize(&mut self, status: RunStatus, reason: TerminalReason) {
        self.finished_at = Some(Utc::now());
        self.status = Some(status);
        self.reason = Some(reason);
    }

    /// Convert to a JSON value for run-tracking storage.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_counters() {
        let mut stats = HarvestRunStats::new();
        stats.record_seen();
        stats.record_classified(ChangeKind::New);
        stats.record_seen();
        stats.record_classified(ChangeKind::Changed);
        stats.record_seen();
        stats.record_classified(ChangeKind::Unchanged);
        stats.record_seen();
        stats.record_error("cn=bad", "boom", "identity");

        assert_eq!(stats.entries_seen, 4);
        assert_eq!(stats.created, 1);
        assert_eq!(stats.changed, 1);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.errors, 1);
        assert!(stats.has_successes());
    }

    #[test]
    fn test_error_details_capped() {
        let mut stats = HarvestRunStats::new();
        for i in 0..(MAX_ERROR_DETAILS + 25) {
            stats.record_error(&format!("cn=bad{i}"), "boom", "identity");
        }
        assert_eq!(stats.errors, MAX_ERROR_DETAILS + 25);
        assert_eq!(stats.error_details.len(), MAX_ERROR_DETAILS);
    }

    #[test]
    fn test_chunk_peak_tracking() {
        let mut stats = HarvestRunStats::new();
        stats.record_chunk(10);
        stats.record_chunk(42);
        stats.record_chunk(7);
        assert_eq!(stats.chunks_fetched, 3);
        assert_eq!(stats.peak_chunk_entries, 42);
    }

    #[test]
    fn test_finalize_stamps_outcome() {
        let mut stats = HarvestRunStats::new();
        stats.finalize(RunStatus::Failed, TerminalReason::StalledCursor);
        assert_eq!(stats.status, Some(RunStatus::Failed));
        assert_eq!(stats.reason, Some(TerminalReason::StalledCursor));
        assert!(stats.finished_at.is_some());
    }

    #[test]
    fn test_json_serialization() {
        let mut stats = HarvestRunStats::new();
        stats.entries_seen = 100;
        stats.created = 10;
        stats.unchanged = 90;
        stats.strategy = Some(PagingStrategy::RangeChunked);
        stats.downgrades.push(StrategyDowngrade {
            from: PagingStrategy::CookieContinuation,
            to: PagingStrategy::RangeChunked,
            after_chunks: 4,
        });
        stats.finalize(RunStatus::Completed, TerminalReason::SizeLimitWorkaround);

        let json = stats.to_json();
        assert_eq!(json["entries_seen"], 100);
        assert_eq!(json["strategy"], "range_chunked");
        assert_eq!(json["reason"], "size_limit_workaround");
        assert_eq!(json["downgrades"][0]["after_chunks"], 4);
    }

    #[test]
    fn test_no_successes_when_empty() {
        let stats = HarvestRunStats::new();
        assert!(!stats.has_successes());
    }
}
