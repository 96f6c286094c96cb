//! Collaborator traits
//!
//! Capability seams between the harvesting engine and the outside world:
//! the live directory connection, the persistence layer for change
//! records, and run tracking. Everything here is an injected interface so
//! the engine can be exercised with fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::entry::DirectoryEntry;
use crate::error::HarvestResult;
use crate::ids::HarvestRunId;
use crate::types::{ChangeKind, RunStatus, TerminalReason};

/// Paging mechanics for one search round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageControl {
    /// Use the protocol's paged-results control, resuming from `cookie`
    /// when present. `critical` asks the server to reject the search
    /// outright if it cannot honor the control.
    Paged {
        size: u32,
        cookie: Option<Vec<u8>>,
        critical: bool,
    },
    /// Plain search with a hard size limit and no continuation state.
    Bounded { size: u32 },
}

/// One bounded search round trip against the directory.
///
/// The filter is final: any range bound has already been composed into it
/// by the caller. Sessions never rewrite queries.
#[derive(Debug, Clone)]
pub struct ChunkQuery {
    /// Search base DN.
    pub base: String,
    /// Complete filter expression.
    pub filter: String,
    /// Attributes to request.
    pub attributes: Vec<String>,
    /// Attribute whose value becomes [`DirectoryEntry::id`].
    pub id_attribute: String,
    /// Paging mechanics for this round trip.
    pub page: PageControl,
}

/// Entries returned by one search round trip.
#[derive(Debug, Clone, Default)]
pub struct ChunkPage {
    /// Entries in server return order.
    pub entries: Vec<DirectoryEntry>,
    /// Continuation cookie for the next page. `None` means the server
    /// reported no further pages. Always `None` for bounded searches.
    pub cookie: Option<Vec<u8>>,
}

impl ChunkPage {
    /// Create a page with no continuation.
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self {
            entries,
            cookie: None,
        }
    }

    /// Attach a continuation cookie.
    #[must_use]
    pub fn with_cookie(mut self, cookie: Vec<u8>) -> Self {
        self.cookie = Some(cookie);
        self
    }
}

/// A live directory-protocol connection.
///
/// Sessions are single-flight: one search at a time, driven sequentially
/// by the chunk stream. `reconnect` tears down and re-establishes the
/// underlying transport so the current chunk can be retried.
#[async_trait]
pub trait DirectorySession: Send {
    /// Execute one bounded search round trip.
    async fn execute(&mut self, query: &ChunkQuery) -> HarvestResult<ChunkPage>;

    /// Drop the current connection and establish a fresh one.
    async fn reconnect(&mut self) -> HarvestResult<()>;

    /// Verify the connection and search base with a lightweight probe.
    async fn test_connection(&mut self) -> HarvestResult<()>;
}

/// A stable digest over the significant attributes of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wrap an already-computed hex digest.
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Get the hex digest string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ContentHash {
    fn from(digest: String) -> Self {
        Self(digest)
    }
}

/// Identifier → most recent content hash, loaded once per run.
pub type HashIndex = HashMap<String, ContentHash>;

/// A persistence instruction for one entry whose state is worth writing.
///
/// Records are append-only: a newer record supersedes older ones for the
/// same identifier, nothing is ever overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Unique identifier of the entry.
    pub entity_id: String,
    /// Content hash computed this run.
    pub hash: ContentHash,
    /// Classification against the prior-hash index.
    pub kind: ChangeKind,
    /// The superseded hash, present only for [`ChangeKind::Changed`].
    pub prior_hash: Option<ContentHash>,
    /// Snapshot of the entry's harvested attributes.
    pub attributes: DirectoryEntry,
}

impl ChangeRecord {
    /// Record for an entry with no prior state.
    pub fn created(entity_id: impl Into<String>, hash: ContentHash, attributes: DirectoryEntry) -> Self {
        Self {
            entity_id: entity_id.into(),
            hash,
            kind: ChangeKind::New,
            prior_hash: None,
            attributes,
        }
    }

    /// Record for an entry whose content hash moved away from `prior`.
    pub fn changed(
        entity_id: impl Into<String>,
        hash: ContentHash,
        prior: ContentHash,
        attributes: DirectoryEntry,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            hash,
            kind: ChangeKind::Changed,
            prior_hash: Some(prior),
            attributes,
        }
    }
}

/// Persistence collaborator for change records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Load the most recent hash per identifier from persisted state.
    ///
    /// Called exactly once, at the start of a run. The returned index is
    /// treated as read-only for the remainder of the run.
    async fn load_prior_hashes(&self) -> HarvestResult<HashIndex>;

    /// Durably persist one chunk's worth of change records.
    ///
    /// Invoked once per chunk, before the next chunk is fetched, so the
    /// amount of in-flight uncommitted work never exceeds one chunk.
    async fn persist_batch(&self, records: &[ChangeRecord]) -> HarvestResult<()>;
}

/// Run-tracking collaborator.
#[async_trait]
pub trait RunTracker: Send + Sync {
    /// Called once when the run enters its initializing phase.
    async fn run_started(&self, run_id: HarvestRunId) -> HarvestResult<()>;

    /// Called after each chunk with a stats snapshot. Optional.
    async fn run_progress(
        &self,
        run_id: HarvestRunId,
        stats: serde_json::Value,
    ) -> HarvestResult<()> {
        let _ = (run_id, stats);
        Ok(())
    }

    /// Called exactly once with the terminal status, reason and final
    /// statistics.
    async fn run_finished(
        &self,
        run_id: HarvestRunId,
        status: RunStatus,
        reason: TerminalReason,
        stats: serde_json::Value,
    ) -> HarvestResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;

    // Minimal scripted session used to exercise the trait object surface.
    struct ScriptedSession {
        pages: Vec<ChunkPage>,
        calls: usize,
    }

    #[async_trait]
    impl DirectorySession for ScriptedSession {
        async fn execute(&mut self, _query: &ChunkQuery) -> HarvestResult<ChunkPage> {
            let page = self
                .pages
                .get(self.calls)
                .cloned()
                .ok_or_else(|| HarvestError::search_failed("no more scripted pages"))?;
            self.calls += 1;
            Ok(page)
        }

        async fn reconnect(&mut self) -> HarvestResult<()> {
            Ok(())
        }

        async fn test_connection(&mut self) -> HarvestResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let entry = DirectoryEntry::new("u1").with("cn", "Test");
        let mut session = ScriptedSession {
            pages: vec![ChunkPage::new(vec![entry]).with_cookie(b"next".to_vec())],
            calls: 0,
        };

        let query = ChunkQuery {
            base: "dc=example,dc=com".to_string(),
            filter: "(objectClass=person)".to_string(),
            attributes: vec!["cn".to_string()],
            id_attribute: "uid".to_string(),
            page: PageControl::Paged {
                size: 100,
                cookie: None,
                critical: true,
            },
        };

        let page = session.execute(&query).await.unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.cookie.as_deref(), Some(b"next".as_ref()));

        assert!(session.execute(&query).await.is_err());
    }

    #[test]
    fn test_change_record_constructors() {
        let attrs = DirectoryEntry::new("u1").with("cn", "Test");
        let created = ChangeRecord::created("u1", ContentHash::new("aa"), attrs.clone());
        assert_eq!(created.kind, ChangeKind::New);
        assert!(created.prior_hash.is_none());

        let changed = ChangeRecord::changed(
            "u1",
            ContentHash::new("bb"),
            ContentHash::new("aa"),
            attrs,
        );
        assert_eq!(changed.kind, ChangeKind::Changed);
        assert_eq!(changed.prior_hash.as_ref().unwrap().as_str(), "aa");
    }

    #[test]
    fn test_content_hash_serde_transparent() {
        let hash = ContentHash::new("deadbeef");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"deadbeef\"");
    }
}
