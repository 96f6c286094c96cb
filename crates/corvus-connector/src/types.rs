//! Connector framework type definitions
//!
//! Enums shared between the harvesting engine and its collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Retrieval strategy used to enumerate a directory result set.
///
/// Strategies form a ladder: the engine starts at the most capable one and
/// only ever moves down within a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagingStrategy {
    /// Server-side paging via the protocol's paged-results helper, with the
    /// control marked critical so unsupporting servers reject it outright.
    PagedResults,
    /// Explicit continuation-cookie pagination managed by the client, with
    /// the paging control sent non-critical.
    CookieContinuation,
    /// Independent bounded searches constrained by an advancing inequality
    /// bound on the unique id attribute. Immune to cumulative result caps.
    RangeChunked,
}

impl PagingStrategy {
    /// Get the string representation used in stats and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PagingStrategy::PagedResults => "paged_results",
            PagingStrategy::CookieContinuation => "cookie_continuation",
            PagingStrategy::RangeChunked => "range_chunked",
        }
    }
}

impl fmt::Display for PagingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PagingStrategy {
    type Err = ParsePagingStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paged_results" => Ok(PagingStrategy::PagedResults),
            "cookie_continuation" => Ok(PagingStrategy::CookieContinuation),
            "range_chunked" => Ok(PagingStrategy::RangeChunked),
            _ => Err(ParsePagingStrategyError(s.to_string())),
        }
    }
}

/// Error parsing a paging strategy from string.
#[derive(Debug, Clone)]
pub struct ParsePagingStrategyError(String);

impl fmt::Display for ParsePagingStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid paging strategy '{}', expected one of: paged_results, cookie_continuation, range_chunked",
            self.0
        )
    }
}

impl std::error::Error for ParsePagingStrategyError {}

/// Classification of an entry against the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// No record with this identifier was seen before.
    New,
    /// The content hash differs from the most recent recorded hash.
    Changed,
    /// The content hash matches the most recent recorded hash.
    Unchanged,
}

impl ChangeKind {
    /// Get the string representation used in persistence and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::New => "new",
            ChangeKind::Changed => "changed",
            ChangeKind::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle phase of a harvest run.
///
/// Phases advance strictly forward; a new run always begins in
/// `Initializing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestPhase {
    /// Loading the prior-hash index.
    Initializing,
    /// Fetching, diffing and persisting chunks.
    Streaming,
    /// All chunks exhausted and persisted.
    Completed,
    /// Terminated early: safety limit, stalled cursor, exhausted retries
    /// or cancellation.
    Aborted,
}

impl HarvestPhase {
    /// Whether this phase is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, HarvestPhase::Completed | HarvestPhase::Aborted)
    }
}

impl fmt::Display for HarvestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HarvestPhase::Initializing => "initializing",
            HarvestPhase::Streaming => "streaming",
            HarvestPhase::Completed => "completed",
            HarvestPhase::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// Terminal status reported to run tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The full result set was enumerated and persisted.
    Completed,
    /// The run terminated before exhausting the result set.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Reason code attached to the terminal run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// Clean completion without strategy downgrades.
    Ok,
    /// Completed, but only after downgrading to range chunking to work
    /// around the server's cumulative result cap.
    SizeLimitWorkaround,
    /// The range cursor failed to advance between chunks.
    StalledCursor,
    /// The configured chunk-count ceiling was hit.
    SafetyLimitExceeded,
    /// Reconnect retries were exhausted while fetching a chunk.
    ConnectionExhausted,
    /// The run was cancelled externally or hit a record/duration cap.
    Cancelled,
    /// An unexpected internal failure (e.g. persistence).
    Error,
}

impl TerminalReason {
    /// Whether this reason corresponds to a failed run.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            TerminalReason::Ok | TerminalReason::SizeLimitWorkaround
        )
    }

    /// Get the string representation used in run tracking.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::Ok => "ok",
            TerminalReason::SizeLimitWorkaround => "size_limit_workaround",
            TerminalReason::StalledCursor => "stalled_cursor",
            TerminalReason::SafetyLimitExceeded => "safety_limit_exceeded",
            TerminalReason::ConnectionExhausted => "connection_exhausted",
            TerminalReason::Cancelled => "cancelled",
            TerminalReason::Error => "error",
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_roundtrip() {
        for s in [
            PagingStrategy::PagedResults,
            PagingStrategy::CookieContinuation,
            PagingStrategy::RangeChunked,
        ] {
            assert_eq!(s.as_str().parse::<PagingStrategy>().unwrap(), s);
        }
    }

    #[test]
    fn test_strategy_parse_invalid() {
        assert!("offset".parse::<PagingStrategy>().is_err());
    }

    #[test]
    fn test_change_kind_display() {
        assert_eq!(ChangeKind::New.to_string(), "new");
        assert_eq!(ChangeKind::Changed.to_string(), "changed");
        assert_eq!(ChangeKind::Unchanged.to_string(), "unchanged");
    }

    #[test]
    fn test_phase_terminal() {
        assert!(!HarvestPhase::Initializing.is_terminal());
        assert!(!HarvestPhase::Streaming.is_terminal());
        assert!(HarvestPhase::Completed.is_terminal());
        assert!(HarvestPhase::Aborted.is_terminal());
    }

    #[test]
    fn test_terminal_reason_failure() {
        assert!(!TerminalReason::Ok.is_failure());
        assert!(!TerminalReason::SizeLimitWorkaround.is_failure());
        assert!(TerminalReason::StalledCursor.is_failure());
        assert!(TerminalReason::SafetyLimitExceeded.is_failure());
        assert!(TerminalReason::ConnectionExhausted.is_failure());
        assert!(TerminalReason::Cancelled.is_failure());
    }

    #[test]
    fn test_terminal_reason_serde() {
        let json = serde_json::to_string(&TerminalReason::SizeLimitWorkaround).unwrap();
        assert_eq!(json, "\"size_limit_workaround\"");
    }
}
