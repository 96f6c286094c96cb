//! Pagination strategies and the chunk stream
//!
//! Enumerating a large directory under a server-enforced cumulative result
//! cap cannot rely on cookie continuation alone: once the cap trips, the
//! server refuses further pages of that search. The chunk stream starts
//! with server-side paging, falls back along a one-directional ladder on
//! protocol signals, and in the last resort re-issues independent bounded
//! searches with an advancing inequality bound on the unique id attribute.
//!
//! The stream is finite, lazy and not restartable mid-stream: it yields
//! one bounded chunk at a time and never retains more than the chunk in
//! flight.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use corvus_connector::entry::DirectoryEntry;
use corvus_connector::error::{HarvestError, HarvestResult};
use corvus_connector::resilience::RetryConfig;
use corvus_connector::traits::{ChunkPage, ChunkQuery, DirectorySession, PageControl};
use corvus_connector::types::PagingStrategy;

use crate::config::HarvestRequest;
use crate::filter;

/// Continuation state carried between chunks. Strategy-dependent and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Next fetch starts from the beginning of the result set.
    Start,
    /// Opaque server cookie from the paged-results control.
    Cookie(Vec<u8>),
    /// Id-attribute value of the last entry of the previous chunk.
    SortKey(String),
}

/// Mutable pagination state for one harvest.
///
/// Created at harvest start, updated after every chunk, discarded at
/// harvest end.
#[derive(Debug, Clone)]
pub struct PaginationState {
    /// Strategy currently in use.
    pub strategy: PagingStrategy,
    /// Continuation token for the next fetch.
    pub continuation: Continuation,
    /// Chunks fetched under the current strategy.
    pub chunks_issued: u32,
    /// Total successful fetches this harvest. Monotonic: survives strategy
    /// downgrades, and the safety ceiling is enforced against it.
    pub safety_counter: u32,
}

impl PaginationState {
    fn new() -> Self {
        Self {
            strategy: PagingStrategy::PagedResults,
            continuation: Continuation::Start,
            chunks_issued: 0,
            safety_counter: 0,
        }
    }
}

/// A strategy downgrade that occurred during a harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDowngrade {
    /// Strategy the harvest was using.
    pub from: PagingStrategy,
    /// Strategy the harvest switched to.
    pub to: PagingStrategy,
    /// Value of the safety counter when the downgrade happened.
    pub after_chunks: u32,
}

/// Lazy, finite sequence of entry chunks.
///
/// Guarantees: entries within a chunk preserve server return order;
/// chunks are yielded in strategy order; a consumed chunk is never
/// re-delivered by the same continuation state; the stream itself retains
/// O(one chunk) memory. A strategy downgrade restarts enumeration from
/// the configured starting point, which is the one case where the same
/// server entry can be yielded twice in a run; the consumer dedups.
pub struct ChunkStream<S> {
    session: S,
    request: HarvestRequest,
    retry: RetryConfig,
    state: PaginationState,
    downgrades: Vec<StrategyDowngrade>,
    finished: bool,
    peak_chunk_entries: usize,
}

impl<S: DirectorySession> ChunkStream<S> {
    /// Create a stream over `session` for one harvest request.
    pub fn new(session: S, request: HarvestRequest, retry: RetryConfig) -> Self {
        let mut state = PaginationState::new();
        state.continuation = starting_continuation(&request);
        Self {
            session,
            request,
            retry,
            state,
            downgrades: Vec::new(),
            finished: false,
            peak_chunk_entries: 0,
        }
    }

    /// Current pagination state.
    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    /// Strategy downgrades recorded so far.
    pub fn downgrades(&self) -> &[StrategyDowngrade] {
        &self.downgrades
    }

    /// Largest chunk held by the stream at any point.
    pub fn peak_chunk_entries(&self) -> usize {
        self.peak_chunk_entries
    }

    /// Whether the stream has terminated.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fetch the next chunk, or `None` when the result set is exhausted.
    ///
    /// Errors are terminal for the stream: once an `Err` is returned every
    /// further call yields `Ok(None)`.
    pub async fn next_chunk(&mut self) -> HarvestResult<Option<Vec<DirectoryEntry>>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            if self.state.safety_counter >= self.request.safety_chunk_limit {
                self.finished = true;
                warn!(
                    limit = self.request.safety_chunk_limit,
                    "safety chunk ceiling reached before the result set was exhausted"
                );
                return Err(HarvestError::SafetyLimitExceeded {
                    limit: self.request.safety_chunk_limit,
                });
            }

            let query = self.build_query();
            match self.fetch_with_retry(&query).await {
                Ok(page) => {
                    self.state.safety_counter += 1;
                    self.state.chunks_issued += 1;
                    let entries = page.entries;
                    self.peak_chunk_entries = self.peak_chunk_entries.max(entries.len());
                    self.advance(&entries, page.cookie)?;
                    debug!(
                        strategy = %self.state.strategy,
                        chunk = self.state.safety_counter,
                        entries = entries.len(),
                        finished = self.finished,
                        "chunk fetched"
                    );
                    return Ok(Some(entries));
                }
                Err(signal) if signal.is_capability_signal() => {
                    self.downgrade(signal)?;
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            }
        }
    }

    /// Build the query for the next fetch from the current state.
    fn build_query(&self) -> ChunkQuery {
        let base_filter = filter::normalize(&self.request.filter);
        let (filter, page) = match self.state.strategy {
            PagingStrategy::PagedResults | PagingStrategy::CookieContinuation => {
                let cookie = match &self.state.continuation {
                    Continuation::Cookie(cookie) => Some(cookie.clone()),
                    _ => None,
                };
                let critical = self.state.strategy == PagingStrategy::PagedResults;
                (
                    base_filter,
                    PageControl::Paged {
                        size: self.request.chunk_size,
                        cookie,
                        critical,
                    },
                )
            }
            PagingStrategy::RangeChunked => {
                let composed = match &self.state.continuation {
                    Continuation::SortKey(cursor) => {
                        filter::range_bound(&base_filter, &self.request.id_attribute, cursor)
                    }
                    _ => base_filter,
                };
                (
                    composed,
                    PageControl::Bounded {
                        size: self.request.chunk_size,
                    },
                )
            }
        };

        ChunkQuery {
            base: self.request.base.clone(),
            filter,
            attributes: self.request.search_attributes(),
            id_attribute: self.request.id_attribute.clone(),
            page,
        }
    }

    /// Update continuation state after a successful fetch, detecting
    /// termination and cursor stalls.
    fn advance(&mut self, entries: &[DirectoryEntry], cookie: Option<Vec<u8>>) -> HarvestResult<()> {
        match self.state.strategy {
            PagingStrategy::PagedResults | PagingStrategy::CookieContinuation => {
                match cookie {
                    Some(cookie) => self.state.continuation = Continuation::Cookie(cookie),
                    // No cookie from the server: true end of results.
                    None => self.finished = true,
                }
            }
            PagingStrategy::RangeChunked => {
                // A chunk strictly smaller than requested is the end of
                // the result set.
                if (entries.len() as u32) < self.request.chunk_size {
                    self.finished = true;
                    return Ok(());
                }
                let cursor = match entries.last() {
                    Some(last) => last.id().to_string(),
                    None => String::new(),
                };
                let stalled = cursor.is_empty()
                    || match &self.state.continuation {
                        Continuation::SortKey(previous) => cursor.as_str() <= previous.as_str(),
                        _ => false,
                    };
                if stalled {
                    self.finished = true;
                    return Err(HarvestError::StalledCursor { cursor });
                }
                self.state.continuation = Continuation::SortKey(cursor);
            }
        }
        Ok(())
    }

    /// Execute one fetch, reconnecting and retrying on transient
    /// connection errors up to the retry budget.
    async fn fetch_with_retry(&mut self, query: &ChunkQuery) -> HarvestResult<ChunkPage> {
        let mut attempt: u32 = 0;
        loop {
            match self.session.execute(query).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() => {
                    if !self.retry.should_retry(attempt) {
                        warn!(error = %e, attempts = attempt, "connection retries exhausted");
                        return Err(HarvestError::ConnectionExhausted { attempts: attempt });
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "chunk fetch failed, reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                    if let Err(reconnect_err) = self.session.reconnect().await {
                        warn!(error = %reconnect_err, "reconnect failed");
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Move one step down the strategy ladder, or fail if the signal has
    /// no fallback from the current strategy. Downgrades are
    /// one-directional and permanent for the rest of the harvest.
    fn downgrade(&mut self, signal: HarvestError) -> HarvestResult<()> {
        let from = self.state.strategy;
        let to = match (&signal, from) {
            (HarvestError::PagingUnsupported { .. }, PagingStrategy::PagedResults) => {
                PagingStrategy::CookieContinuation
            }
            (
                HarvestError::SizeLimitExceeded { .. },
                PagingStrategy::PagedResults | PagingStrategy::CookieContinuation,
            ) => PagingStrategy::RangeChunked,
            _ => {
                self.finished = true;
                return Err(signal);
            }
        };

        info!(
            from = %from,
            to = %to,
            after_chunks = self.state.safety_counter,
            signal = signal.error_code(),
            "downgrading pagination strategy"
        );

        self.downgrades.push(StrategyDowngrade {
            from,
            to,
            after_chunks: self.state.safety_counter,
        });
        self.state.strategy = to;
        self.state.continuation = starting_continuation(&self.request);
        self.state.chunks_issued = 0;
        Ok(())
    }
}

/// The configured starting point of an enumeration. The paged strategies
/// treat a sort key as "no cookie yet"; the range strategy bounds its
/// first chunk with it.
fn starting_continuation(request: &HarvestRequest) -> Continuation {
    match &request.start_cursor {
        Some(cursor) => Continuation::SortKey(cursor.clone()),
        None => Continuation::Start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn request(chunk_size: u32) -> HarvestRequest {
        HarvestRequest::new(
            "ou=people,dc=example,dc=com",
            "(objectClass=person)",
            vec!["cn".to_string()],
        )
        .with_id_attribute("uid")
        .with_chunk_size(chunk_size)
        .with_safety_chunk_limit(100)
    }

    fn entry(id: &str) -> DirectoryEntry {
        DirectoryEntry::new(id).with("uid", id).with("cn", id)
    }

    /// Session that replays a fixed script of results.
    struct ScriptedSession {
        script: VecDeque<HarvestResult<ChunkPage>>,
        queries: Vec<ChunkQuery>,
        reconnects: u32,
    }

    impl ScriptedSession {
        fn new(script: Vec<HarvestResult<ChunkPage>>) -> Self {
            Self {
                script: script.into(),
                queries: Vec::new(),
                reconnects: 0,
            }
        }
    }

    #[async_trait]
    impl DirectorySession for ScriptedSession {
        async fn execute(&mut self, query: &ChunkQuery) -> HarvestResult<ChunkPage> {
            self.queries.push(query.clone());
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(HarvestError::search_failed("script exhausted")))
        }

        async fn reconnect(&mut self) -> HarvestResult<()> {
            self.reconnects += 1;
            Ok(())
        }

        async fn test_connection(&mut self) -> HarvestResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cookie_flow_until_exhaustion() {
        let session = ScriptedSession::new(vec![
            Ok(ChunkPage::new(vec![entry("a"), entry("b")]).with_cookie(b"c1".to_vec())),
            Ok(ChunkPage::new(vec![entry("c")])),
        ]);
        let mut stream = ChunkStream::new(session, request(2), fast_retry(0));

        let first = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(
            stream.state().continuation,
            Continuation::Cookie(b"c1".to_vec())
        );

        let second = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert!(stream.is_finished());
        assert!(stream.next_chunk().await.unwrap().is_none());
        assert!(stream.downgrades().is_empty());
    }

    #[tokio::test]
    async fn test_critical_rejection_falls_back_to_cookie() {
        let session = ScriptedSession::new(vec![
            Err(HarvestError::paging_unsupported("rejected")),
            Ok(ChunkPage::new(vec![entry("a")])),
        ]);
        let mut stream = ChunkStream::new(session, request(2), fast_retry(0));

        let chunk = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(chunk.len(), 1);
        assert_eq!(stream.downgrades().len(), 1);
        assert_eq!(stream.downgrades()[0].from, PagingStrategy::PagedResults);
        assert_eq!(
            stream.downgrades()[0].to,
            PagingStrategy::CookieContinuation
        );
        assert_eq!(stream.state().strategy, PagingStrategy::CookieContinuation);
    }

    #[tokio::test]
    async fn test_size_limit_downgrades_to_range_and_restarts() {
        let session = ScriptedSession::new(vec![
            // First paged chunk is fine
            Ok(ChunkPage::new(vec![entry("a"), entry("b")]).with_cookie(b"c1".to_vec())),
            // Continuation trips the cumulative cap
            Err(HarvestError::size_limit("cap")),
            // Range chunking restarts from the beginning
            Ok(ChunkPage::new(vec![entry("a"), entry("b")])),
            Ok(ChunkPage::new(vec![entry("c")])),
        ]);
        let mut stream = ChunkStream::new(session, request(2), fast_retry(0));

        assert_eq!(stream.next_chunk().await.unwrap().unwrap().len(), 2);
        // The size-limit signal downgrades and transparently fetches the
        // first range chunk.
        assert_eq!(stream.next_chunk().await.unwrap().unwrap().len(), 2);
        assert_eq!(stream.state().strategy, PagingStrategy::RangeChunked);
        assert_eq!(stream.downgrades().len(), 1);
        assert_eq!(stream.downgrades()[0].to, PagingStrategy::RangeChunked);

        // Short chunk terminates the range scan.
        assert_eq!(stream.next_chunk().await.unwrap().unwrap().len(), 1);
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_range_queries_carry_advancing_bound() {
        let session = ScriptedSession::new(vec![
            Err(HarvestError::size_limit("cap")),
            Ok(ChunkPage::new(vec![entry("a"), entry("b")])),
            Ok(ChunkPage::new(vec![entry("c")])),
        ]);
        let mut stream = ChunkStream::new(session, request(2), fast_retry(0));

        stream.next_chunk().await.unwrap();
        stream.next_chunk().await.unwrap();
        assert!(stream.next_chunk().await.unwrap().is_none());

        let session = &stream.session;
        // Query 0: paged attempt. Query 1: first range chunk, unbounded
        // filter. Query 2: range chunk bounded past "b".
        assert_eq!(session.queries.len(), 3);
        assert_eq!(session.queries[1].filter, "(objectClass=person)");
        assert_eq!(
            session.queries[2].filter,
            "(&(objectClass=person)(uid>=b)(!(uid=b)))"
        );
        assert!(matches!(
            session.queries[2].page,
            PageControl::Bounded { size: 2 }
        ));
    }

    #[tokio::test]
    async fn test_start_cursor_bounds_first_range_chunk() {
        let session = ScriptedSession::new(vec![
            Err(HarvestError::size_limit("cap")),
            Ok(ChunkPage::new(vec![entry("n")])),
        ]);
        let mut stream = ChunkStream::new(
            session,
            request(2).with_start_cursor("m"),
            fast_retry(0),
        );

        assert_eq!(stream.next_chunk().await.unwrap().unwrap().len(), 1);
        let session = &stream.session;
        assert_eq!(
            session.queries[1].filter,
            "(&(objectClass=person)(uid>=m)(!(uid=m)))"
        );
    }

    #[tokio::test]
    async fn test_stalled_cursor_aborts() {
        let session = ScriptedSession::new(vec![
            Err(HarvestError::size_limit("cap")),
            Ok(ChunkPage::new(vec![entry("a"), entry("b")])),
            // Server ignores the bound and repeats the same chunk
            Ok(ChunkPage::new(vec![entry("a"), entry("b")])),
        ]);
        let mut stream = ChunkStream::new(session, request(2), fast_retry(0));

        stream.next_chunk().await.unwrap();
        let err = stream.next_chunk().await.unwrap_err();
        assert!(matches!(err, HarvestError::StalledCursor { .. }));
        assert!(stream.is_finished());
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_safety_ceiling_fires_exactly_at_limit() {
        // Every chunk is full with an advancing cursor: never terminates.
        let pages = (0..10)
            .map(|i| {
                Ok(ChunkPage::new(vec![
                    entry(&format!("u{:02}", i * 2)),
                    entry(&format!("u{:02}", i * 2 + 1)),
                ]))
            })
            .collect();
        let session = ScriptedSession::new(pages);
        let mut stream = ChunkStream::new(
            session,
            request(2).with_safety_chunk_limit(4),
            fast_retry(0),
        );
        // Force range mode so chunks never signal exhaustion via cookies.
        stream.state.strategy = PagingStrategy::RangeChunked;

        for _ in 0..4 {
            assert!(stream.next_chunk().await.unwrap().is_some());
        }
        let err = stream.next_chunk().await.unwrap_err();
        assert!(matches!(
            err,
            HarvestError::SafetyLimitExceeded { limit: 4 }
        ));
    }

    #[tokio::test]
    async fn test_transient_error_reconnects_and_retries() {
        let session = ScriptedSession::new(vec![
            Err(HarvestError::connection_failed("drop")),
            Ok(ChunkPage::new(vec![entry("a")])),
        ]);
        let mut stream = ChunkStream::new(session, request(2), fast_retry(2));

        let chunk = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(chunk.len(), 1);
        assert_eq!(stream.session.reconnects, 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let session = ScriptedSession::new(vec![
            Err(HarvestError::connection_failed("drop")),
            Err(HarvestError::connection_failed("drop")),
            Err(HarvestError::connection_failed("drop")),
        ]);
        let mut stream = ChunkStream::new(session, request(2), fast_retry(2));

        let err = stream.next_chunk().await.unwrap_err();
        assert!(matches!(
            err,
            HarvestError::ConnectionExhausted { attempts: 2 }
        ));
        assert_eq!(stream.session.reconnects, 2);
    }

    #[tokio::test]
    async fn test_peak_chunk_probe() {
        let session = ScriptedSession::new(vec![
            Ok(ChunkPage::new(vec![entry("a"), entry("b")]).with_cookie(b"c".to_vec())),
            Ok(ChunkPage::new(vec![entry("c")])),
        ]);
        let mut stream = ChunkStream::new(session, request(2), fast_retry(0));
        while stream.next_chunk().await.unwrap().is_some() {}
        assert_eq!(stream.peak_chunk_entries(), 2);
    }

    #[test]
    fn test_downgrade_event_serde() {
        let event = StrategyDowngrade {
            from: PagingStrategy::CookieContinuation,
            to: PagingStrategy::RangeChunked,
            after_chunks: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from"], "cookie_continuation");
        assert_eq!(json["to"], "range_chunked");
        assert_eq!(json["after_chunks"], 5);
    }
}
