//! Harvest runner
//!
//! Drives one harvest run end to end: loads the prior-hash index, streams
//! chunks, diffs and persists each chunk before the next fetch, and
//! reports the terminal status to run tracking. The run is single-flight
//! over its session; cancellation and the record/duration caps are
//! checked between chunks, never mid-chunk.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use corvus_connector::error::{HarvestError, HarvestResult};
use corvus_connector::ids::HarvestRunId;
use corvus_connector::resilience::RetryConfig;
use corvus_connector::traits::{DirectorySession, HashIndex, RecordSink, RunTracker};
use corvus_connector::types::{HarvestPhase, PagingStrategy, RunStatus, TerminalReason};

use crate::config::HarvestRequest;
use crate::diff::ChangeDetector;
use crate::paging::ChunkStream;
use crate::stats::HarvestRunStats;

/// External cancellation signal, checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The run aborts before its next fetch.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a harvest run.
///
/// A failed run is reported here as data, not as an `Err`: the terminal
/// status and reason code are the externally observable failure signal.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    /// Identifier of this run.
    pub run_id: HarvestRunId,
    /// Final lifecycle phase: `Completed` or `Aborted`.
    pub phase: HarvestPhase,
    /// Terminal status.
    pub status: RunStatus,
    /// Terminal reason code.
    pub reason: TerminalReason,
    /// Final statistics.
    pub stats: HarvestRunStats,
}

/// Executes one harvest run over a session, sink and tracker.
pub struct HarvestRunner<S, K, T> {
    session: S,
    sink: K,
    tracker: T,
    request: HarvestRequest,
    retry: RetryConfig,
    cancel: CancelFlag,
}

impl<S, K, T> HarvestRunner<S, K, T>
where
    S: DirectorySession,
    K: RecordSink,
    T: RunTracker,
{
    /// Create a runner after validating the request.
    pub fn new(session: S, sink: K, tracker: T, request: HarvestRequest) -> HarvestResult<Self> {
        request.validate()?;
        Ok(Self {
            session,
            sink,
            tracker,
            request,
            retry: RetryConfig::default(),
            cancel: CancelFlag::new(),
        })
    }

    /// Override the reconnect retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Attach an external cancellation flag.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle to this run's cancellation flag.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run the harvest to completion or abort.
    ///
    /// Returns `Err` only for failures before the run is underway (an
    /// invalid request or an unreachable run tracker); everything after
    /// that lands in the report with a terminal status and reason.
    #[instrument(skip_all, fields(base = %self.request.base))]
    pub async fn run(self) -> HarvestResult<HarvestReport> {
        let Self {
            session,
            sink,
            tracker,
            request,
            retry,
            cancel,
        } = self;

        let run_id = HarvestRunId::new();
        tracker.run_started(run_id).await?;

        let mut phase = HarvestPhase::Initializing;
        let mut stats = HarvestRunStats::new();
        stats.full_resync = request.full_resync;
        info!(run_id = %run_id, %phase, full_resync = request.full_resync, "harvest run starting");

        let index: HashIndex = if request.full_resync {
            HashIndex::new()
        } else {
            match sink.load_prior_hashes().await {
                Ok(index) => index,
                Err(e) => {
                    warn!(error = %e, "failed to load prior-hash index");
                    return finish_run(
                        &tracker,
                        run_id,
                        HarvestPhase::Aborted,
                        RunStatus::Failed,
                        TerminalReason::Error,
                        stats,
                    )
                    .await;
                }
            }
        };
        let detector = ChangeDetector::new(index, request.significant_attributes.clone());
        let mut stream = ChunkStream::new(session, request.clone(), retry);

        // Identifiers already diffed this run. A strategy downgrade
        // restarts enumeration, so re-delivered entries must be skipped to
        // keep diffing exactly-once per run.
        let mut seen: HashSet<String> = HashSet::new();

        phase = HarvestPhase::Streaming;
        debug!(%phase, prior_records = detector.index_len(), "prior-hash index loaded");
        let started = Instant::now();
        let deadline = request.max_duration_secs.map(Duration::from_secs);

        let outcome: Result<(), TerminalReason> = loop {
            if cancel.is_cancelled() {
                info!("harvest cancelled");
                break Err(TerminalReason::Cancelled);
            }
            if let Some(limit) = deadline {
                if started.elapsed() >= limit {
                    info!(limit_secs = limit.as_secs(), "harvest duration cap reached");
                    break Err(TerminalReason::Cancelled);
                }
            }
            if let Some(max) = request.max_records {
                if stats.entries_seen as u64 >= max {
                    info!(max_records = max, "harvest record cap reached");
                    break Err(TerminalReason::Cancelled);
                }
            }

            match stream.next_chunk().await {
                Ok(None) => break Ok(()),
                Ok(Some(entries)) => {
                    stats.record_chunk(entries.len());

                    let mut fresh = Vec::with_capacity(entries.len());
                    for entry in entries {
                        if !entry.id().is_empty() && !seen.insert(entry.id().to_string()) {
                            stats.record_duplicate();
                            continue;
                        }
                        fresh.push(entry);
                    }

                    let records = detector.diff_chunk(fresh, &mut stats);
                    if !records.is_empty() {
                        if let Err(e) = sink.persist_batch(&records).await {
                            warn!(error = %e, "failed to persist change records");
                            break Err(TerminalReason::Error);
                        }
                    }

                    if let Err(e) = tracker.run_progress(run_id, stats.to_json()).await {
                        debug!(error = %e, "run progress notification failed");
                    }
                }
                Err(e) => {
                    warn!(error = %e, code = e.error_code(), "chunk stream failed");
                    break Err(terminal_reason_for(&e));
                }
            }
        };

        stats.strategy = Some(stream.state().strategy);
        stats.downgrades = stream.downgrades().to_vec();

        match outcome {
            Ok(()) => {
                phase = HarvestPhase::Completed;
                // A run that only completed by switching to range chunking
                // worked around the server's cumulative cap; the reason
                // code says so.
                let reason = if stats
                    .downgrades
                    .iter()
                    .any(|d| d.to == PagingStrategy::RangeChunked)
                {
                    TerminalReason::SizeLimitWorkaround
                } else {
                    TerminalReason::Ok
                };
                finish_run(&tracker, run_id, phase, RunStatus::Completed, reason, stats).await
            }
            Err(reason) => {
                phase = HarvestPhase::Aborted;
                finish_run(&tracker, run_id, phase, RunStatus::Failed, reason, stats).await
            }
        }
    }
}

/// Map a fatal stream error to its terminal reason code.
fn terminal_reason_for(error: &HarvestError) -> TerminalReason {
    match error {
        HarvestError::StalledCursor { .. } => TerminalReason::StalledCursor,
        HarvestError::SafetyLimitExceeded { .. } => TerminalReason::SafetyLimitExceeded,
        HarvestError::ConnectionExhausted { .. } => TerminalReason::ConnectionExhausted,
        _ => TerminalReason::Error,
    }
}

/// Finalize stats, notify run tracking and build the report.
async fn finish_run<T: RunTracker>(
    tracker: &T,
    run_id: HarvestRunId,
    phase: HarvestPhase,
    status: RunStatus,
    reason: TerminalReason,
    mut stats: HarvestRunStats,
) -> HarvestResult<HarvestReport> {
    stats.finalize(status, reason);
    info!(
        run_id = %run_id,
        %phase,
        %status,
        %reason,
        seen = stats.entries_seen,
        created = stats.created,
        changed = stats.changed,
        unchanged = stats.unchanged,
        errors = stats.errors,
        "harvest run finished"
    );
    if let Err(e) = tracker
        .run_finished(run_id, status, reason, stats.to_json())
        .await
    {
        warn!(error = %e, "run finished notification failed");
    }
    Ok(HarvestReport {
        run_id,
        phase,
        status,
        reason,
        stats,
    })
}
