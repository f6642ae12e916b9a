//! Sync orchestrator: search every source track in the destination catalog
//! and add the matches to a playlist, one chunk at a time.
//!
//! Everything runs sequentially. One request is in flight at a time, with a
//! pacing delay after each search and each chunk submission. Failed searches
//! and failed chunk submissions are counted and skipped; authorization errors
//! abort the run and hand back the partial report.

use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{DestinationCatalog, MAX_TRACKS_PER_ADD};
use crate::error::CatalogError;
use crate::models::Track;
use crate::normalize::build_search_variants;
use crate::progress::{format_duration, Progress};
use crate::scoring::SelectStrategy;

pub const DEFAULT_SEARCH_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub chunk_size: usize,
    pub search_delay: Duration,
    pub chunk_delay: Duration,
    pub strategy: SelectStrategy,
    /// Skip identifiers already submitted earlier in the run
    pub dedupe: bool,
    /// Search and select, but never write to the playlist
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            chunk_size: MAX_TRACKS_PER_ADD,
            search_delay: DEFAULT_SEARCH_DELAY,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            strategy: SelectStrategy::default(),
            dedupe: true,
            dry_run: false,
        }
    }
}

impl SyncOptions {
    /// Chunk size clamped to what one playlist-add call accepts.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, MAX_TRACKS_PER_ADD)
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkReport {
    pub index: usize,
    pub source_tracks: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Searches that failed with a non-fatal error
    pub failed_searches: usize,
    /// Matches without a destination identifier
    pub missing_ids: usize,
    /// Matches skipped because the identifier was already submitted
    pub duplicates: usize,
    /// Identifiers written to the playlist
    pub submitted: usize,
    /// Why the playlist-add call failed, if it did
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub chunks: Vec<ChunkReport>,
}

impl SyncReport {
    fn total(&self, field: impl Fn(&ChunkReport) -> usize) -> usize {
        self.chunks.iter().map(field).sum()
    }

    pub fn source_tracks(&self) -> usize {
        self.total(|c| c.source_tracks)
    }

    pub fn matched(&self) -> usize {
        self.total(|c| c.matched)
    }

    pub fn unmatched(&self) -> usize {
        self.total(|c| c.unmatched)
    }

    pub fn failed_searches(&self) -> usize {
        self.total(|c| c.failed_searches)
    }

    pub fn submitted(&self) -> usize {
        self.total(|c| c.submitted)
    }

    pub fn failed_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.error.is_some()).count()
    }
}

/// A fatal error stopped the run. `partial` holds every chunk finished before.
#[derive(Error, Debug)]
#[error("Sync aborted after {} chunk(s): {source}", .partial.chunks.len())]
pub struct SyncAborted {
    #[source]
    pub source: CatalogError,
    pub partial: SyncReport,
}

// ============================================================================
// Orchestrator
// ============================================================================

enum TrackOutcome {
    Matched(Option<String>),
    Unmatched { failed_searches: usize },
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Try each search variant in order and stop at the first one that selects a
/// candidate.
async fn match_track<D: DestinationCatalog>(
    dest: &mut D,
    source: &Track,
    options: &SyncOptions,
) -> Result<TrackOutcome, CatalogError> {
    let variants = build_search_variants(source);
    let mut failed_searches = 0;

    for query in variants.iter() {
        if query.trim().is_empty() {
            continue;
        }
        let result = dest.search(query).await;
        pause(options.search_delay).await;

        let candidates = match result {
            Ok(candidates) => candidates,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(target: "sync", query = %query, "Search failed: {}", e);
                failed_searches += 1;
                continue;
            }
        };

        if let Some(found) = options.strategy.select(source, &candidates) {
            debug!(target: "sync", "{} => {}", source.search_string, found.search_string);
            return Ok(TrackOutcome::Matched(found.catalog_id().map(str::to_string)));
        }
    }

    debug!(target: "sync", "Not found: {}", source.search_string);
    Ok(TrackOutcome::Unmatched { failed_searches })
}

/// Migrate `tracks` into `playlist_id`.
pub async fn sync_tracks<D: DestinationCatalog>(
    dest: &mut D,
    playlist_id: &str,
    tracks: &[Track],
    options: &SyncOptions,
    progress: &Progress,
) -> Result<SyncReport, SyncAborted> {
    let start = Instant::now();
    let chunk_size = options.effective_chunk_size();
    let total = tracks.len() as u64;

    let mut report = SyncReport::default();
    let mut submitted_ids: FxHashSet<String> = FxHashSet::default();
    let pb = progress.bar(total, "Matching tracks");
    let mut processed: u64 = 0;

    for (index, chunk) in tracks.chunks(chunk_size).enumerate() {
        let mut chunk_report = ChunkReport {
            index,
            source_tracks: chunk.len(),
            ..Default::default()
        };
        let mut ids: Vec<String> = Vec::with_capacity(chunk.len());

        for source in chunk {
            let outcome = match match_track(dest, source, options).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    pb.abandon();
                    report.chunks.push(chunk_report);
                    return Err(SyncAborted {
                        source: e,
                        partial: report,
                    });
                }
            };

            match outcome {
                TrackOutcome::Matched(Some(id)) => {
                    chunk_report.matched += 1;
                    let seen = submitted_ids.contains(&id) || ids.contains(&id);
                    if options.dedupe && seen {
                        chunk_report.duplicates += 1;
                    } else {
                        ids.push(id);
                    }
                }
                TrackOutcome::Matched(None) => {
                    warn!(target: "sync", "Matched track has no id: {}", source.search_string);
                    chunk_report.matched += 1;
                    chunk_report.missing_ids += 1;
                }
                TrackOutcome::Unmatched { failed_searches } => {
                    chunk_report.unmatched += 1;
                    chunk_report.failed_searches += failed_searches;
                }
            }

            processed += 1;
            pb.inc(1);
            progress.log("sync", processed, total, 50);
        }

        if ids.is_empty() {
            debug!(target: "sync", chunk = index, "Nothing to add");
        } else if options.dry_run {
            info!(target: "sync", chunk = index, "Dry run, {} track(s) not added", ids.len());
            submitted_ids.extend(ids);
        } else {
            let result = dest.add_to_playlist(playlist_id, &ids).await;
            pause(options.chunk_delay).await;

            match result {
                Ok(()) => {
                    chunk_report.submitted = ids.len();
                    submitted_ids.extend(ids);
                }
                Err(e) if e.is_fatal() => {
                    pb.abandon();
                    chunk_report.error = Some(e.to_string());
                    report.chunks.push(chunk_report);
                    return Err(SyncAborted {
                        source: e,
                        partial: report,
                    });
                }
                Err(e) => {
                    warn!(target: "sync", chunk = index, "Failed to add tracks: {}", e);
                    chunk_report.error = Some(e.to_string());
                }
            }
        }

        info!(
            target: "sync",
            "Chunk {}: {} found, {} not found, {} added",
            index + 1,
            chunk_report.matched,
            chunk_report.unmatched,
            chunk_report.submitted
        );
        report.chunks.push(chunk_report);
    }

    pb.finish_and_clear();
    info!(
        target: "sync",
        "Done in {}: {}/{} matched, {} added",
        format_duration(start.elapsed()),
        report.matched(),
        report.source_tracks(),
        report.submitted()
    );
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
