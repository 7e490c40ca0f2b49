//! Batch scheduler
//!
//! Drives one enrichment per discovered leaf in randomly sized chunks:
//!
//! ```text
//!   Idle ──► Discovering ──► Dispatching(chunk) ──► Waiting(chunk) ──┬──► Done
//!                                 ▲                                  │
//!                                 └──────── pause (random secs) ◄────┘
//! ```
//!
//! - Chunk sizes and pauses are drawn uniformly from inclusive ranges
//!   ([`PacingConfig`]).
//! - Every leaf in a chunk runs as its own task; the chunk is a full barrier.
//! - Each result is written back through the leaf's path and the whole
//!   working catalog is checkpointed, all under one async mutex so every
//!   checkpoint is a consistent snapshot.
//! - A failed leaf is recorded on the entry and counted; it never stops the run.

use crate::config::{ConfigError, EnrichConfig, PacingConfig};
use crate::format::{format_metric, RawMetric};
use crate::source::{FetchError, MetricSource};
use crate::window::DateWindow;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sitetally_catalog::{
    discover, discover_pending, select_catalog, Catalog, DiscoveredLeaf, EntryPatch, MergePolicy,
    ParsedInput, Path,
};
use sitetally_storage::CheckpointSink;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

// ============================================================================
// Run context and results
// ============================================================================

/// Per-run collaborators, built once by the caller.
#[derive(Clone)]
pub struct RunContext {
    /// Catalog used when the caller supplies no input (or merges onto it).
    pub default_catalog: Catalog,
    pub sink: Arc<dyn CheckpointSink>,
    /// Stamped into `updatedOn` and used for the date window.
    pub today: NaiveDate,
}

impl RunContext {
    pub fn new(default_catalog: Catalog, sink: Arc<dyn CheckpointSink>, today: NaiveDate) -> Self {
        Self {
            default_catalog,
            sink,
            today,
        }
    }

    /// Catalog a run should work on, given optional user input.
    pub fn select(&self, input: Option<&ParsedInput>, policy: MergePolicy) -> Catalog {
        select_catalog(&self.default_catalog, input, policy)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("catalog has no entries to enrich")]
    EmptyCatalog,
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum LeafOutcome {
    #[serde(rename_all = "camelCase")]
    Success { metric: String, metric_raw: u64 },
    Failure { reason: String },
}

impl LeafOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LeafOutcome::Success { .. })
    }
}

/// Sent to the observer once per completed leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafProgress {
    /// 1-based completion order.
    pub position: usize,
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub entity_key: String,
    pub path: Path,
    pub outcome: LeafOutcome,
}

pub trait ProgressObserver: Send + Sync {
    fn on_leaf(&self, progress: &LeafProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&LeafProgress) + Send + Sync,
{
    fn on_leaf(&self, progress: &LeafProgress) {
        self(progress)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub success: usize,
    pub failed: usize,
    /// Fetch calls made, retries included.
    pub attempts: usize,
    pub leaves: usize,
    pub chunks: usize,
    pub window: DateWindow,
    pub catalog: Catalog,
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct Scheduler {
    source: Arc<dyn MetricSource>,
    config: EnrichConfig,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl Scheduler {
    pub fn new(source: Arc<dyn MetricSource>, config: EnrichConfig) -> Self {
        Self {
            source,
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &EnrichConfig {
        &self.config
    }

    /// Enrich every entry of `catalog`. The caller's catalog is not touched;
    /// the mutated copy comes back in the report.
    pub async fn run(&self, ctx: &RunContext, catalog: &Catalog) -> Result<RunReport, RunError> {
        let leaves = discover(catalog);
        self.run_leaves(ctx, catalog, leaves).await
    }

    /// Like [`Scheduler::run`], skipping entries already enriched today.
    pub async fn resume(&self, ctx: &RunContext, catalog: &Catalog) -> Result<RunReport, RunError> {
        let leaves = discover_pending(catalog, ctx.today);
        self.run_leaves(ctx, catalog, leaves).await
    }

    async fn run_leaves(
        &self,
        ctx: &RunContext,
        catalog: &Catalog,
        leaves: Vec<DiscoveredLeaf>,
    ) -> Result<RunReport, RunError> {
        self.config.validate()?;
        if leaves.is_empty() {
            return Err(RunError::EmptyCatalog);
        }

        let total = leaves.len();
        let window = DateWindow::trailing(ctx.today, self.config.window_months);
        let pacing = &self.config.pacing;
        let mut rng = match pacing.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        tracing::info!(
            leaves = total,
            window = %window,
            source = self.source.name(),
            sink = ctx.sink.name(),
            "enrichment run started"
        );

        let dispatch = Arc::new(Dispatch {
            source: Arc::clone(&self.source),
            sink: Arc::clone(&ctx.sink),
            observer: self.observer.clone(),
            working: Mutex::new(Working {
                catalog: catalog.clone(),
                success: 0,
                failed: 0,
            }),
            attempts: AtomicUsize::new(0),
            window,
            today: ctx.today,
            total,
            max_attempts: self.config.max_attempts,
            retry_backoff: Duration::from_secs(self.config.retry_backoff_secs),
        });

        let mut queue: VecDeque<DiscoveredLeaf> = leaves.into();
        let mut chunks = 0;
        while !queue.is_empty() {
            let size = chunk_size(&mut rng, pacing).min(queue.len());
            let chunk: Vec<_> = queue.drain(..size).collect();
            chunks += 1;
            tracing::debug!(chunk = chunks, size, remaining = queue.len(), "dispatching chunk");

            let settled_before = dispatch.settled().await;
            let mut set = JoinSet::new();
            for leaf in chunk {
                set.spawn(Arc::clone(&dispatch).process(leaf));
            }
            while let Some(joined) = set.join_next().await {
                if let Err(err) = joined {
                    tracing::warn!(error = %err, "enrichment task aborted");
                }
            }
            // Tasks that died before their outcome was counted.
            let unsettled = size.saturating_sub(dispatch.settled().await - settled_before);
            if unsettled > 0 {
                dispatch.record_aborted(unsettled).await;
            }

            if !queue.is_empty() {
                let secs = pause_secs(&mut rng, pacing);
                tracing::info!(pause_secs = secs, remaining = queue.len(), "pausing between chunks");
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
        }

        let attempts = dispatch.attempts.load(Ordering::SeqCst);
        let working = dispatch.working.lock().await;
        let report = RunReport {
            success: working.success,
            failed: working.failed,
            attempts,
            leaves: total,
            chunks,
            window,
            catalog: working.catalog.clone(),
        };
        tracing::info!(
            success = report.success,
            failed = report.failed,
            attempts = report.attempts,
            chunks = report.chunks,
            "enrichment run finished"
        );
        Ok(report)
    }
}

fn chunk_size(rng: &mut StdRng, pacing: &PacingConfig) -> usize {
    rng.gen_range(pacing.chunk_min..=pacing.chunk_max)
}

fn pause_secs(rng: &mut StdRng, pacing: &PacingConfig) -> u64 {
    rng.gen_range(pacing.pause_min_secs..=pacing.pause_max_secs)
}

// ============================================================================
// Per-leaf work
// ============================================================================

struct Working {
    catalog: Catalog,
    success: usize,
    failed: usize,
}

/// State shared by every task of a run.
struct Dispatch {
    source: Arc<dyn MetricSource>,
    sink: Arc<dyn CheckpointSink>,
    observer: Option<Arc<dyn ProgressObserver>>,
    working: Mutex<Working>,
    attempts: AtomicUsize,
    window: DateWindow,
    today: NaiveDate,
    total: usize,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl Dispatch {
    async fn process(self: Arc<Self>, leaf: DiscoveredLeaf) {
        let (patch, outcome) = match self.fetch_with_retry(&leaf.entity_key).await {
            Ok(raw) => {
                let metric = format_metric(raw);
                let metric_raw = raw.floor();
                tracing::debug!(entity = %leaf.entity_key, metric = %metric, "leaf enriched");
                (
                    EntryPatch::success(metric.clone(), metric_raw, self.today),
                    LeafOutcome::Success { metric, metric_raw },
                )
            }
            Err(err) => {
                tracing::warn!(entity = %leaf.entity_key, error = %err, "leaf enrichment failed");
                let reason = err.to_string();
                (
                    EntryPatch::failure(reason.clone(), self.today),
                    LeafOutcome::Failure { reason },
                )
            }
        };

        let mut working = self.working.lock().await;
        if let Err(err) = working.catalog.write(&leaf.path, &patch) {
            tracing::warn!(path = %leaf.path, error = %err, "write-back skipped");
        }
        if let Err(err) = self.sink.persist(&working.catalog).await {
            tracing::warn!(sink = self.sink.name(), error = %err, "checkpoint failed");
        }

        if outcome.is_success() {
            working.success += 1;
        } else {
            working.failed += 1;
        }
        if let Some(observer) = &self.observer {
            observer.on_leaf(&LeafProgress {
                position: working.success + working.failed,
                total: self.total,
                success_count: working.success,
                failure_count: working.failed,
                entity_key: leaf.entity_key,
                path: leaf.path,
                outcome,
            });
        }
    }

    async fn fetch_with_retry(&self, entity_key: &str) -> Result<RawMetric, FetchError> {
        let mut attempt = 1;
        loop {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.source.fetch(entity_key, &self.window).await {
                Ok(raw) => return Ok(raw),
                Err(err) if attempt < self.max_attempts && err.is_transient() => {
                    let delay = self.retry_backoff * attempt;
                    tracing::debug!(
                        entity = %entity_key,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Leaves whose outcome has been counted so far.
    async fn settled(&self) -> usize {
        let working = self.working.lock().await;
        working.success + working.failed
    }

    /// Tasks that died before counting their outcome still count as failures.
    async fn record_aborted(&self, count: usize) {
        let mut working = self.working.lock().await;
        working.failed += count;
    }
}
